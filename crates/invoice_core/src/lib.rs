pub mod classify;
pub mod domain;
pub mod notify;
pub mod ports;

pub use classify::{classify, DUE_SOON_DAYS};
pub use domain::{DueStatus, Invoice, Notification, NotificationKind};
pub use notify::NotificationEngine;
pub use ports::{AmountEstimator, Clock, InvoiceStore, PortError, PortResult};
