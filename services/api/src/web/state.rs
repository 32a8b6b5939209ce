//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::broadcast::NotificationBroadcaster;
use invoice_core::notify::NotificationEngine;
use invoice_core::ports::{AmountEstimator, Clock, InvoiceStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InvoiceStore>,
    pub clock: Arc<dyn Clock>,
    pub amount_estimator: Arc<dyn AmountEstimator>,
    pub engine: NotificationEngine,
    pub broadcaster: Arc<NotificationBroadcaster>,
    pub config: Arc<Config>,
}
