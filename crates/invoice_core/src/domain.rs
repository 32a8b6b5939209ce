//! crates/invoice_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format
//! beyond the serde derives needed for the wire payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a supplier invoice extracted from an uploaded XML document.
#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub filename: String,
    pub due_date: NaiveDate,
    pub supplier: Option<String>,
    pub amount: Option<f64>,
    pub paid: bool,
    /// One-way latch: set when the single due-soon notification for this
    /// invoice has fired. Never reverts to false.
    pub notified_5d: bool,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a fresh unpaid invoice for a newly ingested document.
    pub fn new(filename: String, due_date: NaiveDate, supplier: Option<String>, amount: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            due_date,
            supplier,
            amount,
            paid: false,
            notified_5d: false,
            created_at: Utc::now(),
        }
    }
}

/// The kind of a due-date notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DueSoon,
    DueToday,
    Overdue,
}

impl NotificationKind {
    /// The stable string form used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DueSoon => "due_soon",
            NotificationKind::DueToday => "due_today",
            NotificationKind::Overdue => "overdue",
        }
    }
}

/// A single due-date notification. Append-only: once created, only the
/// `read` flag ever changes.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    /// Weak reference to the invoice that produced this notification. The
    /// invoice may be deleted elsewhere; the reference is never used for
    /// ownership and may dangle.
    pub invoice_id: Uuid,
    pub due_date: NaiveDate,
    /// Positive = days remaining, 0 = due today, negative = days overdue.
    pub days_left: i64,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: String, invoice: &Invoice, days_left: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message,
            invoice_id: invoice.id,
            due_date: invoice.due_date,
            days_left,
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// The classification of an invoice relative to a given calendar day.
/// Produced by `classify`, consumed by the notification generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    /// Paid, or not inside any notification window.
    NotDue,
    /// Exactly N days before the due date (N = 5 in the current window).
    DueSoon(i64),
    /// The due date is today.
    DueToday,
    /// Past due; payload is the signed days-left (always negative).
    Overdue(i64),
}
