//! crates/invoice_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases
//! or the amount-inference model.

use crate::domain::{Invoice, Notification};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage for invoices and their notification log.
///
/// Both record types live behind one port because the due-soon latch update
/// and its notification insert must share a transaction; splitting the port
/// would force the transactional boundary into the core.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    // --- Invoice Management ---
    async fn create_invoice(&self, invoice: &Invoice) -> PortResult<()>;

    async fn get_invoice(&self, invoice_id: Uuid) -> PortResult<Invoice>;

    /// All invoices, newest first.
    async fn list_invoices(&self) -> PortResult<Vec<Invoice>>;

    /// Sets the paid flag. Returns the updated invoice.
    async fn mark_paid(&self, invoice_id: Uuid) -> PortResult<Invoice>;

    // --- Scan Queries ---
    /// Unpaid invoices whose due date is exactly `date`.
    async fn list_unpaid_due_on(&self, date: NaiveDate) -> PortResult<Vec<Invoice>>;

    /// Unpaid invoices whose due date is strictly before `date`.
    async fn list_unpaid_overdue_before(&self, date: NaiveDate) -> PortResult<Vec<Invoice>>;

    // --- Notification Management ---
    /// Atomically sets the invoice's due-soon latch and inserts the paired
    /// notification, in one transaction. Returns `false` (inserting nothing)
    /// if the latch was already set or the invoice was paid or missing, so a
    /// concurrent caller can never double-fire. Partial application must not
    /// be observable: on failure both writes roll back.
    async fn fire_due_soon(&self, invoice_id: Uuid, notification: &Notification) -> PortResult<bool>;

    /// Inserts a notification with no latch semantics (due-today / overdue).
    async fn create_notification(&self, notification: &Notification) -> PortResult<()>;

    /// Notifications newest first, optionally unread only, capped at `limit`.
    async fn list_notifications(&self, limit: i64, unread_only: bool) -> PortResult<Vec<Notification>>;

    async fn mark_notification_read(&self, notification_id: Uuid) -> PortResult<()>;
}

/// An injectable time source so the scanner and generator can be tested
/// against a fixed calendar day.
pub trait Clock: Send + Sync {
    /// The current calendar date in the configured local zone.
    fn today(&self) -> NaiveDate;

    /// The current instant, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Opaque free-text amount inference over the raw invoice document.
#[async_trait]
pub trait AmountEstimator: Send + Sync {
    /// Best-effort estimate of the total amount due. Implementations degrade
    /// to 0.0 rather than failing hard when the model gives no usable answer.
    async fn estimate_amount(&self, text: &str) -> PortResult<f64>;
}
