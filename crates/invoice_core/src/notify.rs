//! crates/invoice_core/src/notify.rs
//!
//! The notification generator: turns a `DueStatus` classification into a
//! persisted `Notification` (or nothing), enforcing the due-soon latch.

use crate::domain::{DueStatus, Invoice, Notification, NotificationKind};
use crate::ports::{InvoiceStore, PortResult};
use std::sync::Arc;

/// Generates and persists due-date notifications for classified invoices.
///
/// Owns no state beyond the store handle; safe to share between the daily
/// scanner and the synchronous ingestion path.
#[derive(Clone)]
pub struct NotificationEngine {
    store: Arc<dyn InvoiceStore>,
}

impl NotificationEngine {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    /// Produces and persists the notification implied by `status`, if any.
    ///
    /// Returns the created notification so the caller can broadcast it.
    /// For `DueSoon` the store performs the latch check-and-set and the
    /// insert in one transaction; if the latch was already set (including by
    /// a concurrent caller) this returns `Ok(None)` and nothing is written.
    ///
    /// `DueToday` and `Overdue` carry no latch: a scan that runs twice on
    /// the same day inserts duplicates. Documented behavior, not a bug:
    /// there is no per-day flag for these two kinds.
    pub async fn generate(&self, invoice: &Invoice, status: DueStatus) -> PortResult<Option<Notification>> {
        match status {
            DueStatus::NotDue => Ok(None),

            DueStatus::DueSoon(days) => {
                if invoice.notified_5d {
                    return Ok(None);
                }
                let notification = Notification::new(
                    NotificationKind::DueSoon,
                    render_due_soon(invoice, days),
                    invoice,
                    days,
                );
                let fired = self.store.fire_due_soon(invoice.id, &notification).await?;
                Ok(fired.then_some(notification))
            }

            DueStatus::DueToday => {
                let notification = Notification::new(
                    NotificationKind::DueToday,
                    render_due_today(invoice),
                    invoice,
                    0,
                );
                self.store.create_notification(&notification).await?;
                Ok(Some(notification))
            }

            DueStatus::Overdue(days_left) => {
                let notification = Notification::new(
                    NotificationKind::Overdue,
                    render_overdue(invoice, days_left),
                    invoice,
                    days_left,
                );
                self.store.create_notification(&notification).await?;
                Ok(Some(notification))
            }
        }
    }
}

fn render_due_soon(invoice: &Invoice, days: i64) -> String {
    format!(
        "Invoice {} is due in {} days (due date {})",
        invoice.filename, days, invoice.due_date
    )
}

fn render_due_today(invoice: &Invoice) -> String {
    format!("Invoice {} is due today ({})", invoice.filename, invoice.due_date)
}

fn render_overdue(invoice: &Invoice, days_left: i64) -> String {
    format!(
        "Invoice {} is {} days overdue (due date {})",
        invoice.filename,
        -days_left,
        invoice.due_date
    )
}
