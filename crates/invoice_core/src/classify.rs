//! crates/invoice_core/src/classify.rs
//!
//! The due-date classifier: a pure function mapping (today, due date, paid)
//! to a `DueStatus`. No side effects, no I/O, fully deterministic.

use crate::domain::DueStatus;
use chrono::NaiveDate;

/// The single day, this many calendar days before the due date, on which the
/// one-shot due-soon notification fires.
pub const DUE_SOON_DAYS: i64 = 5;

/// Classifies an invoice's due date relative to `today`.
///
/// A paid invoice is always `NotDue`, regardless of dates.
pub fn classify(today: NaiveDate, due_date: NaiveDate, paid: bool) -> DueStatus {
    if paid {
        return DueStatus::NotDue;
    }

    let days_left = (due_date - today).num_days();

    if days_left == DUE_SOON_DAYS {
        DueStatus::DueSoon(DUE_SOON_DAYS)
    } else if days_left == 0 {
        DueStatus::DueToday
    } else if days_left < 0 {
        DueStatus::Overdue(days_left)
    } else {
        DueStatus::NotDue
    }
}
