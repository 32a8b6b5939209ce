//! services/api/src/adapters/clock.rs
//!
//! The production implementation of the `Clock` port: the current date as
//! seen from the configured fixed UTC offset. Tests inject their own clock.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use invoice_core::ports::Clock;

/// A `Clock` that reads the system time and shifts it into the configured
/// local zone before taking the calendar date.
#[derive(Clone)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
