//! Hourly billing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default charge per started hour.
pub const DEFAULT_HOURLY_RATE: u64 = 10;

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Flat hourly tariff. Every started hour is charged in full, with a
/// minimum of one hour for any stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Billing {
    pub hourly_rate: u64,
}

impl Default for Billing {
    fn default() -> Self {
        Self {
            hourly_rate: DEFAULT_HOURLY_RATE,
        }
    }
}

impl Billing {
    pub fn new(hourly_rate: u64) -> Self {
        Self { hourly_rate }
    }

    /// Hours charged for a stay: elapsed time rounded up, at least one.
    pub fn billable_hours(entry: DateTime<Utc>, exit: DateTime<Utc>) -> u64 {
        let millis = (exit - entry).num_milliseconds();
        if millis <= 0 {
            return 1;
        }
        let hours = (millis + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR;
        (hours as u64).max(1)
    }

    /// Fee for a stay from `entry` to `exit`.
    pub fn fee(&self, entry: DateTime<Utc>, exit: DateTime<Utc>) -> u64 {
        Self::billable_hours(entry, exit).saturating_mul(self.hourly_rate)
    }
}
