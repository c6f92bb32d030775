//! Usage metering module
//!
//! Per-key request counters bucketed by calendar month, and the quota
//! arithmetic applied to them.

pub mod meter;
pub mod quota;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

pub use meter::UsageMeter;
pub use quota::{check_quota, limit_for, Allowance, QuotaCheck};

/// Composite key of a monthly counter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UsagePeriod {
    pub api_key: String,
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl UsagePeriod {
    pub fn new(api_key: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            api_key: api_key.into(),
            year,
            month,
        }
    }

    /// The period containing `at`, read in `at`'s own calendar
    pub fn containing<Tz: TimeZone>(api_key: &str, at: &DateTime<Tz>) -> Self {
        Self::new(api_key, at.year(), at.month())
    }

    /// The following calendar month for the same key
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self::new(self.api_key.clone(), self.year + 1, 1)
        } else {
            Self::new(self.api_key.clone(), self.year, self.month + 1)
        }
    }
}

/// Stored counter for one period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCounter {
    pub period: UsagePeriod,
    pub request_count: u64,
    pub last_request_at: DateTime<Utc>,
}

/// Result of an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    /// Counter value after the operation
    pub count: u64,
    /// False when a repeated request id made the increment a no-op
    pub applied: bool,
}
