//! Monthly usage meter

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, instrument};

use crate::{
    error::AppResult,
    keys::key_fingerprint,
    store::Store,
    usage::{IncrementOutcome, UsageCounter, UsagePeriod},
};

/// Counts billable requests per key per calendar month
///
/// Every read goes to the store; counts are never cached in process.
pub struct UsageMeter {
    store: Arc<dyn Store>,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Count one request for `api_key` in the month containing `at`
    ///
    /// Returns the counter value after the increment.
    pub async fn increment<Tz: TimeZone>(&self, api_key: &str, at: &DateTime<Tz>) -> AppResult<u64> {
        Ok(self.increment_once(api_key, at, None).await?.count)
    }

    /// Count one request unless `request_id` was already counted this month
    ///
    /// With `None` every call increments.
    #[instrument(skip(self, at), fields(api_key = %key_fingerprint(api_key)))]
    pub async fn increment_once<Tz: TimeZone>(
        &self,
        api_key: &str,
        at: &DateTime<Tz>,
        request_id: Option<&str>,
    ) -> AppResult<IncrementOutcome> {
        let period = UsagePeriod::containing(api_key, at);
        let outcome = self
            .store
            .increment_usage(&period, at.with_timezone(&Utc), request_id)
            .await?;

        debug!(
            year = period.year,
            month = period.month,
            count = outcome.count,
            applied = outcome.applied,
            "Recorded request"
        );
        Ok(outcome)
    }

    /// Requests counted for `api_key` in the month containing `at`, 0 if none
    pub async fn current_usage<Tz: TimeZone>(&self, api_key: &str, at: &DateTime<Tz>) -> AppResult<u64> {
        Ok(self
            .counter(api_key, at)
            .await?
            .map(|c| c.request_count)
            .unwrap_or(0))
    }

    /// The raw counter for the month containing `at`
    pub async fn counter<Tz: TimeZone>(
        &self,
        api_key: &str,
        at: &DateTime<Tz>,
    ) -> AppResult<Option<UsageCounter>> {
        let period = UsagePeriod::containing(api_key, at);
        self.store.get_usage(&period).await
    }
}
