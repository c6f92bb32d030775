//! Caller-facing access API
//!
//! Composes the key registry and the usage meter into the three operations
//! the HTTP layer exposes: issue a key, gate a billable request, and report
//! usage.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    error::{AppError, AppResult},
    keys::{key_fingerprint, ApiKeyRecord, KeyRegistry, Tier},
    routes::metrics::record_quota_decision,
    usage::{check_quota, limit_for, Allowance, UsageMeter},
};

/// Source of the current time used for month bucketing
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Server-local wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock that only moves when told to
#[cfg(any(test, feature = "test-utils"))]
pub struct ManualClock {
    now: std::sync::RwLock<DateTime<FixedOffset>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: std::sync::RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.write().unwrap() = now;
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.read().unwrap()
    }
}

/// Usage block embedded in a key grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub current: u64,
    pub limit: Allowance,
}

/// Answer to an `ensure_key` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyGrant {
    pub api_key: String,
    pub tier: Tier,
    pub usage: UsageSnapshot,
    /// Whether this call created the key
    #[serde(skip)]
    pub created: bool,
}

/// A request that passed the quota gate and was counted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Consumption {
    pub current: u64,
    pub limit: Allowance,
    pub remaining: Allowance,
    /// False when a repeated request id was not counted again
    #[serde(skip)]
    pub applied: bool,
}

/// Answer to a `get_usage` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub usage: u64,
    pub limit: Allowance,
    pub tier: Tier,
    pub remaining: Allowance,
}

/// Key issuance plus quota enforcement
pub struct AccessService {
    registry: Arc<KeyRegistry>,
    meter: Arc<UsageMeter>,
    free_tier_limit: u64,
    clock: Arc<dyn Clock>,
}

impl AccessService {
    pub fn new(
        registry: Arc<KeyRegistry>,
        meter: Arc<UsageMeter>,
        free_tier_limit: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            meter,
            free_tier_limit,
            clock,
        }
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Return the key for `instance_id`, issuing one on first sight
    #[instrument(skip(self))]
    pub async fn ensure_key(&self, instance_id: &str) -> AppResult<KeyGrant> {
        let registration = self.registry.get_or_create(instance_id).await?;
        let record = registration.record;

        let current = if registration.created {
            0
        } else {
            self.meter
                .current_usage(&record.api_key, &self.clock.now())
                .await?
        };

        Ok(KeyGrant {
            usage: UsageSnapshot {
                current,
                limit: limit_for(record.tier, self.free_tier_limit),
            },
            api_key: record.api_key,
            tier: record.tier,
            created: registration.created,
        })
    }

    /// Resolve `api_key` and gate one billable request on it
    pub async fn check_and_consume(
        &self,
        api_key: &str,
        request_id: Option<&str>,
    ) -> AppResult<Consumption> {
        let record = self.registry.get_by_key(api_key).await?;
        self.consume_for(&record, request_id).await
    }

    /// Gate one billable request for an already resolved key
    ///
    /// Rejects without counting when a metered key is at its limit.
    /// Otherwise the request is counted before the caller runs the
    /// downstream operation, so a failure there still uses quota.
    #[instrument(skip_all, fields(api_key = %key_fingerprint(&record.api_key), tier = record.tier.as_str()))]
    pub async fn consume_for(
        &self,
        record: &ApiKeyRecord,
        request_id: Option<&str>,
    ) -> AppResult<Consumption> {
        let now = self.clock.now();
        let limit = limit_for(record.tier, self.free_tier_limit);

        if let Allowance::Limited(max) = limit {
            let usage = self.meter.current_usage(&record.api_key, &now).await?;
            if !check_quota(record.tier, usage, max).allowed {
                record_quota_decision("rejected");
                info!(usage, limit = max, "Monthly quota exhausted");
                return Err(AppError::QuotaExceeded { limit: max, usage });
            }
        }

        let outcome = self
            .meter
            .increment_once(&record.api_key, &now, request_id)
            .await?;
        record_quota_decision("allowed");

        Ok(Consumption {
            current: outcome.count,
            remaining: check_quota(record.tier, outcome.count, self.free_tier_limit).remaining,
            limit,
            applied: outcome.applied,
        })
    }

    /// Current month's usage and remaining allowance for `api_key`
    #[instrument(skip_all, fields(api_key = %key_fingerprint(api_key)))]
    pub async fn get_usage(&self, api_key: &str) -> AppResult<UsageSummary> {
        let record = self.registry.get_by_key(api_key).await?;
        self.usage_for(&record).await
    }

    /// Usage summary for an already resolved key
    pub async fn usage_for(&self, record: &ApiKeyRecord) -> AppResult<UsageSummary> {
        let usage = self
            .meter
            .current_usage(&record.api_key, &self.clock.now())
            .await?;
        let limit = limit_for(record.tier, self.free_tier_limit);

        Ok(UsageSummary {
            usage,
            limit,
            tier: record.tier,
            remaining: check_quota(record.tier, usage, self.free_tier_limit).remaining,
        })
    }
}
