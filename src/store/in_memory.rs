//! In-memory store
//!
//! A `HashMap`-backed [`Store`] for tests and single-process development.
//! Each operation takes the write lock once, so check-and-insert and
//! read-modify-write are atomic within the process.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, AppResult},
    keys::{ApiKeyRecord, Registration},
    store::Store,
    usage::{IncrementOutcome, UsageCounter, UsagePeriod},
};

#[derive(Default)]
struct State {
    by_instance: HashMap<String, ApiKeyRecord>,
    instance_by_key: HashMap<String, String>,
    usage: HashMap<UsagePeriod, UsageCounter>,
    counted_requests: HashMap<UsagePeriod, HashSet<String>>,
}

fn month_index(period: &UsagePeriod) -> i64 {
    i64::from(period.year) * 12 + i64::from(period.month)
}

impl State {
    /// Record `id` for `period`, returning false if it was already counted.
    /// Ids of the same key older than the previous month are dropped; a
    /// retry cannot reach that far back.
    fn mark_counted(&mut self, period: &UsagePeriod, id: &str) -> bool {
        let oldest = month_index(period) - 1;
        self.counted_requests
            .retain(|p, _| p.api_key != period.api_key || month_index(p) >= oldest);

        self.counted_requests
            .entry(period.clone())
            .or_default()
            .insert(id.to_string())
    }
}

/// In-memory store
///
/// # Thread Safety
///
/// Uses RwLock for interior mutability, allowing concurrent reads.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a storage error
    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Storage("in-memory store is unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, State>> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|_| AppError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, State>> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| AppError::Storage("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_key_if_absent(&self, record: ApiKeyRecord) -> AppResult<Registration> {
        let mut state = self.write()?;

        if let Some(existing) = state.by_instance.get(&record.instance_id) {
            return Ok(Registration {
                record: existing.clone(),
                created: false,
            });
        }

        if state.instance_by_key.contains_key(&record.api_key) {
            return Err(AppError::Storage(
                "API key already bound to another instance".to_string(),
            ));
        }

        state
            .instance_by_key
            .insert(record.api_key.clone(), record.instance_id.clone());
        state
            .by_instance
            .insert(record.instance_id.clone(), record.clone());

        Ok(Registration {
            record,
            created: true,
        })
    }

    async fn find_by_instance_id(&self, instance_id: &str) -> AppResult<Option<ApiKeyRecord>> {
        Ok(self.read()?.by_instance.get(instance_id).cloned())
    }

    async fn find_by_api_key(&self, api_key: &str) -> AppResult<Option<ApiKeyRecord>> {
        let state = self.read()?;
        Ok(state
            .instance_by_key
            .get(api_key)
            .and_then(|instance_id| state.by_instance.get(instance_id))
            .cloned())
    }

    async fn increment_usage(
        &self,
        period: &UsagePeriod,
        at: DateTime<Utc>,
        request_id: Option<&str>,
    ) -> AppResult<IncrementOutcome> {
        let mut state = self.write()?;

        if let Some(id) = request_id {
            if !state.mark_counted(period, id) {
                let count = state
                    .usage
                    .get(period)
                    .map(|c| c.request_count)
                    .unwrap_or(0);
                return Ok(IncrementOutcome {
                    count,
                    applied: false,
                });
            }
        }

        let counter = state
            .usage
            .entry(period.clone())
            .or_insert_with(|| UsageCounter {
                period: period.clone(),
                request_count: 0,
                last_request_at: at,
            });
        counter.request_count += 1;
        counter.last_request_at = at;

        Ok(IncrementOutcome {
            count: counter.request_count,
            applied: true,
        })
    }

    async fn get_usage(&self, period: &UsagePeriod) -> AppResult<Option<UsageCounter>> {
        Ok(self.read()?.usage.get(period).cloned())
    }

    async fn ping(&self) -> AppResult<()> {
        self.check_available()
    }
}
