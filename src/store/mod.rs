//! Storage module
//!
//! The key registry and usage meter persist through the [`Store`] trait.
//! Two engines implement it: Redis for deployments, and an in-memory map
//! for tests and local development.

pub mod in_memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    keys::{ApiKeyRecord, Registration},
    usage::{IncrementOutcome, UsageCounter, UsagePeriod},
};

pub use self::in_memory::InMemoryStore;
pub use self::redis::RedisStore;

/// Storage contract for key bindings and monthly counters
///
/// Implementations MUST make `insert_key_if_absent` and `increment_usage`
/// single atomic operations at the storage layer. Several processes may share
/// one store, so in-process locking alone is not enough for a shared engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Engine name for logging and health output
    fn name(&self) -> &'static str;

    /// Insert `record` unless its instance id is already bound
    ///
    /// Returns the stored record: the existing one (with `created = false`)
    /// or `record` itself. First writer wins.
    async fn insert_key_if_absent(&self, record: ApiKeyRecord) -> AppResult<Registration>;

    /// Look up a record by client instance id
    async fn find_by_instance_id(&self, instance_id: &str) -> AppResult<Option<ApiKeyRecord>>;

    /// Look up a record by API key
    async fn find_by_api_key(&self, api_key: &str) -> AppResult<Option<ApiKeyRecord>>;

    /// Add one to the counter for `period`, creating it at 1 if absent
    ///
    /// When `request_id` is set and was already counted in `period`, nothing
    /// changes and the current count is returned with `applied = false`.
    async fn increment_usage(
        &self,
        period: &UsagePeriod,
        at: DateTime<Utc>,
        request_id: Option<&str>,
    ) -> AppResult<IncrementOutcome>;

    /// Read the counter for `period`
    async fn get_usage(&self, period: &UsagePeriod) -> AppResult<Option<UsageCounter>>;

    /// Verify the engine is reachable
    async fn ping(&self) -> AppResult<()>;
}
