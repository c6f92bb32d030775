//! Redis store implementation
//!
//! Key bindings are JSON values under two index keys; monthly counters are
//! hashes. Multi-key writes run as Lua scripts or MULTI/EXEC pipelines so
//! every operation is atomic on the server, across all processes sharing it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};
use tracing::{debug, instrument};

use crate::{
    error::{AppError, AppResult},
    keys::{key_fingerprint, ApiKeyRecord, Registration},
    store::Store,
    usage::{IncrementOutcome, UsageCounter, UsagePeriod},
};

/// Default namespace for every key this store writes
pub const DEFAULT_PREFIX: &str = "keymeter";

const REQUEST_COUNT_FIELD: &str = "request_count";
const LAST_REQUEST_AT_FIELD: &str = "last_request_at";

/// Lifetime of a month's counted request ids, refreshed on every new id.
/// Long enough to outlive the month the ids belong to.
pub const COUNTED_REQUESTS_TTL_SECONDS: u64 = 40 * 24 * 60 * 60;

/// KEYS: instance index, api key index. ARGV: record JSON, instance id.
/// Returns {stored JSON, 1 if inserted else 0}.
static INSERT_KEY_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local existing = redis.call('GET', KEYS[1])
        if existing then
            return {existing, 0}
        end
        if redis.call('EXISTS', KEYS[2]) == 1 then
            return redis.error_reply('API key already bound to another instance')
        end
        redis.call('SET', KEYS[1], ARGV[1])
        redis.call('SET', KEYS[2], ARGV[2])
        return {ARGV[1], 1}
        "#,
    )
});

/// KEYS: counter hash, counted request ids. ARGV: timestamp, request id, id TTL.
/// Returns {count, 1 if applied else 0}.
static INCREMENT_ONCE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        if redis.call('SADD', KEYS[2], ARGV[2]) == 0 then
            local current = redis.call('HGET', KEYS[1], 'request_count')
            return {tonumber(current) or 0, 0}
        end
        redis.call('EXPIRE', KEYS[2], ARGV[3])
        local count = redis.call('HINCRBY', KEYS[1], 'request_count', 1)
        redis.call('HSET', KEYS[1], 'last_request_at', ARGV[1])
        return {count, 1}
        "#,
    )
});

/// Redis key layout
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Record JSON, indexed by instance id
    pub fn instance(&self, instance_id: &str) -> String {
        format!("{}:instance:{}", self.prefix, instance_id)
    }

    /// Instance id, indexed by API key
    pub fn api_key(&self, api_key: &str) -> String {
        format!("{}:apikey:{}", self.prefix, api_key)
    }

    /// Counter hash for one month
    pub fn usage(&self, period: &UsagePeriod) -> String {
        format!(
            "{}:usage:{}:{}:{:02}",
            self.prefix, period.api_key, period.year, period.month
        )
    }

    /// Request ids already counted in one month
    pub fn counted_requests(&self, period: &UsagePeriod) -> String {
        format!("{}:requests", self.usage(period))
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Redis-backed store
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    keys: KeySpace,
}

impl RedisStore {
    /// Create a store using the default key namespace
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self::with_keyspace(conn, KeySpace::default())
    }

    /// Create a store writing under a custom key namespace
    pub fn with_keyspace(conn: redis::aio::ConnectionManager, keys: KeySpace) -> Self {
        Self { conn, keys }
    }

    /// Connect to `redis_url` and wrap the connection manager
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }
}

fn encode_record(record: &ApiKeyRecord) -> AppResult<String> {
    serde_json::to_string(record)
        .map_err(|e| AppError::Storage(format!("unencodable key record: {}", e)))
}

/// A stored record that does not parse is a storage fault, not a client error
fn decode_record(raw: &str) -> AppResult<ApiKeyRecord> {
    serde_json::from_str(raw).map_err(|e| AppError::Storage(format!("corrupt key record: {}", e)))
}

fn parse_counter(period: &UsagePeriod, fields: HashMap<String, String>) -> AppResult<Option<UsageCounter>> {
    let Some(count) = fields.get(REQUEST_COUNT_FIELD) else {
        return Ok(None);
    };

    let request_count = count
        .parse::<u64>()
        .map_err(|e| AppError::Storage(format!("corrupt request count {:?}: {}", count, e)))?;

    let last_request_at = match fields.get(LAST_REQUEST_AT_FIELD) {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map_err(|e| AppError::Storage(format!("corrupt timestamp {:?}: {}", ts, e)))?
            .with_timezone(&Utc),
        None => return Err(AppError::Storage("counter has no timestamp".to_string())),
    };

    Ok(Some(UsageCounter {
        period: period.clone(),
        request_count,
        last_request_at,
    }))
}

#[async_trait]
impl Store for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip_all, fields(instance_id = %record.instance_id))]
    async fn insert_key_if_absent(&self, record: ApiKeyRecord) -> AppResult<Registration> {
        let mut conn = self.conn.clone();
        let serialized = encode_record(&record)?;

        let mut invocation = INSERT_KEY_SCRIPT.prepare_invoke();
        invocation
            .key(self.keys.instance(&record.instance_id))
            .key(self.keys.api_key(&record.api_key))
            .arg(&serialized)
            .arg(&record.instance_id);
        let (stored, inserted): (String, i64) = invocation.invoke_async(&mut conn).await?;

        debug!(inserted = inserted == 1, "Key insert script finished");

        Ok(Registration {
            record: decode_record(&stored)?,
            created: inserted == 1,
        })
    }

    async fn find_by_instance_id(&self, instance_id: &str) -> AppResult<Option<ApiKeyRecord>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.keys.instance(instance_id)).await?;

        match value {
            Some(v) => Ok(Some(decode_record(&v)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(api_key = %key_fingerprint(api_key)))]
    async fn find_by_api_key(&self, api_key: &str) -> AppResult<Option<ApiKeyRecord>> {
        let mut conn = self.conn.clone();
        let instance_id: Option<String> = conn.get(self.keys.api_key(api_key)).await?;

        match instance_id {
            Some(id) => self.find_by_instance_id(&id).await,
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(api_key = %key_fingerprint(&period.api_key), year = period.year, month = period.month))]
    async fn increment_usage(
        &self,
        period: &UsagePeriod,
        at: DateTime<Utc>,
        request_id: Option<&str>,
    ) -> AppResult<IncrementOutcome> {
        let mut conn = self.conn.clone();
        let counter_key = self.keys.usage(period);
        let timestamp = at.to_rfc3339();

        match request_id {
            None => {
                let (count,): (u64,) = redis::pipe()
                    .atomic()
                    .hincr(&counter_key, REQUEST_COUNT_FIELD, 1i64)
                    .hset(&counter_key, LAST_REQUEST_AT_FIELD, &timestamp)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;

                Ok(IncrementOutcome {
                    count,
                    applied: true,
                })
            }
            Some(id) => {
                let mut invocation = INCREMENT_ONCE_SCRIPT.prepare_invoke();
                invocation
                    .key(&counter_key)
                    .key(self.keys.counted_requests(period))
                    .arg(&timestamp)
                    .arg(id)
                    .arg(COUNTED_REQUESTS_TTL_SECONDS);
                let (count, applied): (u64, i64) = invocation.invoke_async(&mut conn).await?;

                Ok(IncrementOutcome {
                    count,
                    applied: applied == 1,
                })
            }
        }
    }

    async fn get_usage(&self, period: &UsagePeriod) -> AppResult<Option<UsageCounter>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.keys.usage(period)).await?;
        parse_counter(period, fields)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
