//! Keymeter - API key issuance and monthly usage metering
//!
//! This library issues deterministic per-instance API keys, counts billable
//! requests per key per calendar month, and gates a formula-generation
//! backend on the free-tier quota.

pub mod config;
pub mod error;
pub mod generation;
pub mod keys;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod store;
pub mod usage;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::info;

pub use crate::config::{Config, StoreBackend};
pub use crate::generation::{FallbackGenerator, Generator, HeuristicGenerator, OpenAiGenerator};
pub use crate::keys::KeyRegistry;
pub use crate::service::{AccessService, Clock, SystemClock};
pub use crate::store::{InMemoryStore, RedisStore, Store};
pub use crate::usage::UsageMeter;

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub registry: Arc<KeyRegistry>,
    pub meter: Arc<UsageMeter>,
    pub access: Arc<AccessService>,
    /// Backend behind `/api/generate`
    pub generator: Arc<dyn Generator>,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = match config.store_backend {
            StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        };
        info!(store = store.name(), "Store initialized");

        // The model call deadline lives in OpenAiGenerator so a timeout
        // reaches the fallback as an ordinary generation failure.
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .build()?;

        let generator: Arc<dyn Generator> = match OpenAiGenerator::new(http_client, &config) {
            Some(openai) if config.generation_fallback => {
                Arc::new(FallbackGenerator::new(Arc::new(openai)))
            }
            Some(openai) => Arc::new(openai),
            None => {
                info!("OPENAI_API_KEY not set; using heuristic formula generation");
                Arc::new(HeuristicGenerator)
            }
        };

        Ok(Self::assemble(config, store, generator, Arc::new(SystemClock)))
    }

    fn assemble(
        config: Config,
        store: Arc<dyn Store>,
        generator: Arc<dyn Generator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(KeyRegistry::new(store.clone(), config.api_key_salt.clone()));
        let meter = Arc::new(UsageMeter::new(store.clone()));
        let access = Arc::new(AccessService::new(
            registry.clone(),
            meter.clone(),
            config.free_tier_limit,
            clock,
        ));

        Self {
            config,
            store,
            registry,
            meter,
            access,
            generator,
            start_time: Instant::now(),
        }
    }

    /// Create an application state for testing with an injected store,
    /// generator and clock
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_for_testing(
        config: Config,
        store: Arc<dyn Store>,
        generator: Arc<dyn Generator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::assemble(config, store, generator, clock)
    }
}
