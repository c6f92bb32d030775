//! Configuration management for Keymeter
//!
//! Configuration is loaded from environment variables.

use anyhow::{bail, Context, Result};
use std::env;
use tracing::warn;

/// Salt used when `API_KEY_SALT` is unset. Insecure outside development.
pub const DEFAULT_API_KEY_SALT: &str = "default-salt-change-this";

/// Monthly request allowance for the free tier when `FREE_TIER_LIMIT` is unset
pub const DEFAULT_FREE_TIER_LIMIT: u64 = 30;

/// Which storage engine backs the key registry and usage meter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Whether this process runs in production
    pub production: bool,

    /// Storage engine
    pub store_backend: StoreBackend,
    /// Redis connection URL
    pub redis_url: String,

    /// Secret mixed into every derived API key
    pub api_key_salt: String,
    /// True when `api_key_salt` is the built-in default
    pub using_default_salt: bool,
    /// Monthly request limit for the free tier
    pub free_tier_limit: u64,

    /// OpenAI-compatible API URL
    pub openai_api_url: String,
    /// OpenAI API key; the heuristic generator is used when absent
    pub openai_api_key: Option<String>,
    /// Model used for formula generation
    pub openai_model: String,
    /// Upper bound on a single generation call (in seconds)
    pub generation_timeout_seconds: u64,
    /// Answer with the keyword heuristic when the model call fails
    pub generation_fallback: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let production = env::var("KEYMETER_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let (api_key_salt, using_default_salt) = match env::var("API_KEY_SALT") {
            Ok(salt) if !salt.is_empty() => (salt, false),
            _ => (DEFAULT_API_KEY_SALT.to_string(), true),
        };

        if using_default_salt {
            if production {
                bail!("API_KEY_SALT must be set in production");
            }
            warn!("API_KEY_SALT is not set; using the insecure default salt (development only)");
        }

        let store_backend = match env::var("KEYMETER_STORE")
            .unwrap_or_else(|_| "redis".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => bail!("Invalid KEYMETER_STORE: {}", other),
        };

        Ok(Self {
            host: env::var("KEYMETER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("KEYMETER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid KEYMETER_PORT")?,

            production,

            store_backend,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            api_key_salt,
            using_default_salt,
            free_tier_limit: match env::var("FREE_TIER_LIMIT") {
                Ok(v) => v.parse().context("Invalid FREE_TIER_LIMIT")?,
                Err(_) => DEFAULT_FREE_TIER_LIMIT,
            },

            openai_api_url: env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            generation_timeout_seconds: env::var("GENERATION_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid GENERATION_TIMEOUT_SECONDS")?,
            generation_fallback: env::var("GENERATION_FALLBACK")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }

    /// Configuration for tests: in-memory store, fixed salt, no OpenAI key
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            production: false,
            store_backend: StoreBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            api_key_salt: "test-salt".to_string(),
            using_default_salt: false,
            free_tier_limit: DEFAULT_FREE_TIER_LIMIT,
            openai_api_url: "http://localhost:0".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            generation_timeout_seconds: 5,
            generation_fallback: true,
        }
    }
}
