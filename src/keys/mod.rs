//! API key registry
//!
//! Binds client instance ids to deterministically derived API keys and a
//! billing tier. Records are owned by the store; this module only derives,
//! validates, and resolves them.

pub mod derive;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use derive::{derive_key, key_fingerprint, validate_instance_id, API_KEY_PREFIX};
pub use registry::KeyRegistry;

/// Billing tier attached to an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Metered against the monthly free-tier limit
    #[default]
    Free,
    /// Never metered
    #[serde(alias = "paid", alias = "pro")]
    Unlimited,
}

impl Tier {
    /// Whether requests on this tier count against a limit
    pub fn is_metered(&self) -> bool {
        matches!(self, Tier::Free)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Unlimited => "unlimited",
        }
    }
}

/// A client instance bound to its API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub instance_id: String,
    pub api_key: String,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    /// Create a new record stamped with `created_at`
    pub fn new(
        instance_id: impl Into<String>,
        api_key: impl Into<String>,
        tier: Tier,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            api_key: api_key.into(),
            tier,
            created_at,
        }
    }
}

/// Result of a get-or-create: the stored record and whether this call wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub record: ApiKeyRecord,
    pub created: bool,
}
