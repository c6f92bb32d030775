//! Storage-backed key registry

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::{
    error::{AppError, AppResult},
    keys::{derive_key, key_fingerprint, validate_instance_id, ApiKeyRecord, Registration, Tier},
    routes::metrics::record_key_issued,
    store::Store,
};

/// Issues and resolves API keys
///
/// Creation goes through the store's atomic insert-if-absent, so racing
/// first requests for the same instance converge on one record.
pub struct KeyRegistry {
    store: Arc<dyn Store>,
    secret: String,
}

impl KeyRegistry {
    /// Create a registry deriving keys with `secret`
    pub fn new(store: Arc<dyn Store>, secret: impl Into<String>) -> Self {
        Self {
            store,
            secret: secret.into(),
        }
    }

    /// Return the record bound to `instance_id`, creating a free-tier one if needed
    ///
    /// An existing record is returned unchanged: its key is never re-derived
    /// and its tier is never reset.
    #[instrument(skip(self), fields(instance_id = %instance_id))]
    pub async fn get_or_create(&self, instance_id: &str) -> AppResult<Registration> {
        if !validate_instance_id(instance_id) {
            return Err(AppError::Validation(
                "Invalid office instance ID format".to_string(),
            ));
        }

        if let Some(record) = self.store.find_by_instance_id(instance_id).await? {
            debug!(api_key = %key_fingerprint(&record.api_key), "Instance already has a key");
            return Ok(Registration {
                record,
                created: false,
            });
        }

        let candidate = ApiKeyRecord::new(
            instance_id,
            derive_key(instance_id, &self.secret),
            Tier::Free,
            Utc::now(),
        );

        let registration = self.store.insert_key_if_absent(candidate).await?;

        if registration.created {
            record_key_issued();
            info!(
                api_key = %key_fingerprint(&registration.record.api_key),
                tier = registration.record.tier.as_str(),
                "Issued new API key"
            );
        } else {
            debug!("Lost creation race; returning the stored record");
        }

        Ok(registration)
    }

    /// Resolve an API key to its record
    #[instrument(skip_all, fields(api_key = %key_fingerprint(api_key)))]
    pub async fn get_by_key(&self, api_key: &str) -> AppResult<ApiKeyRecord> {
        self.store
            .find_by_api_key(api_key)
            .await?
            .ok_or(AppError::InvalidApiKey)
    }
}
