//! Key derivation and instance id validation

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Namespace marker on every issued key
pub const API_KEY_PREFIX: &str = "ex_";

/// Hex characters of the digest kept in the key
const DIGEST_HEX_LEN: usize = 32;

const MIN_INSTANCE_ID_LEN: usize = 10;
const MAX_INSTANCE_ID_LEN: usize = 200;

static INSTANCE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("instance id pattern is valid"));

/// Derive the API key for an instance id
///
/// SHA-256 over `instance_id ‖ secret`, truncated to 32 hex characters and
/// prefixed with [`API_KEY_PREFIX`]. The same inputs always produce the same key.
pub fn derive_key(instance_id: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instance_id.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}{}", API_KEY_PREFIX, &digest[..DIGEST_HEX_LEN])
}

/// Check an instance id before it reaches derivation, storage, or logs
pub fn validate_instance_id(instance_id: &str) -> bool {
    (MIN_INSTANCE_ID_LEN..=MAX_INSTANCE_ID_LEN).contains(&instance_id.len())
        && INSTANCE_ID_PATTERN.is_match(instance_id)
}

/// Short, log-safe prefix of an API key
pub fn key_fingerprint(api_key: &str) -> &str {
    let end = api_key
        .char_indices()
        .nth(API_KEY_PREFIX.len() + 6)
        .map(|(i, _)| i)
        .unwrap_or(api_key.len());
    &api_key[..end]
}
