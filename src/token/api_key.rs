//! Opaque API keys for programmatic access.
//!
//! Same at-rest discipline as refresh tokens: the full key is shown once at
//! creation and only its SHA-256 digest is stored. The `lxk_` prefix routes
//! bearer values to the key path instead of the JWT path, and the first few
//! characters are kept in cleartext so users can tell their keys apart.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub const KEY_PREFIX: &str = "lxk_";
pub const KEY_BYTES: usize = 32;
/// Cleartext identification prefix, `lxk_` plus eight characters.
pub const DISPLAY_PREFIX_LEN: usize = 12;

/// Generates a new API key. Returns the full key and its display prefix.
#[must_use]
pub fn generate_api_key() -> (String, String) {
    let mut bytes = [0u8; KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let key = format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));
    let prefix = key[..DISPLAY_PREFIX_LEN].to_string();
    (key, prefix)
}

/// Digest of an API key as persisted.
#[must_use]
pub fn hash_api_key(key: &str) -> Vec<u8> {
    Sha256::digest(key.as_bytes()).to_vec()
}

/// True when a presented bearer value is an API key rather than a JWT.
#[must_use]
pub fn looks_like_api_key(bearer: &str) -> bool {
    bearer.starts_with(KEY_PREFIX)
}
