//! Credential pair issuance and rotation.
//!
//! Access tokens are short-lived signed claims, verified statelessly.
//! Refresh tokens are opaque single-use secrets: 32 random bytes,
//! base64-encoded for the wire and SHA-256 hashed at rest.

pub mod api_key;
pub mod claims;
pub mod engine;

pub use claims::AccessClaims;
pub use engine::{CredentialPair, TokenEngine};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Generates an opaque refresh token. The caller never sees the stored form.
#[must_use]
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest of a refresh token as persisted. Lookup is by hash, so a leaked
/// store never yields usable tokens.
#[must_use]
pub fn hash_refresh_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tokens_are_unique() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_ne!(a, b);
    }

    #[test]
    fn refresh_tokens_are_url_safe() {
        let token = generate_refresh_token();
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
        assert!(URL_SAFE_NO_PAD.decode(&token).is_ok());
    }

    #[test]
    fn hash_is_stable_and_token_sized() {
        let token = generate_refresh_token();
        let h1 = hash_refresh_token(&token);
        let h2 = hash_refresh_token(&token);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 32);
        assert_ne!(h1, hash_refresh_token("other"));
    }
}
