//! Argon2id password hashing.
//!
//! Hashing and verification are CPU-bound; callers on the request path run
//! these through `spawn_blocking`.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;

use crate::error::{AuthError, AuthResult};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 512;

/// Reject passwords outside the accepted length bounds.
pub fn validate(password: &str) -> AuthResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN || len > MAX_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

/// Hash a password with Argon2id and a fresh salt.
pub fn hash(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::Store(anyhow::anyhow!("failed to hash password")))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored PHC-format hash.
///
/// Unparseable hashes verify as false rather than erroring; a corrupt stored
/// hash must fail closed.
#[must_use]
pub fn verify(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
