use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Claims carried by an access token.
///
/// `gen` is the session's refresh generation at issuance; it ties the token
/// to the rotation that produced it for audit purposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub gen: i64,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl AccessClaims {
    #[must_use]
    pub fn new(sub: Uuid, sid: Uuid, generation: i64, ttl_secs: i64, issuer: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub,
            sid,
            gen: generation,
            iat: now,
            exp: now + ttl_secs,
            iss: issuer.to_string(),
        }
    }
}

pub fn encode_access(claims: &AccessClaims, secret: &[u8]) -> AuthResult<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|err| AuthError::Store(anyhow::anyhow!("failed to sign access token: {err}")))
}

pub fn decode_access(token: &str, secret: &[u8], issuer: &str) -> AuthResult<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[issuer]);
    match decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation) {
        Ok(data) => Ok(data.claims),
        Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
            Err(AuthError::TokenExpired)
        }
        Err(_) => Err(AuthError::TokenMalformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";
    const ISSUER: &str = "lexauth";

    #[test]
    fn round_trip_preserves_claims() {
        let claims = AccessClaims::new(Uuid::new_v4(), Uuid::new_v4(), 3, 900, ISSUER);
        let token = encode_access(&claims, SECRET).unwrap();
        let decoded = decode_access(&token, SECRET, ISSUER).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let claims = AccessClaims::new(Uuid::new_v4(), Uuid::new_v4(), 1, -60, ISSUER);
        let token = encode_access(&claims, SECRET).unwrap();
        let err = decode_access(&token, SECRET, ISSUER).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let claims = AccessClaims::new(Uuid::new_v4(), Uuid::new_v4(), 1, 900, ISSUER);
        let token = encode_access(&claims, SECRET).unwrap();
        let err = decode_access(&token, b"other-secret", ISSUER).unwrap_err();
        assert!(matches!(err, AuthError::TokenMalformed));
    }

    #[test]
    fn wrong_issuer_is_malformed() {
        let claims = AccessClaims::new(Uuid::new_v4(), Uuid::new_v4(), 1, 900, "someone-else");
        let token = encode_access(&claims, SECRET).unwrap();
        let err = decode_access(&token, SECRET, ISSUER).unwrap_err();
        assert!(matches!(err, AuthError::TokenMalformed));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode_access("not-a-token", SECRET, ISSUER).unwrap_err();
        assert!(matches!(err, AuthError::TokenMalformed));
    }
}
