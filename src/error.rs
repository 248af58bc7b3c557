//! Error taxonomy for the auth core.
//!
//! Authentication failures stay generic on the wire: the HTTP layer maps
//! `InvalidCredentials` to the same denial whether the email was unknown or the
//! password wrong, to resist account enumeration.

use axum::http::StatusCode;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("multi-factor code required")]
    MfaRequired,
    #[error("invalid multi-factor code")]
    InvalidMfaCode,
    #[error("multi-factor authentication is not enabled")]
    MfaNotEnabled,
    #[error("multi-factor authentication is already enabled")]
    MfaAlreadyEnabled,
    #[error("no enrollment in progress")]
    NoEnrollment,
    #[error("token expired")]
    TokenExpired,
    #[error("malformed token")]
    TokenMalformed,
    #[error("refresh token reuse detected")]
    TokenReused,
    #[error("session revoked")]
    SessionRevoked,
    #[error("permission denied")]
    PermissionDenied,
    #[error("too many attempts")]
    RateLimited,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password does not meet requirements")]
    WeakPassword,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::MfaRequired
            | Self::InvalidMfaCode
            | Self::TokenExpired
            | Self::TokenMalformed
            | Self::TokenReused
            | Self::SessionRevoked => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::EmailTaken | Self::MfaAlreadyEnabled => StatusCode::CONFLICT,
            Self::MfaNotEnabled
            | Self::NoEnrollment
            | Self::InvalidEmail
            | Self::WeakPassword => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients. Storage errors are not echoed.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
