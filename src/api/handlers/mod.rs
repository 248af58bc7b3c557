pub(crate) mod api_key;
pub(crate) mod audit;
pub(crate) mod health;
pub(crate) mod login;
pub(crate) mod me;
pub(crate) mod mfa;
pub(crate) mod password;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod session;
pub(crate) mod token;
pub(crate) mod types;

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use tracing::error;

use crate::error::AuthError;
use types::ErrorResponse;

/// Maps a service error onto the wire. Store failures are logged in full
/// and surfaced as an opaque 500.
pub(crate) fn error_response(err: &AuthError) -> Response {
    if let AuthError::Store(inner) = err {
        error!("storage failure: {inner:#}");
    }
    (
        err.status(),
        Json(ErrorResponse {
            error: err.public_message(),
        }),
    )
        .into_response()
}

pub(crate) fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
