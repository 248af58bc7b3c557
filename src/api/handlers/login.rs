use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::service::{AuthService, LoginOutcome};

use super::types::{ErrorResponse, IdentityResponse, LoginRequest, LoginResponse, TokenPairResponse};
use super::{bad_request, error_response, principal};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, or MFA code required", body = LoginResponse),
        (status = 401, description = "Invalid credentials or MFA code", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = body else {
        return bad_request("invalid request body");
    };
    let device = principal::device_name(body.device, &headers);
    let ip = principal::client_ip(&headers);
    match service
        .login(
            &body.email,
            &body.password,
            body.mfa_code.as_deref(),
            &device,
            ip,
        )
        .await
    {
        Ok(LoginOutcome::MfaRequired) => {
            let response = LoginResponse {
                requires_mfa: true,
                tokens: None,
                identity: None,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(LoginOutcome::LoggedIn(issued)) => {
            let response = LoginResponse {
                requires_mfa: false,
                tokens: Some(TokenPairResponse {
                    access_token: issued.access_token,
                    refresh_token: issued.refresh_token,
                    token_type: "Bearer",
                    expires_in: service.config().access_ttl_seconds(),
                }),
                identity: Some(IdentityResponse::from(&issued.identity)),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => error_response(&err),
    }
}
