use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::service::AuthService;

use super::types::{ErrorResponse, IdentityResponse, LoginResponse, RegisterRequest, TokenPairResponse};
use super::{bad_request, error_response, principal};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = LoginResponse),
        (status = 400, description = "Invalid email or weak password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = body else {
        return bad_request("invalid request body");
    };
    let device = principal::device_name(body.device, &headers);
    let ip = principal::client_ip(&headers);
    match service.register(&body.email, &body.password, &device, ip).await {
        Ok(issued) => {
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
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(err) => error_response(&err),
    }
}
