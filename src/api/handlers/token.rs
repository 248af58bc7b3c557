use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::service::AuthService;

use super::types::{ErrorResponse, RefreshRequest, TokenPairResponse};
use super::{bad_request, error_response, principal};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated credential pair", body = TokenPairResponse),
        (status = 401, description = "Token invalid, expired, or replayed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    service: Extension<Arc<AuthService>>,
    body: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = body else {
        return bad_request("invalid request body");
    };
    match service.refresh(&body.refresh_token).await {
        Ok(pair) => (
            StatusCode::OK,
            Json(TokenPairResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
                token_type: "Bearer",
                expires_in: service.config().access_ttl_seconds(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Current session revoked"),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.logout(&ctx).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
