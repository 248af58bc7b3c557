use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::service::AuthService;

use super::types::{ErrorResponse, IdentityResponse, MeResponse};
use super::{error_response, principal};

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Caller identity and effective permissions", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, service: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.current_identity(&ctx).await {
        Ok(identity) => (
            StatusCode::OK,
            Json(MeResponse {
                identity: IdentityResponse::from(&identity),
                permissions: ctx.permissions.to_sorted_capabilities(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
