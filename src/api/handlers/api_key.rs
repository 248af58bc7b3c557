use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::service::AuthService;

use super::types::{ApiKeyCreateRequest, ApiKeyCreatedResponse, ApiKeyResponse, ErrorResponse};
use super::{bad_request, error_response, principal};

#[utoipa::path(
    post,
    path = "/v1/auth/api-keys",
    request_body = ApiKeyCreateRequest,
    responses(
        (status = 201, description = "Key created; the full value appears only here", body = ApiKeyCreatedResponse),
        (status = 400, description = "Missing or invalid name", body = ErrorResponse),
        (status = 403, description = "API-key callers cannot manage keys", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "api-keys"
)]
pub async fn create_api_key(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Option<Json<ApiKeyCreateRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = body else {
        return bad_request("invalid request body");
    };
    if body.name.trim().is_empty() || body.name.len() > 100 {
        return bad_request("name must be 1 to 100 characters");
    }
    if body.expires_in_days.is_some_and(|days| days <= 0) {
        return bad_request("expires_in_days must be positive");
    }
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service
        .create_api_key(&ctx, &body.name, body.expires_in_days)
        .await
    {
        Ok(minted) => (
            StatusCode::CREATED,
            Json(ApiKeyCreatedResponse {
                key: minted.key,
                api_key: ApiKeyResponse::from(&minted.record),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/api-keys",
    responses(
        (status = 200, description = "Live keys, newest first", body = [ApiKeyResponse]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "api-keys"
)]
pub async fn list_api_keys(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.list_api_keys(&ctx).await {
        Ok(keys) => {
            let body: Vec<ApiKeyResponse> = keys.iter().map(ApiKeyResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/api-keys/{id}",
    params(("id" = Uuid, Path, description = "Key to revoke")),
    responses(
        (status = 204, description = "Key revoked"),
        (status = 403, description = "Not the caller's key", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "api-keys"
)]
pub async fn revoke_api_key(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.revoke_api_key(&ctx, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
