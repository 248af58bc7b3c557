use axum::{
    Json,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::service::AuthService;

use super::types::{AuditEntryResponse, ErrorResponse};
use super::{error_response, principal};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Number of events to return, newest first. Capped at 200.
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/v1/auth/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Caller's security events, newest first", body = [AuditEntryResponse]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn audit_trail(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match service.audit_trail(&ctx, limit).await {
        Ok(rows) => {
            let body: Vec<AuditEntryResponse> =
                rows.iter().map(AuditEntryResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(&err),
    }
}
