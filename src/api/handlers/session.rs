use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::service::AuthService;

use super::types::{ErrorResponse, RevokeAllRequest, RevokeAllResponse, SessionResponse};
use super::{error_response, principal};

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Live sessions, most recently seen first", body = [SessionResponse]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.list_sessions(&ctx).await {
        Ok(sessions) => {
            let body: Vec<SessionResponse> = sessions
                .iter()
                .map(|record| SessionResponse::from_record(record, ctx.session_id()))
                .collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session to revoke")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 403, description = "Not the caller's session", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn revoke_session(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.revoke_session(&ctx, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/sessions/revoke-all",
    request_body = RevokeAllRequest,
    responses(
        (status = 200, description = "Sessions revoked", body = RevokeAllResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn revoke_all_sessions(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Option<Json<RevokeAllRequest>>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    // Absent body keeps the current session alive.
    let keep_current = body
        .and_then(|Json(body)| body.keep_current)
        .unwrap_or(true);
    match service.revoke_all_sessions(&ctx, keep_current).await {
        Ok(revoked) => (StatusCode::OK, Json(RevokeAllResponse { revoked })).into_response(),
        Err(err) => error_response(&err),
    }
}
