use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::service::AuthService;

use super::types::{ChangePasswordRequest, ErrorResponse};
use super::{bad_request, error_response, principal};

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed; other sessions revoked"),
        (status = 400, description = "New password too weak", body = ErrorResponse),
        (status = 401, description = "Current password wrong", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = body else {
        return bad_request("invalid request body");
    };
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service
        .change_password(&ctx, &body.current_password, &body.new_password)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
