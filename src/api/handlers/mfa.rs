use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::service::AuthService;

use super::types::{ConfirmMfaRequest, DisableMfaRequest, EnrollResponse, ErrorResponse};
use super::{bad_request, error_response, principal};

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/enroll",
    responses(
        (status = 200, description = "Enrollment started; secret and backup codes shown once", body = EnrollResponse),
        (status = 409, description = "MFA already enabled", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn enroll(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.begin_mfa_enrollment(&ctx).await {
        Ok(start) => (
            StatusCode::OK,
            Json(EnrollResponse {
                secret: start.secret,
                provisioning_uri: start.provisioning_uri,
                backup_codes: start.backup_codes,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/confirm",
    request_body = ConfirmMfaRequest,
    responses(
        (status = 204, description = "MFA enabled; other sessions revoked"),
        (status = 400, description = "No enrollment in progress", body = ErrorResponse),
        (status = 401, description = "Invalid code", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn confirm(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Option<Json<ConfirmMfaRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = body else {
        return bad_request("invalid request body");
    };
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.confirm_mfa_enrollment(&ctx, &body.code).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/disable",
    request_body = DisableMfaRequest,
    responses(
        (status = 204, description = "MFA disabled; other sessions revoked"),
        (status = 400, description = "MFA not enabled", body = ErrorResponse),
        (status = 401, description = "Wrong password or code", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn disable(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Option<Json<DisableMfaRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = body else {
        return bad_request("invalid request body");
    };
    let ctx = match principal::require_auth(&headers, &service).await {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match service.disable_mfa(&ctx, &body.password, &body.code).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}
