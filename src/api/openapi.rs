//! OpenAPI document for the auth endpoints.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use super::handlers::{
    api_key, audit, health, login, me, mfa, password, register, session, token, types,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "lexauth",
        description = "Identity, session, and access control service"
    ),
    paths(
        health::health,
        register::register,
        login::login,
        token::refresh,
        token::logout,
        me::me,
        audit::audit_trail,
        password::change_password,
        session::list_sessions,
        session::revoke_session,
        session::revoke_all_sessions,
        mfa::enroll,
        mfa::confirm,
        mfa::disable,
        api_key::create_api_key,
        api_key::list_api_keys,
        api_key::revoke_api_key,
    ),
    components(schemas(
        types::ErrorResponse,
        types::RegisterRequest,
        types::LoginRequest,
        types::LoginResponse,
        types::TokenPairResponse,
        types::IdentityResponse,
        types::RefreshRequest,
        types::SessionResponse,
        types::RevokeAllRequest,
        types::RevokeAllResponse,
        types::ChangePasswordRequest,
        types::EnrollResponse,
        types::ConfirmMfaRequest,
        types::DisableMfaRequest,
        types::MeResponse,
        crate::permission::Capability,
        types::AuditEntryResponse,
        types::ApiKeyCreateRequest,
        types::ApiKeyResponse,
        types::ApiKeyCreatedResponse,
        types::HealthResponse,
    )),
    tags(
        (name = "auth", description = "Registration, login, and token rotation"),
        (name = "sessions", description = "Session listing and revocation"),
        (name = "mfa", description = "Second factor enrollment"),
        (name = "api-keys", description = "Programmatic credentials"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// Serialized OpenAPI document.
/// # Errors
/// Returns an error if the document fails to serialize.
pub fn openapi() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}
