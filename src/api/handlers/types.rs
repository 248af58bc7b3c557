//! Request and response bodies for the auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::identity::Identity;
use crate::permission::Capability;
use crate::store::{ApiKeyRecord, AuditRow, SessionRecord};

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub device: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// TOTP or backup code, required once MFA is enabled.
    pub mfa_code: Option<String>,
    pub device: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Serialize, ToSchema)]
pub struct IdentityResponse {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            roles: identity.roles.clone(),
            mfa_enabled: identity.mfa_enabled(),
            created_at: identity.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub requires_mfa: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPairResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub device: String,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// True for the session the request itself rode in on.
    pub current: bool,
}

impl SessionResponse {
    #[must_use]
    pub fn from_record(record: &SessionRecord, current_session: Option<Uuid>) -> Self {
        Self {
            id: record.id,
            device: record.device.clone(),
            ip: record.ip.clone(),
            created_at: record.created_at,
            last_seen_at: record.last_seen_at,
            current: current_session == Some(record.id),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RevokeAllRequest {
    /// Defaults to true; false revokes the current session too.
    pub keep_current: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct RevokeAllResponse {
    pub revoked: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct EnrollResponse {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ConfirmMfaRequest {
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DisableMfaRequest {
    pub password: String,
    pub code: String,
}

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub identity: IdentityResponse,
    /// Effective capabilities after role and override resolution.
    pub permissions: Vec<Capability>,
}

#[derive(Serialize, ToSchema)]
pub struct AuditEntryResponse {
    pub event: String,
    pub session_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

impl From<&AuditRow> for AuditEntryResponse {
    fn from(row: &AuditRow) -> Self {
        Self {
            event: row.event.clone(),
            session_id: row.session_id,
            metadata: row.metadata.clone(),
            recorded_at: row.recorded_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ApiKeyCreateRequest {
    pub name: String,
    /// Omitted means the key never expires.
    pub expires_in_days: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&ApiKeyRecord> for ApiKeyResponse {
    fn from(record: &ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            prefix: record.prefix.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ApiKeyCreatedResponse {
    /// Full key. Shown exactly once; only its hash survives server side.
    pub key: String,
    pub api_key: ApiKeyResponse,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}
