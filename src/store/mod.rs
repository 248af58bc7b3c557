//! Storage contract for identities, sessions, refresh tokens, pending MFA
//! enrollments, and audit rows.
//!
//! Two backends: `PgStore` for production and `MemStore` for tests and local
//! development. Generation advancement is a compare-and-swap in both, which is
//! the only cross-request atomicity the auth core relies on.

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::identity::{Identity, MfaState};

/// Outcome when inserting a new identity (email is unique).
#[derive(Debug)]
pub enum InsertIdentityOutcome {
    Created,
    EmailTaken,
}

/// One logged-in device. The unit of revocation.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub device: String,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Current refresh generation; only the matching refresh token is live.
    pub refresh_generation: i64,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    #[must_use]
    pub fn revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// One issued refresh token, stored hashed. Records are kept for the token
/// lifetime so that replay of a superseded generation can be recognized.
#[derive(Clone, Debug)]
pub struct RefreshRecord {
    pub token_hash: Vec<u8>,
    pub session_id: Uuid,
    pub generation: i64,
    pub expires_at: DateTime<Utc>,
}

/// Transient enrollment state between "setup initiated" and "setup verified".
#[derive(Clone, Debug)]
pub struct PendingEnrollment {
    pub identity_id: Uuid,
    /// Sealed TOTP secret, same at-rest form as the promoted one.
    pub secret: String,
    pub backup_code_hashes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// One API key for programmatic access. Stored hashed; the prefix is kept
/// only so users can tell their keys apart.
#[derive(Clone, Debug)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub name: String,
    pub prefix: String,
    pub key_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    #[must_use]
    pub fn revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Append-only security event row.
#[derive(Clone, Debug)]
pub struct AuditRow {
    pub id: Uuid,
    pub event: String,
    pub identity_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    // Identities
    async fn insert_identity(&self, identity: Identity) -> Result<InsertIdentityOutcome>;
    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>>;
    async fn identity_by_id(&self, id: Uuid) -> Result<Option<Identity>>;
    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<()>;
    async fn enable_mfa(&self, id: Uuid, mfa: MfaState) -> Result<()>;
    async fn disable_mfa(&self, id: Uuid) -> Result<()>;
    /// Flip one backup code to used. Returns false when it was already used.
    async fn consume_backup_code(&self, id: Uuid, index: usize) -> Result<bool>;

    // Sessions
    async fn insert_session(&self, session: SessionRecord) -> Result<()>;
    async fn session_by_id(&self, id: Uuid) -> Result<Option<SessionRecord>>;
    /// Live sessions for an identity, last-seen descending.
    async fn sessions_for_identity(&self, identity_id: Uuid) -> Result<Vec<SessionRecord>>;
    async fn touch_session(&self, id: Uuid) -> Result<()>;
    /// Returns false when the session did not exist or was already revoked.
    async fn revoke_session(&self, id: Uuid) -> Result<bool>;
    /// Revoke every live session of an identity, optionally sparing one.
    /// Returns the number of sessions revoked.
    async fn revoke_all_sessions(&self, identity_id: Uuid, except: Option<Uuid>) -> Result<u64>;
    /// Compare-and-swap the refresh generation from `expected` to
    /// `expected + 1`. Returns false when the stored generation differs or the
    /// session is revoked; exactly one of any set of concurrent callers with
    /// the same `expected` succeeds.
    async fn advance_generation(&self, session_id: Uuid, expected: i64) -> Result<bool>;

    // Refresh tokens
    async fn insert_refresh_token(&self, record: RefreshRecord) -> Result<()>;
    async fn refresh_token_by_hash(&self, hash: &[u8]) -> Result<Option<RefreshRecord>>;
    /// Drop records past their expiry. Live records stay regardless of
    /// session state so that replay of a superseded generation is still
    /// recognized. Returns how many records were removed.
    async fn prune_expired_refresh_tokens(&self) -> Result<u64>;

    // API keys
    async fn insert_api_key(&self, record: ApiKeyRecord) -> Result<()>;
    async fn api_key_by_hash(&self, hash: &[u8]) -> Result<Option<ApiKeyRecord>>;
    /// Live keys for an identity, newest first.
    async fn api_keys_for_identity(&self, identity_id: Uuid) -> Result<Vec<ApiKeyRecord>>;
    async fn touch_api_key(&self, id: Uuid) -> Result<()>;
    /// Returns false when the key did not exist or was already revoked.
    async fn revoke_api_key(&self, id: Uuid) -> Result<bool>;

    // Pending MFA enrollments
    /// Insert or replace the pending enrollment for an identity.
    async fn put_pending_enrollment(&self, pending: PendingEnrollment) -> Result<()>;
    async fn pending_enrollment(&self, identity_id: Uuid) -> Result<Option<PendingEnrollment>>;
    async fn delete_pending_enrollment(&self, identity_id: Uuid) -> Result<()>;

    // Audit
    async fn append_audit(&self, row: AuditRow) -> Result<()>;
    async fn audit_for_identity(&self, identity_id: Uuid, limit: i64) -> Result<Vec<AuditRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_identity_outcome_debug_names() {
        assert_eq!(format!("{:?}", InsertIdentityOutcome::Created), "Created");
        assert_eq!(
            format!("{:?}", InsertIdentityOutcome::EmailTaken),
            "EmailTaken"
        );
    }

    #[test]
    fn session_record_revoked_flag() {
        let now = Utc::now();
        let mut session = SessionRecord {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            device: "cli".to_string(),
            ip: None,
            created_at: now,
            last_seen_at: now,
            refresh_generation: 1,
            revoked_at: None,
        };
        assert!(!session.revoked());
        session.revoked_at = Some(now);
        assert!(session.revoked());
    }
}
