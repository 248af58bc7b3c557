//! Identity data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::Capability;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Disabled,
}

impl IdentityStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// One Argon2id-hashed backup code. Codes are single use; `used` flips exactly
/// once and never back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupCode {
    pub hash: String,
    pub used: bool,
}

/// Promoted MFA material. Exists on an identity only after a confirmed
/// enrollment; pending enrollments live in their own short-TTL records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MfaState {
    /// TOTP secret sealed for storage; never held in cleartext at rest.
    pub secret: String,
    pub backup_codes: Vec<BackupCode>,
}

#[derive(Clone, Debug)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub status: IdentityStatus,
    pub roles: Vec<String>,
    /// Per-identity capability grants on top of role capabilities.
    pub overrides: Vec<Capability>,
    pub mfa: Option<MfaState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    #[must_use]
    pub fn mfa_enabled(&self) -> bool {
        self.mfa.is_some()
    }
}

/// Fields needed to create an identity at registration time.
#[derive(Clone, Debug)]
pub struct NewIdentity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<String>,
}

impl NewIdentity {
    #[must_use]
    pub fn into_identity(self) -> Identity {
        let now = Utc::now();
        Identity {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            status: IdentityStatus::Active,
            roles: self.roles,
            overrides: Vec::new(),
            mfa: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        assert_eq!(
            IdentityStatus::parse(IdentityStatus::Active.as_str()),
            Some(IdentityStatus::Active)
        );
        assert_eq!(
            IdentityStatus::parse(IdentityStatus::Disabled.as_str()),
            Some(IdentityStatus::Disabled)
        );
        assert_eq!(IdentityStatus::parse("locked"), None);
    }

    #[test]
    fn new_identity_starts_active_without_mfa() {
        let identity = NewIdentity {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            roles: vec!["user".to_string()],
        }
        .into_identity();
        assert!(identity.is_active());
        assert!(!identity.mfa_enabled());
        assert!(identity.overrides.is_empty());
    }
}
