use std::sync::Arc;

use chrono::{Duration, Utc};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{BackupCode, Identity, MfaState};
use crate::store::{AuthStore, PendingEnrollment};

use super::backup::{self, BackupCodeBatch};
use super::crypto;

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;

/// Handed to the user at enrollment start. The secret and backup codes are
/// displayed once and never retrievable again.
#[derive(Debug)]
pub struct EnrollmentStart {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

/// Which factor satisfied verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaVerification {
    Totp,
    BackupCode(usize),
}

/// TOTP enrollment and verification.
///
/// Enrollment is two-phase: `begin_enrollment` parks the secret in a
/// pending record with a short TTL, and only `confirm_enrollment` with a
/// valid code turns the factor on. An unconfirmed secret never gates login.
///
/// Secrets are sealed with [`crypto`] before they reach the store, pending
/// records included.
pub struct MfaService {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
    seal_key: [u8; 32],
}

impl MfaService {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, config: Arc<AuthConfig>) -> Self {
        // Domain-separated from the token signing use of the same secret.
        let mut hasher = Sha256::new();
        hasher.update(b"lexauth.mfa.seal.v1");
        hasher.update(config.token_secret().expose_secret().as_bytes());
        let seal_key = hasher.finalize().into();
        Self {
            store,
            config,
            seal_key,
        }
    }

    fn unseal_base32(&self, sealed: &str, identity_id: uuid::Uuid) -> AuthResult<String> {
        let bytes = crypto::open_secret(&self.seal_key, sealed, identity_id)?;
        String::from_utf8(bytes)
            .map_err(|err| AuthError::Store(anyhow::anyhow!("sealed secret is not utf-8: {err}")))
    }

    fn build_totp(&self, secret_base32: &str, account: &str) -> AuthResult<TOTP> {
        let secret = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|err| AuthError::Store(anyhow::anyhow!("bad totp secret: {err:?}")))?;
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            self.config.totp_skew(),
            TOTP_STEP,
            secret,
            Some(self.config.totp_issuer().to_string()),
            account.to_string(),
        )
        .map_err(|err| AuthError::Store(anyhow::anyhow!("failed to build totp: {err}")))
    }

    fn check_code(&self, totp: &TOTP, code: &str) -> AuthResult<bool> {
        totp.check_current(code.trim())
            .map_err(|err| AuthError::Store(anyhow::anyhow!("clock error: {err}")))
    }

    pub async fn begin_enrollment(&self, identity: &Identity) -> AuthResult<EnrollmentStart> {
        if identity.mfa_enabled() {
            return Err(AuthError::MfaAlreadyEnabled);
        }
        let secret_bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|err| AuthError::Store(anyhow::anyhow!("bad totp secret: {err:?}")))?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            self.config.totp_skew(),
            TOTP_STEP,
            secret_bytes,
            Some(self.config.totp_issuer().to_string()),
            identity.email.clone(),
        )
        .map_err(|err| AuthError::Store(anyhow::anyhow!("failed to build totp: {err}")))?;
        let secret = totp.get_secret_base32();
        let count = self.config.backup_code_count();
        let batch = tokio::task::spawn_blocking(move || BackupCodeBatch::generate(count))
            .await
            .map_err(|err| AuthError::Store(anyhow::anyhow!("hashing task failed: {err}")))??;
        let sealed = crypto::seal_secret(&self.seal_key, secret.as_bytes(), identity.id)?;
        self.store
            .put_pending_enrollment(PendingEnrollment {
                identity_id: identity.id,
                secret: sealed,
                backup_code_hashes: batch.hashes,
                expires_at: Utc::now() + Duration::seconds(self.config.enrollment_ttl_seconds()),
            })
            .await?;
        Ok(EnrollmentStart {
            provisioning_uri: totp.get_url(),
            secret,
            backup_codes: batch.plain,
        })
    }

    /// Turns the factor on once the user proves they hold the secret.
    pub async fn confirm_enrollment(&self, identity: &Identity, code: &str) -> AuthResult<()> {
        let Some(pending) = self.store.pending_enrollment(identity.id).await? else {
            return Err(AuthError::NoEnrollment);
        };
        if pending.expires_at <= Utc::now() {
            self.store.delete_pending_enrollment(identity.id).await?;
            return Err(AuthError::NoEnrollment);
        }
        let secret_base32 = self.unseal_base32(&pending.secret, identity.id)?;
        let totp = self.build_totp(&secret_base32, &identity.email)?;
        if !self.check_code(&totp, code)? {
            return Err(AuthError::InvalidMfaCode);
        }
        let backup_codes = pending
            .backup_code_hashes
            .into_iter()
            .map(|hash| BackupCode { hash, used: false })
            .collect();
        self.store
            .enable_mfa(
                identity.id,
                MfaState {
                    secret: pending.secret,
                    backup_codes,
                },
            )
            .await?;
        self.store.delete_pending_enrollment(identity.id).await?;
        Ok(())
    }

    /// Checks a presented code against the TOTP secret first, then against
    /// unused backup codes. A matched backup code is consumed atomically;
    /// losing that race reads as an invalid code.
    pub async fn verify(&self, identity: &Identity, code: &str) -> AuthResult<MfaVerification> {
        let Some(mfa) = &identity.mfa else {
            return Err(AuthError::MfaNotEnabled);
        };
        let secret_base32 = self.unseal_base32(&mfa.secret, identity.id)?;
        let totp = self.build_totp(&secret_base32, &identity.email)?;
        if self.check_code(&totp, code)? {
            return Ok(MfaVerification::Totp);
        }
        let candidates: Vec<(usize, String)> = mfa
            .backup_codes
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.used)
            .map(|(i, c)| (i, c.hash.clone()))
            .collect();
        if candidates.is_empty() {
            return Err(AuthError::InvalidMfaCode);
        }
        let presented = code.to_string();
        let matched = tokio::task::spawn_blocking(move || {
            candidates
                .into_iter()
                .find(|(_, hash)| backup::verify(&presented, hash))
                .map(|(index, _)| index)
        })
        .await
        .map_err(|err| AuthError::Store(anyhow::anyhow!("hashing task failed: {err}")))?;
        let Some(index) = matched else {
            return Err(AuthError::InvalidMfaCode);
        };
        if !self.store.consume_backup_code(identity.id, index).await? {
            return Err(AuthError::InvalidMfaCode);
        }
        Ok(MfaVerification::BackupCode(index))
    }

    pub async fn disable(&self, identity: &Identity) -> AuthResult<()> {
        if !identity.mfa_enabled() {
            return Err(AuthError::MfaNotEnabled);
        }
        self.store.disable_mfa(identity.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NewIdentity;
    use crate::store::memory::MemStore;
    use secrecy::SecretString;
    use uuid::Uuid;

    fn test_config() -> Arc<AuthConfig> {
        Arc::new(
            AuthConfig::new(SecretString::from("mfa-test-secret")).with_backup_code_count(3),
        )
    }

    async fn seeded_identity(store: &MemStore) -> Identity {
        let identity = NewIdentity {
            id: Uuid::new_v4(),
            email: "mfa@example.com".to_string(),
            password_hash: "unused".to_string(),
            roles: vec!["user".to_string()],
        }
        .into_identity();
        store.insert_identity(identity.clone()).await.unwrap();
        identity
    }

    fn current_code(secret_base32: &str) -> String {
        let secret = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            1,
            TOTP_STEP,
            secret,
            Some("Lexicon".to_string()),
            "mfa@example.com".to_string(),
        )
        .unwrap();
        totp.generate_current().unwrap()
    }

    #[tokio::test]
    async fn enroll_confirm_and_verify_with_totp() {
        let store = Arc::new(MemStore::new());
        let service = MfaService::new(store.clone(), test_config());
        let identity = seeded_identity(&store).await;

        let start = service.begin_enrollment(&identity).await.unwrap();
        assert_eq!(start.backup_codes.len(), 3);
        assert!(start.provisioning_uri.starts_with("otpauth://totp/"));

        service
            .confirm_enrollment(&identity, &current_code(&start.secret))
            .await
            .unwrap();
        let identity = store.identity_by_id(identity.id).await.unwrap().unwrap();
        assert!(identity.mfa_enabled());

        let outcome = service
            .verify(&identity, &current_code(&start.secret))
            .await
            .unwrap();
        assert_eq!(outcome, MfaVerification::Totp);
    }

    #[tokio::test]
    async fn confirm_rejects_wrong_code_and_keeps_mfa_off() {
        let store = Arc::new(MemStore::new());
        let service = MfaService::new(store.clone(), test_config());
        let identity = seeded_identity(&store).await;
        service.begin_enrollment(&identity).await.unwrap();

        let err = service
            .confirm_enrollment(&identity, "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidMfaCode));
        let identity = store.identity_by_id(identity.id).await.unwrap().unwrap();
        assert!(!identity.mfa_enabled());
    }

    #[tokio::test]
    async fn confirm_without_enrollment_is_rejected() {
        let store = Arc::new(MemStore::new());
        let service = MfaService::new(store.clone(), test_config());
        let identity = seeded_identity(&store).await;
        let err = service
            .confirm_enrollment(&identity, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoEnrollment));
    }

    #[tokio::test]
    async fn expired_enrollment_is_gone() {
        let store = Arc::new(MemStore::new());
        let config = Arc::new(
            AuthConfig::new(SecretString::from("mfa-test-secret"))
                .with_backup_code_count(1)
                .with_enrollment_ttl_seconds(-1),
        );
        let service = MfaService::new(store.clone(), config);
        let identity = seeded_identity(&store).await;
        let start = service.begin_enrollment(&identity).await.unwrap();
        let err = service
            .confirm_enrollment(&identity, &current_code(&start.secret))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoEnrollment));
        assert!(store.pending_enrollment(identity.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backup_code_works_exactly_once() {
        let store = Arc::new(MemStore::new());
        let service = MfaService::new(store.clone(), test_config());
        let identity = seeded_identity(&store).await;
        let start = service.begin_enrollment(&identity).await.unwrap();
        service
            .confirm_enrollment(&identity, &current_code(&start.secret))
            .await
            .unwrap();
        let identity = store.identity_by_id(identity.id).await.unwrap().unwrap();

        let code = start.backup_codes[0].clone();
        let outcome = service.verify(&identity, &code).await.unwrap();
        assert!(matches!(outcome, MfaVerification::BackupCode(_)));

        let identity = store.identity_by_id(identity.id).await.unwrap().unwrap();
        let err = service.verify(&identity, &code).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidMfaCode));
    }

    #[tokio::test]
    async fn second_enrollment_while_enabled_is_rejected() {
        let store = Arc::new(MemStore::new());
        let service = MfaService::new(store.clone(), test_config());
        let identity = seeded_identity(&store).await;
        let start = service.begin_enrollment(&identity).await.unwrap();
        service
            .confirm_enrollment(&identity, &current_code(&start.secret))
            .await
            .unwrap();
        let identity = store.identity_by_id(identity.id).await.unwrap().unwrap();
        let err = service.begin_enrollment(&identity).await.unwrap_err();
        assert!(matches!(err, AuthError::MfaAlreadyEnabled));
    }

    #[tokio::test]
    async fn secret_never_reaches_the_store_in_cleartext() {
        let store = Arc::new(MemStore::new());
        let service = MfaService::new(store.clone(), test_config());
        let identity = seeded_identity(&store).await;

        let start = service.begin_enrollment(&identity).await.unwrap();
        let pending = store.pending_enrollment(identity.id).await.unwrap().unwrap();
        assert_ne!(pending.secret, start.secret);
        assert!(!pending.secret.contains(&start.secret));

        service
            .confirm_enrollment(&identity, &current_code(&start.secret))
            .await
            .unwrap();
        let identity = store.identity_by_id(identity.id).await.unwrap().unwrap();
        let persisted = identity.mfa.as_ref().unwrap();
        assert_ne!(persisted.secret, start.secret);
        assert!(!persisted.secret.contains(&start.secret));

        // The sealed copy still verifies codes from the user-visible secret.
        let outcome = service
            .verify(&identity, &current_code(&start.secret))
            .await
            .unwrap();
        assert_eq!(outcome, MfaVerification::Totp);
    }
}
