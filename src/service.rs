//! Orchestration layer: registration, login, rotation, session and MFA
//! management. HTTP handlers call into this and translate `AuthError`
//! into status codes; nothing here knows about axum.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{self, Identity, NewIdentity, password};
use crate::mfa::{EnrollmentStart, MfaService, MfaVerification};
use crate::permission::{PermissionResolver, PermissionSet, resolver::ROLE_USER};
use crate::rate_limit::{RateLimitAction, RateLimiter};
use crate::session::SessionRegistry;
use crate::store::{ApiKeyRecord, AuditRow, AuthStore, SessionRecord};
use crate::token::{CredentialPair, TokenEngine, api_key};

// Verified against unknown emails so lookup misses cost the same as
// password mismatches.
const DUMMY_PASSWORD: &str = "lexauth-dummy-credential";

/// Everything a successful login or registration hands back.
#[derive(Debug)]
pub struct IssuedCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
    pub session_id: Uuid,
}

#[derive(Debug)]
pub enum LoginOutcome {
    /// Password was right but the account has MFA on and no code came.
    MfaRequired,
    LoggedIn(Box<IssuedCredentials>),
}

/// How the request proved itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// Interactive access token bound to a session.
    Session { session_id: Uuid, generation: i64 },
    /// Programmatic API key. No session; session-bound operations refuse it.
    ApiKey { key_id: Uuid },
}

/// Proven caller identity for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity_id: Uuid,
    pub credential: Credential,
    pub permissions: PermissionSet,
}

impl AuthContext {
    /// Session the request rode in on; `None` for API-key callers.
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        match self.credential {
            Credential::Session { session_id, .. } => Some(session_id),
            Credential::ApiKey { .. } => None,
        }
    }
}

/// A freshly minted API key. The full key is visible here and never again.
#[derive(Debug)]
pub struct IssuedApiKey {
    pub key: String,
    pub record: ApiKeyRecord,
}

pub struct AuthService {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
    tokens: TokenEngine,
    sessions: SessionRegistry,
    mfa: MfaService,
    resolver: PermissionResolver,
    limiter: Arc<dyn RateLimiter>,
    audit: AuditSink,
    dummy_hash: String,
}

impl AuthService {
    /// Wires the sub-services. Hashes the enumeration-resistance dummy
    /// credential, so call this once at startup, not per request.
    pub fn new(
        store: Arc<dyn AuthStore>,
        config: Arc<AuthConfig>,
        limiter: Arc<dyn RateLimiter>,
        audit: AuditSink,
    ) -> AuthResult<Self> {
        let dummy_hash = password::hash(DUMMY_PASSWORD)?;
        Ok(Self {
            tokens: TokenEngine::new(store.clone(), config.clone(), audit.clone()),
            sessions: SessionRegistry::new(store.clone()),
            mfa: MfaService::new(store.clone(), config.clone()),
            resolver: PermissionResolver::with_builtin_roles(),
            store,
            config,
            limiter,
            audit,
            dummy_hash,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn verify_password(&self, presented: &str, stored_hash: &str) -> AuthResult<bool> {
        let presented = presented.to_string();
        let stored = stored_hash.to_string();
        tokio::task::spawn_blocking(move || password::verify(&presented, &stored))
            .await
            .map_err(|err| AuthError::Store(anyhow::anyhow!("hashing task failed: {err}")))
    }

    async fn hash_password(&self, password_plain: &str) -> AuthResult<String> {
        let password_plain = password_plain.to_string();
        tokio::task::spawn_blocking(move || password::hash(&password_plain))
            .await
            .map_err(|err| AuthError::Store(anyhow::anyhow!("hashing task failed: {err}")))?
    }

    async fn load_identity(&self, id: Uuid) -> AuthResult<Identity> {
        self.store
            .identity_by_id(id)
            .await?
            .ok_or(AuthError::InvalidCredentials)
    }

    fn check_limits(&self, action: RateLimitAction, email: &str, ip: Option<&str>) -> AuthResult<()> {
        if !self.limiter.check(action, email).allowed() {
            return Err(AuthError::RateLimited);
        }
        if let Some(ip) = ip {
            if !self.limiter.check(action, ip).allowed() {
                return Err(AuthError::RateLimited);
            }
        }
        Ok(())
    }

    fn note_failure(&self, action: RateLimitAction, email: &str, ip: Option<&str>) {
        self.limiter.record_failure(action, email);
        if let Some(ip) = ip {
            self.limiter.record_failure(action, ip);
        }
    }

    fn note_success(&self, action: RateLimitAction, email: &str, ip: Option<&str>) {
        self.limiter.record_success(action, email);
        if let Some(ip) = ip {
            self.limiter.record_success(action, ip);
        }
    }

    async fn issue_for(
        &self,
        identity: Identity,
        device: &str,
        ip: Option<String>,
    ) -> AuthResult<IssuedCredentials> {
        let session = self.sessions.create(identity.id, device, ip).await?;
        let pair = self.tokens.issue(&session).await?;
        Ok(IssuedCredentials {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            identity,
            session_id: session.id,
        })
    }

    /// Creates an account and logs it straight in.
    pub async fn register(
        &self,
        email: &str,
        password_plain: &str,
        device: &str,
        ip: Option<String>,
    ) -> AuthResult<IssuedCredentials> {
        let email = identity::normalize_email(email);
        if !identity::valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        password::validate(password_plain)?;
        let hash = self.hash_password(password_plain).await?;
        let identity = NewIdentity {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash: hash,
            roles: vec![ROLE_USER.to_string()],
        }
        .into_identity();
        match self.store.insert_identity(identity.clone()).await? {
            crate::store::InsertIdentityOutcome::Created => {}
            crate::store::InsertIdentityOutcome::EmailTaken => return Err(AuthError::EmailTaken),
        }
        self.audit.record(
            AuditEvent::Registered,
            Some(identity.id),
            None,
            json!({ "email": email }),
        );
        let issued = self.issue_for(identity, device, ip).await?;
        self.audit.record(
            AuditEvent::Login,
            Some(issued.identity.id),
            Some(issued.session_id),
            json!({ "device": device }),
        );
        Ok(issued)
    }

    /// Password (and second factor) login.
    ///
    /// Unknown emails, disabled accounts, and wrong passwords all collapse
    /// to `InvalidCredentials`; unknown emails still pay for a hash check.
    pub async fn login(
        &self,
        email: &str,
        password_plain: &str,
        mfa_code: Option<&str>,
        device: &str,
        ip: Option<String>,
    ) -> AuthResult<LoginOutcome> {
        let email = identity::normalize_email(email);
        self.check_limits(RateLimitAction::Login, &email, ip.as_deref())?;

        let Some(found) = self.store.identity_by_email(&email).await? else {
            self.verify_password(password_plain, &self.dummy_hash).await?;
            self.note_failure(RateLimitAction::Login, &email, ip.as_deref());
            self.audit.record(
                AuditEvent::FailedLogin,
                None,
                None,
                json!({ "email": email }),
            );
            return Err(AuthError::InvalidCredentials);
        };
        let password_ok = self
            .verify_password(password_plain, &found.password_hash)
            .await?;
        if !password_ok || !found.is_active() {
            self.note_failure(RateLimitAction::Login, &email, ip.as_deref());
            self.audit.record(
                AuditEvent::FailedLogin,
                Some(found.id),
                None,
                json!({ "email": email }),
            );
            return Err(AuthError::InvalidCredentials);
        }

        if found.mfa_enabled() {
            let Some(code) = mfa_code else {
                return Ok(LoginOutcome::MfaRequired);
            };
            self.check_limits(RateLimitAction::Mfa, &email, ip.as_deref())?;
            match self.mfa.verify(&found, code).await {
                Ok(MfaVerification::Totp) => {}
                Ok(MfaVerification::BackupCode(index)) => {
                    self.audit.record(
                        AuditEvent::BackupCodeUsed,
                        Some(found.id),
                        None,
                        json!({ "index": index }),
                    );
                }
                Err(err @ AuthError::InvalidMfaCode) => {
                    self.note_failure(RateLimitAction::Mfa, &email, ip.as_deref());
                    self.audit.record(
                        AuditEvent::MfaFailed,
                        Some(found.id),
                        None,
                        json!({ "email": email }),
                    );
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
            self.note_success(RateLimitAction::Mfa, &email, ip.as_deref());
        }

        self.note_success(RateLimitAction::Login, &email, ip.as_deref());
        let issued = self.issue_for(found, device, ip).await?;
        self.audit.record(
            AuditEvent::Login,
            Some(issued.identity.id),
            Some(issued.session_id),
            json!({ "device": device }),
        );
        Ok(LoginOutcome::LoggedIn(Box::new(issued)))
    }

    /// Rotates a refresh token. Replay revokes the whole session.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<CredentialPair> {
        let (pair, _session) = self.tokens.refresh(refresh_token).await?;
        Ok(pair)
    }

    /// Ends the caller's own session.
    pub async fn logout(&self, ctx: &AuthContext) -> AuthResult<()> {
        let session_id = self.require_session(ctx)?;
        self.sessions.revoke(session_id).await?;
        self.audit.record(
            AuditEvent::Logout,
            Some(ctx.identity_id),
            Some(session_id),
            json!({}),
        );
        Ok(())
    }

    /// Resolves a bearer value into a request context. API keys are routed
    /// by their prefix; everything else is treated as an access token.
    ///
    /// Token verification is stateless: a token stays valid until expiry even
    /// if its session was revoked since issuance. Mutating endpoints call
    /// `require_live_session` on top of this.
    pub async fn authenticate(&self, bearer: &str) -> AuthResult<AuthContext> {
        if api_key::looks_like_api_key(bearer) {
            return self.authenticate_api_key(bearer).await;
        }
        let claims = self.tokens.verify_access(bearer)?;
        let identity = self
            .store
            .identity_by_id(claims.sub)
            .await?
            .ok_or(AuthError::TokenMalformed)?;
        if !identity.is_active() {
            return Err(AuthError::InvalidCredentials);
        }
        // Access counts as activity for the device list.
        self.sessions.touch(claims.sid).await?;
        let permissions = self.resolver.resolve(&identity.roles, &identity.overrides);
        Ok(AuthContext {
            identity_id: claims.sub,
            credential: Credential::Session {
                session_id: claims.sid,
                generation: claims.gen,
            },
            permissions,
        })
    }

    /// Revoked, expired, and unknown keys all read as bad credentials.
    async fn authenticate_api_key(&self, presented: &str) -> AuthResult<AuthContext> {
        let hash = api_key::hash_api_key(presented);
        let key = self
            .store
            .api_key_by_hash(&hash)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if key.revoked() || key.expired(Utc::now()) {
            return Err(AuthError::InvalidCredentials);
        }
        let identity = self
            .store
            .identity_by_id(key.identity_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !identity.is_active() {
            return Err(AuthError::InvalidCredentials);
        }
        self.store.touch_api_key(key.id).await?;
        let permissions = self.resolver.resolve(&identity.roles, &identity.overrides);
        Ok(AuthContext {
            identity_id: identity.id,
            credential: Credential::ApiKey { key_id: key.id },
            permissions,
        })
    }

    /// Fail-closed capability check.
    pub fn authorize(&self, ctx: &AuthContext, resource: &str, action: &str) -> AuthResult<()> {
        if ctx.permissions.allows(resource, action) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied)
        }
    }

    /// Session-bound operations are off limits to API-key callers.
    fn require_session(&self, ctx: &AuthContext) -> AuthResult<Uuid> {
        ctx.session_id().ok_or(AuthError::PermissionDenied)
    }

    /// Rejects contexts whose session has been revoked in the meantime.
    pub async fn require_live_session(&self, ctx: &AuthContext) -> AuthResult<SessionRecord> {
        let session_id = self.require_session(ctx)?;
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::SessionRevoked)?;
        if session.revoked() {
            return Err(AuthError::SessionRevoked);
        }
        Ok(session)
    }

    pub async fn list_sessions(&self, ctx: &AuthContext) -> AuthResult<Vec<SessionRecord>> {
        self.sessions.list(ctx.identity_id).await
    }

    /// Revokes one of the caller's own sessions. Sessions belonging to
    /// anyone else are indistinguishable from nonexistent ones.
    pub async fn revoke_session(&self, ctx: &AuthContext, session_id: Uuid) -> AuthResult<()> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::PermissionDenied)?;
        if session.identity_id != ctx.identity_id {
            return Err(AuthError::PermissionDenied);
        }
        self.sessions.revoke(session_id).await?;
        self.audit.record(
            AuditEvent::SessionRevoked,
            Some(ctx.identity_id),
            Some(session_id),
            json!({}),
        );
        Ok(())
    }

    /// Bulk revocation, optionally sparing the current session. Returns the
    /// count of sessions revoked.
    pub async fn revoke_all_sessions(&self, ctx: &AuthContext, keep_current: bool) -> AuthResult<u64> {
        let session_id = self.require_session(ctx)?;
        let except = keep_current.then_some(session_id);
        let revoked = self.sessions.revoke_all(ctx.identity_id, except).await?;
        self.audit.record(
            AuditEvent::SessionRevoked,
            Some(ctx.identity_id),
            Some(session_id),
            json!({ "revoked": revoked, "keep_current": keep_current }),
        );
        Ok(revoked)
    }

    /// Changes the password and cuts every other session loose.
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        current: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let session = self.require_live_session(ctx).await?;
        let identity = self.load_identity(ctx.identity_id).await?;
        if !self.verify_password(current, &identity.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        password::validate(new_password)?;
        let hash = self.hash_password(new_password).await?;
        self.store.update_password_hash(identity.id, &hash).await?;
        self.sessions
            .revoke_all(identity.id, Some(session.id))
            .await?;
        self.audit.record(
            AuditEvent::PasswordChanged,
            Some(identity.id),
            Some(session.id),
            json!({}),
        );
        Ok(())
    }

    pub async fn begin_mfa_enrollment(&self, ctx: &AuthContext) -> AuthResult<EnrollmentStart> {
        let session = self.require_live_session(ctx).await?;
        let identity = self.load_identity(ctx.identity_id).await?;
        let start = self.mfa.begin_enrollment(&identity).await?;
        self.audit.record(
            AuditEvent::MfaEnrollmentStarted,
            Some(identity.id),
            Some(session.id),
            json!({}),
        );
        Ok(start)
    }

    /// Confirms enrollment and revokes every other session, since they
    /// predate the second factor.
    pub async fn confirm_mfa_enrollment(&self, ctx: &AuthContext, code: &str) -> AuthResult<()> {
        let session = self.require_live_session(ctx).await?;
        let identity = self.load_identity(ctx.identity_id).await?;
        self.mfa.confirm_enrollment(&identity, code).await?;
        self.sessions
            .revoke_all(identity.id, Some(session.id))
            .await?;
        self.audit.record(
            AuditEvent::MfaEnabled,
            Some(identity.id),
            Some(session.id),
            json!({}),
        );
        Ok(())
    }

    /// Turning MFA off takes the password and a live second factor.
    pub async fn disable_mfa(
        &self,
        ctx: &AuthContext,
        password_plain: &str,
        code: &str,
    ) -> AuthResult<()> {
        let session = self.require_live_session(ctx).await?;
        let identity = self.load_identity(ctx.identity_id).await?;
        if !identity.mfa_enabled() {
            return Err(AuthError::MfaNotEnabled);
        }
        if !self
            .verify_password(password_plain, &identity.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }
        self.mfa.verify(&identity, code).await?;
        self.mfa.disable(&identity).await?;
        self.sessions
            .revoke_all(identity.id, Some(session.id))
            .await?;
        self.audit.record(
            AuditEvent::MfaDisabled,
            Some(identity.id),
            Some(session.id),
            json!({}),
        );
        Ok(())
    }

    /// Mints a programmatic credential for the caller. Key management takes
    /// an interactive session; an API key cannot beget more API keys.
    pub async fn create_api_key(
        &self,
        ctx: &AuthContext,
        name: &str,
        expires_in_days: Option<i64>,
    ) -> AuthResult<IssuedApiKey> {
        let session = self.require_live_session(ctx).await?;
        let (key, prefix) = api_key::generate_api_key();
        let now = Utc::now();
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            identity_id: ctx.identity_id,
            name: name.trim().to_string(),
            prefix,
            key_hash: api_key::hash_api_key(&key),
            created_at: now,
            expires_at: expires_in_days.map(|days| now + Duration::days(days)),
            last_used_at: None,
            revoked_at: None,
        };
        self.store.insert_api_key(record.clone()).await?;
        self.audit.record(
            AuditEvent::ApiKeyCreated,
            Some(ctx.identity_id),
            Some(session.id),
            json!({ "key_id": record.id, "name": record.name }),
        );
        Ok(IssuedApiKey { key, record })
    }

    /// Live keys for the caller, newest first.
    pub async fn list_api_keys(&self, ctx: &AuthContext) -> AuthResult<Vec<ApiKeyRecord>> {
        self.require_session(ctx)?;
        Ok(self.store.api_keys_for_identity(ctx.identity_id).await?)
    }

    /// Revokes one of the caller's own keys. Keys belonging to anyone else
    /// are indistinguishable from nonexistent ones.
    pub async fn revoke_api_key(&self, ctx: &AuthContext, key_id: Uuid) -> AuthResult<()> {
        let session = self.require_live_session(ctx).await?;
        let owned = self
            .store
            .api_keys_for_identity(ctx.identity_id)
            .await?
            .iter()
            .any(|record| record.id == key_id);
        if !owned {
            return Err(AuthError::PermissionDenied);
        }
        self.store.revoke_api_key(key_id).await?;
        self.audit.record(
            AuditEvent::ApiKeyRevoked,
            Some(ctx.identity_id),
            Some(session.id),
            json!({ "key_id": key_id }),
        );
        Ok(())
    }

    pub async fn current_identity(&self, ctx: &AuthContext) -> AuthResult<Identity> {
        self.load_identity(ctx.identity_id).await
    }

    pub async fn audit_trail(&self, ctx: &AuthContext, limit: i64) -> AuthResult<Vec<AuditRow>> {
        Ok(self.store.audit_for_identity(ctx.identity_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::NoopRateLimiter;
    use crate::store::memory::MemStore;
    use secrecy::SecretString;

    fn service() -> AuthService {
        service_with_store().0
    }

    fn service_with_store() -> (AuthService, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let config = Arc::new(AuthConfig::new(SecretString::from("svc-test-secret")));
        let (audit, _rx) = AuditSink::detached();
        let service =
            AuthService::new(store.clone(), config, Arc::new(NoopRateLimiter), audit).unwrap();
        (service, store)
    }

    #[tokio::test]
    async fn register_rejects_bad_email_and_weak_password() {
        let service = service();
        let err = service
            .register("not-an-email", "long enough pw", "cli", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail));
        let err = service
            .register("a@example.com", "short", "cli", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword));
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let service = service();
        service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let err = service
            .register("A@Example.COM", "correct horse battery", "cli", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_identical() {
        let service = service();
        service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let missing = service
            .login("ghost@example.com", "whatever password", None, "cli", None)
            .await
            .unwrap_err();
        let wrong = service
            .login("a@example.com", "not the password", None, "cli", None)
            .await
            .unwrap_err();
        assert!(matches!(missing, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(missing.public_message(), wrong.public_message());
    }

    #[tokio::test]
    async fn authenticate_resolves_default_role_permissions() {
        let service = service();
        let issued = service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let ctx = service.authenticate(&issued.access_token).await.unwrap();
        assert_eq!(ctx.identity_id, issued.identity.id);
        assert_eq!(ctx.session_id(), Some(issued.session_id));
        assert!(service.authorize(&ctx, "notes", "write").is_ok());
        assert!(matches!(
            service.authorize(&ctx, "admin", "write").unwrap_err(),
            AuthError::PermissionDenied
        ));
    }

    #[tokio::test]
    async fn revoking_someone_elses_session_is_denied() {
        let service = service();
        let alice = service
            .register("alice@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let bob = service
            .register("bob@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let ctx = service.authenticate(&alice.access_token).await.unwrap();
        let err = service
            .revoke_session(&ctx, bob.session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied));
    }

    #[tokio::test]
    async fn change_password_requires_current_and_drops_other_sessions() {
        let service = service();
        let issued = service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let other = match service
            .login("a@example.com", "correct horse battery", None, "phone", None)
            .await
            .unwrap()
        {
            LoginOutcome::LoggedIn(issued) => issued,
            LoginOutcome::MfaRequired => panic!("mfa unexpectedly required"),
        };
        let ctx = service.authenticate(&issued.access_token).await.unwrap();

        let err = service
            .change_password(&ctx, "wrong current", "new password here")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        service
            .change_password(&ctx, "correct horse battery", "new password here")
            .await
            .unwrap();
        let live = service.list_sessions(&ctx).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, issued.session_id);
        assert_ne!(live[0].id, other.session_id);
    }

    #[tokio::test]
    async fn logout_kills_the_session_for_refresh() {
        let service = service();
        let issued = service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let ctx = service.authenticate(&issued.access_token).await.unwrap();
        service.logout(&ctx).await.unwrap();
        let err = service.refresh(&issued.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionRevoked));
        assert!(matches!(
            service.require_live_session(&ctx).await.unwrap_err(),
            AuthError::SessionRevoked
        ));
    }

    #[tokio::test]
    async fn authenticated_access_bumps_session_last_seen() {
        let (service, store) = service_with_store();
        let issued = service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();

        // Age the session, then come back with the same access token.
        let mut session = store
            .session_by_id(issued.session_id)
            .await
            .unwrap()
            .unwrap();
        let stale = Utc::now() - Duration::hours(6);
        session.last_seen_at = stale;
        store.insert_session(session).await.unwrap();

        service.authenticate(&issued.access_token).await.unwrap();
        let session = store
            .session_by_id(issued.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(session.last_seen_at > stale);
    }

    #[tokio::test]
    async fn api_key_authenticates_until_revoked() {
        let service = service();
        let issued = service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let ctx = service.authenticate(&issued.access_token).await.unwrap();

        let minted = service.create_api_key(&ctx, "ci runner", None).await.unwrap();
        assert!(minted.key.starts_with("lxk_"));
        assert!(minted.key.starts_with(&minted.record.prefix));

        let key_ctx = service.authenticate(&minted.key).await.unwrap();
        assert_eq!(key_ctx.identity_id, issued.identity.id);
        assert_eq!(key_ctx.session_id(), None);
        assert!(service.authorize(&key_ctx, "notes", "write").is_ok());

        let keys = service.list_api_keys(&ctx).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].last_used_at.is_some());

        service.revoke_api_key(&ctx, minted.record.id).await.unwrap();
        let err = service.authenticate(&minted.key).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(service.list_api_keys(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn api_key_callers_cannot_manage_credentials() {
        let service = service();
        let issued = service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let ctx = service.authenticate(&issued.access_token).await.unwrap();
        let minted = service.create_api_key(&ctx, "ci runner", None).await.unwrap();
        let key_ctx = service.authenticate(&minted.key).await.unwrap();

        assert!(matches!(
            service.create_api_key(&key_ctx, "sneaky", None).await.unwrap_err(),
            AuthError::PermissionDenied
        ));
        assert!(matches!(
            service.logout(&key_ctx).await.unwrap_err(),
            AuthError::PermissionDenied
        ));
        assert!(matches!(
            service.require_live_session(&key_ctx).await.unwrap_err(),
            AuthError::PermissionDenied
        ));
    }

    #[tokio::test]
    async fn expired_api_key_is_rejected() {
        let service = service();
        let issued = service
            .register("a@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let ctx = service.authenticate(&issued.access_token).await.unwrap();
        let minted = service.create_api_key(&ctx, "stale", Some(-1)).await.unwrap();
        let err = service.authenticate(&minted.key).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn revoking_someone_elses_api_key_is_denied() {
        let service = service();
        let alice = service
            .register("alice@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let bob = service
            .register("bob@example.com", "correct horse battery", "cli", None)
            .await
            .unwrap();
        let bob_ctx = service.authenticate(&bob.access_token).await.unwrap();
        let minted = service.create_api_key(&bob_ctx, "bobs", None).await.unwrap();

        let alice_ctx = service.authenticate(&alice.access_token).await.unwrap();
        let err = service
            .revoke_api_key(&alice_ctx, minted.record.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied));
    }
}
