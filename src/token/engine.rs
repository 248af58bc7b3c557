use std::sync::Arc;

use chrono::{Duration, Utc};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::warn;

use crate::audit::{AuditEvent, AuditSink};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::store::{AuthStore, RefreshRecord, SessionRecord};

use super::claims::{AccessClaims, decode_access, encode_access};
use super::{generate_refresh_token, hash_refresh_token};

/// What a successful login or rotation hands back to the client.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and rotates credential pairs against a session.
///
/// Rotation is single-use: each refresh token is bound to the session
/// generation it was minted at, and redeeming it advances the generation
/// with a compare-and-swap. A stale token means the secret leaked or was
/// replayed, and the whole session is revoked.
pub struct TokenEngine {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
    audit: AuditSink,
}

impl TokenEngine {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, config: Arc<AuthConfig>, audit: AuditSink) -> Self {
        Self {
            store,
            config,
            audit,
        }
    }

    fn secret(&self) -> &[u8] {
        self.config.token_secret().expose_secret().as_bytes()
    }

    /// Mints a credential pair for a session at its current generation.
    pub async fn issue(&self, session: &SessionRecord) -> AuthResult<CredentialPair> {
        let claims = AccessClaims::new(
            session.identity_id,
            session.id,
            session.refresh_generation,
            self.config.access_ttl_seconds(),
            self.config.token_issuer(),
        );
        let access_token = encode_access(&claims, self.secret())?;
        let refresh_token = generate_refresh_token();
        self.store
            .insert_refresh_token(RefreshRecord {
                token_hash: hash_refresh_token(&refresh_token),
                session_id: session.id,
                generation: session.refresh_generation,
                expires_at: Utc::now() + Duration::seconds(self.config.refresh_ttl_seconds()),
            })
            .await?;
        Ok(CredentialPair {
            access_token,
            refresh_token,
        })
    }

    /// Stateless access token check. Callers needing revocation awareness
    /// must re-check the session named by `sid` themselves.
    pub fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        decode_access(token, self.secret(), self.config.token_issuer())
    }

    /// Redeems a refresh token, rotating the pair.
    ///
    /// A token whose generation no longer matches the session is treated as
    /// replayed: the session is revoked and the caller gets `TokenReused`.
    /// Under concurrent redemption of the same token exactly one caller wins
    /// the generation swap; the others take the replay path.
    pub async fn refresh(&self, presented: &str) -> AuthResult<(CredentialPair, SessionRecord)> {
        let hash = hash_refresh_token(presented);
        let record = self
            .store
            .refresh_token_by_hash(&hash)
            .await?
            .ok_or(AuthError::TokenMalformed)?;
        if record.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }
        let session = self
            .store
            .session_by_id(record.session_id)
            .await?
            .ok_or(AuthError::TokenMalformed)?;
        if session.revoked() {
            return Err(AuthError::SessionRevoked);
        }
        if session.refresh_generation != record.generation
            || !self
                .store
                .advance_generation(session.id, record.generation)
                .await?
        {
            return self.handle_reuse(&session).await;
        }
        let rotated = SessionRecord {
            refresh_generation: record.generation + 1,
            last_seen_at: Utc::now(),
            ..session
        };
        // The generation has moved; if the replacement pair cannot be
        // persisted the session would be stranded with no redeemable token.
        // Collapse that half-state to a revoked session.
        let pair = match self.issue(&rotated).await {
            Ok(pair) => pair,
            Err(err) => {
                if let Err(revoke_err) = self.store.revoke_session(rotated.id).await {
                    warn!("failed to revoke session after rotation error: {revoke_err}");
                }
                return Err(err);
            }
        };
        self.audit.record(
            AuditEvent::TokenRefreshed,
            Some(rotated.identity_id),
            Some(rotated.id),
            json!({ "generation": rotated.refresh_generation }),
        );
        Ok((pair, rotated))
    }

    async fn handle_reuse(&self, session: &SessionRecord) -> AuthResult<(CredentialPair, SessionRecord)> {
        self.store.revoke_session(session.id).await?;
        self.audit.record(
            AuditEvent::TokenReuse,
            Some(session.identity_id),
            Some(session.id),
            json!({ "generation": session.refresh_generation }),
        );
        Err(AuthError::TokenReused)
    }
}
