//! In-memory backend for tests and single-process development.
//!
//! One mutex over the whole state keeps every operation atomic, including the
//! generation compare-and-swap.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::identity::{Identity, MfaState};

use super::{
    ApiKeyRecord, AuditRow, AuthStore, InsertIdentityOutcome, PendingEnrollment, RefreshRecord,
    SessionRecord,
};

#[derive(Default)]
struct MemInner {
    identities: HashMap<Uuid, Identity>,
    email_index: HashMap<String, Uuid>,
    sessions: HashMap<Uuid, SessionRecord>,
    refresh_tokens: HashMap<Vec<u8>, RefreshRecord>,
    api_keys: HashMap<Uuid, ApiKeyRecord>,
    pending_enrollments: HashMap<Uuid, PendingEnrollment>,
    audit: Vec<AuditRow>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemStore {
    async fn insert_identity(&self, identity: Identity) -> Result<InsertIdentityOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.email_index.contains_key(&identity.email) {
            return Ok(InsertIdentityOutcome::EmailTaken);
        }
        inner.email_index.insert(identity.email.clone(), identity.id);
        inner.identities.insert(identity.id, identity);
        Ok(InsertIdentityOutcome::Created)
    }

    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .email_index
            .get(email)
            .and_then(|id| inner.identities.get(id))
            .cloned())
    }

    async fn identity_by_id(&self, id: Uuid) -> Result<Option<Identity>> {
        let inner = self.inner.lock().await;
        Ok(inner.identities.get(&id).cloned())
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(identity) = inner.identities.get_mut(&id) {
            identity.password_hash = hash.to_string();
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn enable_mfa(&self, id: Uuid, mfa: MfaState) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(identity) = inner.identities.get_mut(&id) {
            identity.mfa = Some(mfa);
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn disable_mfa(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(identity) = inner.identities.get_mut(&id) {
            identity.mfa = None;
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, index: usize) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let consumed = inner
            .identities
            .get_mut(&id)
            .and_then(|identity| identity.mfa.as_mut())
            .and_then(|mfa| mfa.backup_codes.get_mut(index))
            .map_or(false, |code| {
                if code.used {
                    false
                } else {
                    code.used = true;
                    true
                }
            });
        Ok(consumed)
    }

    async fn insert_session(&self, session: SessionRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    async fn session_by_id(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.sessions.get(&id).cloned())
    }

    async fn sessions_for_identity(&self, identity_id: Uuid) -> Result<Vec<SessionRecord>> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<_> = inner
            .sessions
            .values()
            .filter(|session| session.identity_id == identity_id && !session.revoked())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(sessions)
    }

    async fn touch_session(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.sessions.get_mut(&id) {
            session.last_seen_at = Utc::now();
        }
        Ok(())
    }

    async fn revoke_session(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(&id) {
            Some(session) if !session.revoked() => {
                session.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_sessions(&self, identity_id: Uuid, except: Option<Uuid>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut revoked = 0;
        for session in inner.sessions.values_mut() {
            if session.identity_id == identity_id
                && !session.revoked()
                && Some(session.id) != except
            {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn advance_generation(&self, session_id: Uuid, expected: i64) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(&session_id) {
            Some(session) if !session.revoked() && session.refresh_generation == expected => {
                session.refresh_generation = expected + 1;
                session.last_seen_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_refresh_token(&self, record: RefreshRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.refresh_tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn refresh_token_by_hash(&self, hash: &[u8]) -> Result<Option<RefreshRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.refresh_tokens.get(hash).cloned())
    }

    async fn prune_expired_refresh_tokens(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|_, record| record.expires_at > now);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }

    async fn insert_api_key(&self, record: ApiKeyRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.api_keys.insert(record.id, record);
        Ok(())
    }

    async fn api_key_by_hash(&self, hash: &[u8]) -> Result<Option<ApiKeyRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .api_keys
            .values()
            .find(|record| record.key_hash == hash)
            .cloned())
    }

    async fn api_keys_for_identity(&self, identity_id: Uuid) -> Result<Vec<ApiKeyRecord>> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<_> = inner
            .api_keys
            .values()
            .filter(|record| record.identity_id == identity_id && !record.revoked())
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn touch_api_key(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.api_keys.get_mut(&id) {
            record.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn revoke_api_key(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.api_keys.get_mut(&id) {
            Some(record) if !record.revoked() => {
                record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn put_pending_enrollment(&self, pending: PendingEnrollment) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .pending_enrollments
            .insert(pending.identity_id, pending);
        Ok(())
    }

    async fn pending_enrollment(&self, identity_id: Uuid) -> Result<Option<PendingEnrollment>> {
        let inner = self.inner.lock().await;
        Ok(inner.pending_enrollments.get(&identity_id).cloned())
    }

    async fn delete_pending_enrollment(&self, identity_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.pending_enrollments.remove(&identity_id);
        Ok(())
    }

    async fn append_audit(&self, row: AuditRow) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.audit.push(row);
        Ok(())
    }

    async fn audit_for_identity(&self, identity_id: Uuid, limit: i64) -> Result<Vec<AuditRow>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<_> = inner
            .audit
            .iter()
            .filter(|row| row.identity_id == Some(identity_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::NewIdentity;
    use chrono::Duration;

    fn identity(email: &str) -> Identity {
        NewIdentity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            roles: vec!["user".to_string()],
        }
        .into_identity()
    }

    fn session(identity_id: Uuid) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: Uuid::new_v4(),
            identity_id,
            device: "test".to_string(),
            ip: None,
            created_at: now,
            last_seen_at: now,
            refresh_generation: 1,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let store = MemStore::new();
        assert!(matches!(
            store.insert_identity(identity("a@example.com")).await.unwrap(),
            InsertIdentityOutcome::Created
        ));
        assert!(matches!(
            store.insert_identity(identity("a@example.com")).await.unwrap(),
            InsertIdentityOutcome::EmailTaken
        ));
    }

    #[tokio::test]
    async fn advance_generation_is_a_cas() {
        let store = MemStore::new();
        let record = session(Uuid::new_v4());
        let id = record.id;
        store.insert_session(record).await.unwrap();

        assert!(store.advance_generation(id, 1).await.unwrap());
        // Same expected generation again loses the swap.
        assert!(!store.advance_generation(id, 1).await.unwrap());
        assert!(store.advance_generation(id, 2).await.unwrap());
    }

    #[tokio::test]
    async fn advance_generation_refuses_revoked_session() {
        let store = MemStore::new();
        let record = session(Uuid::new_v4());
        let id = record.id;
        store.insert_session(record).await.unwrap();
        assert!(store.revoke_session(id).await.unwrap());
        assert!(!store.advance_generation(id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_all_spares_the_excepted_session() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let keep = session(owner);
        let keep_id = keep.id;
        store.insert_session(keep).await.unwrap();
        store.insert_session(session(owner)).await.unwrap();
        store.insert_session(session(owner)).await.unwrap();

        let revoked = store.revoke_all_sessions(owner, Some(keep_id)).await.unwrap();
        assert_eq!(revoked, 2);
        let live = store.sessions_for_identity(owner).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, keep_id);
    }

    #[tokio::test]
    async fn sessions_list_orders_by_last_seen_descending() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let mut old = session(owner);
        old.last_seen_at = Utc::now() - Duration::hours(2);
        let old_id = old.id;
        let fresh = session(owner);
        let fresh_id = fresh.id;
        store.insert_session(old).await.unwrap();
        store.insert_session(fresh).await.unwrap();

        let sessions = store.sessions_for_identity(owner).await.unwrap();
        assert_eq!(sessions[0].id, fresh_id);
        assert_eq!(sessions[1].id, old_id);
    }

    #[tokio::test]
    async fn backup_code_consumes_exactly_once() {
        let store = MemStore::new();
        let mut record = identity("mfa@example.com");
        record.mfa = Some(MfaState {
            secret: "SECRET".to_string(),
            backup_codes: vec![crate::identity::BackupCode {
                hash: "$argon2id$stub".to_string(),
                used: false,
            }],
        });
        let id = record.id;
        store.insert_identity(record).await.unwrap();

        assert!(store.consume_backup_code(id, 0).await.unwrap());
        assert!(!store.consume_backup_code(id, 0).await.unwrap());
        assert!(!store.consume_backup_code(id, 7).await.unwrap());
    }

    #[tokio::test]
    async fn prune_drops_only_expired_refresh_tokens() {
        let store = MemStore::new();
        let session_id = Uuid::new_v4();
        store
            .insert_refresh_token(RefreshRecord {
                token_hash: vec![1],
                session_id,
                generation: 1,
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();
        store
            .insert_refresh_token(RefreshRecord {
                token_hash: vec![2],
                session_id,
                generation: 2,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        assert_eq!(store.prune_expired_refresh_tokens().await.unwrap(), 1);
        assert!(store.refresh_token_by_hash(&[1]).await.unwrap().is_none());
        assert!(store.refresh_token_by_hash(&[2]).await.unwrap().is_some());
    }

    fn api_key(identity_id: Uuid) -> ApiKeyRecord {
        ApiKeyRecord {
            id: Uuid::new_v4(),
            identity_id,
            name: "ci".to_string(),
            prefix: "lxk_12345678".to_string(),
            key_hash: Uuid::new_v4().as_bytes().to_vec(),
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn api_key_revocation_hides_it_from_listing() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let keep = api_key(owner);
        let gone = api_key(owner);
        let gone_id = gone.id;
        store.insert_api_key(keep.clone()).await.unwrap();
        store.insert_api_key(gone.clone()).await.unwrap();

        assert!(store.revoke_api_key(gone_id).await.unwrap());
        assert!(!store.revoke_api_key(gone_id).await.unwrap());

        let keys = store.api_keys_for_identity(owner).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].id, keep.id);

        // A revoked key is still findable by hash so callers can tell
        // "revoked" apart from "never existed".
        let found = store.api_key_by_hash(&gone.key_hash).await.unwrap().unwrap();
        assert!(found.revoked());
    }

    #[tokio::test]
    async fn touch_api_key_sets_last_used() {
        let store = MemStore::new();
        let record = api_key(Uuid::new_v4());
        let id = record.id;
        let hash = record.key_hash.clone();
        store.insert_api_key(record).await.unwrap();
        store.touch_api_key(id).await.unwrap();
        let found = store.api_key_by_hash(&hash).await.unwrap().unwrap();
        assert!(found.last_used_at.is_some());
    }
}
