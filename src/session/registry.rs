use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AuthResult;
use crate::store::{AuthStore, SessionRecord};

/// Thin facade over session persistence. New sessions start at refresh
/// generation 1; the generation only moves through token rotation.
pub struct SessionRegistry {
    store: Arc<dyn AuthStore>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        identity_id: Uuid,
        device: &str,
        ip: Option<String>,
    ) -> AuthResult<SessionRecord> {
        let now = Utc::now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            identity_id,
            device: device.to_string(),
            ip,
            created_at: now,
            last_seen_at: now,
            refresh_generation: 1,
            revoked_at: None,
        };
        self.store.insert_session(session.clone()).await?;
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> AuthResult<Option<SessionRecord>> {
        Ok(self.store.session_by_id(id).await?)
    }

    /// Live sessions for an identity, most recently seen first.
    pub async fn list(&self, identity_id: Uuid) -> AuthResult<Vec<SessionRecord>> {
        Ok(self.store.sessions_for_identity(identity_id).await?)
    }

    pub async fn touch(&self, id: Uuid) -> AuthResult<()> {
        Ok(self.store.touch_session(id).await?)
    }

    /// Returns false when the session was already revoked or never existed.
    pub async fn revoke(&self, id: Uuid) -> AuthResult<bool> {
        Ok(self.store.revoke_session(id).await?)
    }

    /// Revokes every live session for the identity, optionally sparing one.
    /// Returns how many sessions were revoked.
    pub async fn revoke_all(&self, identity_id: Uuid, except: Option<Uuid>) -> AuthResult<u64> {
        Ok(self.store.revoke_all_sessions(identity_id, except).await?)
    }
}
