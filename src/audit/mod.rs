//! Append-only audit trail.
//!
//! Recording never blocks or fails the hot path: events go onto an
//! unbounded channel and a background worker persists them, retrying
//! transient store errors with exponential backoff before dropping.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::store::{AuditRow, AuthStore};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);
const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Everything the trail records. Wire names are stable snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    Registered,
    Login,
    FailedLogin,
    Logout,
    TokenRefreshed,
    TokenReuse,
    SessionRevoked,
    PasswordChanged,
    MfaEnrollmentStarted,
    MfaEnabled,
    MfaDisabled,
    MfaFailed,
    BackupCodeUsed,
    ApiKeyCreated,
    ApiKeyRevoked,
}

impl AuditEvent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Login => "login",
            Self::FailedLogin => "failed_login",
            Self::Logout => "logout",
            Self::TokenRefreshed => "token_refreshed",
            Self::TokenReuse => "token_reuse",
            Self::SessionRevoked => "session_revoked",
            Self::PasswordChanged => "password_changed",
            Self::MfaEnrollmentStarted => "mfa_enrollment_started",
            Self::MfaEnabled => "mfa_enabled",
            Self::MfaDisabled => "mfa_disabled",
            Self::MfaFailed => "mfa_failed",
            Self::BackupCodeUsed => "backup_code_used",
            Self::ApiKeyCreated => "api_key_created",
            Self::ApiKeyRevoked => "api_key_revoked",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuditWorkerConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for AuditWorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl AuditWorkerConfig {
    /// Clamps zero values back to defaults so a bad config cannot produce
    /// a worker that never writes or spins without waiting.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.max_attempts == 0 {
            self.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }
        if self.backoff_base.is_zero() {
            self.backoff_base = DEFAULT_BACKOFF_BASE;
        }
        if self.backoff_cap < self.backoff_base {
            self.backoff_cap = self.backoff_base;
        }
        self
    }
}

/// Handle for emitting audit events. Cheap to clone.
#[derive(Clone)]
pub struct AuditSink {
    tx: UnboundedSender<AuditRow>,
}

impl AuditSink {
    /// Starts the persistence worker and returns the sink plus its handle.
    pub fn spawn(
        store: Arc<dyn AuthStore>,
        config: AuditWorkerConfig,
    ) -> (Self, JoinHandle<()>) {
        let config = config.normalize();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(store, config, rx));
        (Self { tx }, handle)
    }

    /// Sink without a worker; the receiver side is handed back so tests can
    /// assert on emitted rows.
    #[must_use]
    pub fn detached() -> (Self, UnboundedReceiver<AuditRow>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emits an event. Never fails; a closed channel is logged and the
    /// event dropped.
    pub fn record(
        &self,
        event: AuditEvent,
        identity_id: Option<Uuid>,
        session_id: Option<Uuid>,
        metadata: Value,
    ) {
        let row = AuditRow {
            id: Uuid::new_v4(),
            event: event.as_str().to_string(),
            identity_id,
            session_id,
            metadata,
            recorded_at: Utc::now(),
        };
        if self.tx.send(row).is_err() {
            warn!(event = event.as_str(), "audit worker gone, event dropped");
        }
    }
}

async fn run_worker(
    store: Arc<dyn AuthStore>,
    config: AuditWorkerConfig,
    mut rx: UnboundedReceiver<AuditRow>,
) {
    while let Some(row) = rx.recv().await {
        let mut backoff = config.backoff_base;
        let mut attempt = 1;
        loop {
            match store.append_audit(row.clone()).await {
                Ok(()) => break,
                Err(err) if attempt < config.max_attempts => {
                    warn!(%err, attempt, event = %row.event, "audit append failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(config.backoff_cap);
                    attempt += 1;
                }
                Err(err) => {
                    error!(%err, event = %row.event, "audit append failed, event dropped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemStore;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(AuditEvent::TokenReuse.as_str(), "token_reuse");
        assert_eq!(AuditEvent::FailedLogin.as_str(), "failed_login");
        assert_eq!(AuditEvent::MfaEnrollmentStarted.as_str(), "mfa_enrollment_started");
        assert_eq!(AuditEvent::ApiKeyCreated.as_str(), "api_key_created");
    }

    #[test]
    fn normalize_repairs_degenerate_configs() {
        let config = AuditWorkerConfig {
            max_attempts: 0,
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
        }
        .normalize();
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.backoff_base, DEFAULT_BACKOFF_BASE);
        assert!(config.backoff_cap >= config.backoff_base);
    }

    #[tokio::test]
    async fn worker_persists_recorded_events() {
        let store = Arc::new(MemStore::new());
        let (sink, handle) = AuditSink::spawn(store.clone(), AuditWorkerConfig::default());
        let identity = Uuid::new_v4();
        sink.record(AuditEvent::Login, Some(identity), None, json!({ "ip": "::1" }));
        sink.record(AuditEvent::Logout, Some(identity), None, json!({}));
        drop(sink);
        handle.await.unwrap();
        let rows = store.audit_for_identity(identity, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.event == "login"));
        assert!(rows.iter().any(|r| r.event == "logout"));
    }

    #[tokio::test]
    async fn detached_sink_exposes_rows() {
        let (sink, mut rx) = AuditSink::detached();
        sink.record(AuditEvent::TokenReuse, None, Some(Uuid::new_v4()), json!({}));
        let row = rx.recv().await.unwrap();
        assert_eq!(row.event, "token_reuse");
    }
}
