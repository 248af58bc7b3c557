//! Postgres backend.
//!
//! Raw queries wrapped in `db.query` spans. Structured identity fields
//! (capability overrides, backup codes) are serialized as JSON text; the
//! schema lives in `db/sql/01_lexauth.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use crate::identity::{BackupCode, Identity, IdentityStatus, MfaState};
use crate::permission::Capability;

use super::{
    ApiKeyRecord, AuditRow, AuthStore, InsertIdentityOutcome, PendingEnrollment, RefreshRecord,
    SessionRecord,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn identity_from_row(row: &PgRow) -> Result<Identity> {
    let status: String = row.get("status");
    let status = IdentityStatus::parse(&status)
        .with_context(|| format!("unknown identity status: {status}"))?;
    let overrides: String = row.get("overrides");
    let overrides: Vec<Capability> =
        serde_json::from_str(&overrides).context("failed to decode capability overrides")?;
    let mfa_secret: Option<String> = row.get("mfa_secret");
    let mfa = match mfa_secret {
        Some(secret) => {
            let codes: Option<String> = row.get("mfa_backup_codes");
            let backup_codes: Vec<BackupCode> = codes
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("failed to decode backup codes")?
                .unwrap_or_default();
            Some(MfaState {
                secret,
                backup_codes,
            })
        }
        None => None,
    };
    Ok(Identity {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        status,
        roles: row.get("roles"),
        overrides,
        mfa,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn session_from_row(row: &PgRow) -> SessionRecord {
    SessionRecord {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        device: row.get("device"),
        ip: row.get("ip"),
        created_at: row.get("created_at"),
        last_seen_at: row.get("last_seen_at"),
        refresh_generation: row.get("refresh_generation"),
        revoked_at: row.get("revoked_at"),
    }
}

const IDENTITY_COLUMNS: &str = "id, email, password_hash, status, roles, overrides, \
     mfa_secret, mfa_backup_codes, created_at, updated_at";

const SESSION_COLUMNS: &str =
    "id, identity_id, device, ip, created_at, last_seen_at, refresh_generation, revoked_at";

const API_KEY_COLUMNS: &str = "id, identity_id, name, prefix, key_hash, created_at, expires_at, \
     last_used_at, revoked_at";

fn api_key_from_row(row: &PgRow) -> ApiKeyRecord {
    ApiKeyRecord {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        name: row.get("name"),
        prefix: row.get("prefix"),
        key_hash: row.get("key_hash"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        last_used_at: row.get("last_used_at"),
        revoked_at: row.get("revoked_at"),
    }
}

#[async_trait]
impl AuthStore for PgStore {
    async fn insert_identity(&self, identity: Identity) -> Result<InsertIdentityOutcome> {
        let query = r"
            INSERT INTO identities
                (id, email, password_hash, status, roles, overrides, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let overrides =
            serde_json::to_string(&identity.overrides).context("failed to encode overrides")?;
        let result = sqlx::query(query)
            .bind(identity.id)
            .bind(&identity.email)
            .bind(&identity.password_hash)
            .bind(identity.status.as_str())
            .bind(&identity.roles)
            .bind(overrides)
            .bind(identity.created_at)
            .bind(identity.updated_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;
        match result {
            Ok(_) => Ok(InsertIdentityOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(InsertIdentityOutcome::EmailTaken),
            Err(err) => Err(err).context("failed to insert identity"),
        }
    }

    async fn identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup identity by email")?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn identity_by_id(&self, id: Uuid) -> Result<Option<Identity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup identity by id")?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<()> {
        let query = r"
            UPDATE identities
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update password hash")?;
        Ok(())
    }

    async fn enable_mfa(&self, id: Uuid, mfa: MfaState) -> Result<()> {
        let query = r"
            UPDATE identities
            SET mfa_secret = $2, mfa_backup_codes = $3, updated_at = NOW()
            WHERE id = $1
        ";
        let codes =
            serde_json::to_string(&mfa.backup_codes).context("failed to encode backup codes")?;
        sqlx::query(query)
            .bind(id)
            .bind(&mfa.secret)
            .bind(codes)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to enable mfa")?;
        Ok(())
    }

    async fn disable_mfa(&self, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE identities
            SET mfa_secret = NULL, mfa_backup_codes = '[]', updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to disable mfa")?;
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, index: usize) -> Result<bool> {
        // Read-modify-write inside one transaction with a row lock so a code
        // raced from two logins is consumed exactly once.
        let mut tx = self.pool.begin().await.context("begin backup code tx")?;
        let query = "SELECT mfa_backup_codes FROM identities WHERE id = $1 FOR UPDATE";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load backup codes")?;
        let Some(row) = row else {
            return Ok(false);
        };
        let codes: Option<String> = row.get("mfa_backup_codes");
        let Some(codes) = codes else {
            return Ok(false);
        };
        let mut codes: Vec<BackupCode> =
            serde_json::from_str(&codes).context("failed to decode backup codes")?;
        let Some(code) = codes.get_mut(index) else {
            return Ok(false);
        };
        if code.used {
            return Ok(false);
        }
        code.used = true;
        let encoded = serde_json::to_string(&codes).context("failed to encode backup codes")?;
        let query = "UPDATE identities SET mfa_backup_codes = $2, updated_at = NOW() WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(encoded)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to mark backup code used")?;
        tx.commit().await.context("commit backup code tx")?;
        Ok(true)
    }

    async fn insert_session(&self, session: SessionRecord) -> Result<()> {
        let query = r"
            INSERT INTO sessions
                (id, identity_id, device, ip, created_at, last_seen_at, refresh_generation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(session.id)
            .bind(session.identity_id)
            .bind(&session.device)
            .bind(session.ip.as_deref())
            .bind(session.created_at)
            .bind(session.last_seen_at)
            .bind(session.refresh_generation)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn session_by_id(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn sessions_for_identity(&self, identity_id: Uuid) -> Result<Vec<SessionRecord>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE identity_id = $1 AND revoked_at IS NULL \
             ORDER BY last_seen_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(identity_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to list sessions")?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn touch_session(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE sessions SET last_seen_at = NOW() WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to touch session")?;
        Ok(())
    }

    async fn revoke_session(&self, id: Uuid) -> Result<bool> {
        let query = "UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_sessions(&self, identity_id: Uuid, except: Option<Uuid>) -> Result<u64> {
        let query = r"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE identity_id = $1
              AND revoked_at IS NULL
              AND ($2::uuid IS NULL OR id <> $2)
        ";
        let result = sqlx::query(query)
            .bind(identity_id)
            .bind(except)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke sessions")?;
        Ok(result.rows_affected())
    }

    async fn advance_generation(&self, session_id: Uuid, expected: i64) -> Result<bool> {
        // Optimistic concurrency: the WHERE clause is the compare, the UPDATE
        // the swap. Concurrent callers with the same expected generation race
        // on the row lock and exactly one sees rows_affected = 1.
        let query = r"
            UPDATE sessions
            SET refresh_generation = refresh_generation + 1,
                last_seen_at = NOW()
            WHERE id = $1
              AND refresh_generation = $2
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(expected)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to advance refresh generation")?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_refresh_token(&self, record: RefreshRecord) -> Result<()> {
        let query = r"
            INSERT INTO refresh_tokens (token_hash, session_id, generation, expires_at)
            VALUES ($1, $2, $3, $4)
        ";
        sqlx::query(query)
            .bind(&record.token_hash)
            .bind(record.session_id)
            .bind(record.generation)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert refresh token")?;
        Ok(())
    }

    async fn refresh_token_by_hash(&self, hash: &[u8]) -> Result<Option<RefreshRecord>> {
        let query = r"
            SELECT token_hash, session_id, generation, expires_at
            FROM refresh_tokens
            WHERE token_hash = $1
        ";
        let row = sqlx::query(query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?;
        Ok(row.map(|row| RefreshRecord {
            token_hash: row.get("token_hash"),
            session_id: row.get("session_id"),
            generation: row.get("generation"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn prune_expired_refresh_tokens(&self) -> Result<u64> {
        let query = "DELETE FROM refresh_tokens WHERE expires_at < NOW()";
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to prune refresh tokens")?;
        Ok(result.rows_affected())
    }

    async fn insert_api_key(&self, record: ApiKeyRecord) -> Result<()> {
        let query = r"
            INSERT INTO api_keys
                (id, identity_id, name, prefix, key_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(record.id)
            .bind(record.identity_id)
            .bind(&record.name)
            .bind(&record.prefix)
            .bind(&record.key_hash)
            .bind(record.created_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert api key")?;
        Ok(())
    }

    async fn api_key_by_hash(&self, hash: &[u8]) -> Result<Option<ApiKeyRecord>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1");
        let row = sqlx::query(&query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup api key")?;
        Ok(row.as_ref().map(api_key_from_row))
    }

    async fn api_keys_for_identity(&self, identity_id: Uuid) -> Result<Vec<ApiKeyRecord>> {
        let query = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys \
             WHERE identity_id = $1 AND revoked_at IS NULL \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(identity_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to list api keys")?;
        Ok(rows.iter().map(api_key_from_row).collect())
    }

    async fn touch_api_key(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE api_keys SET last_used_at = NOW() WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to touch api key")?;
        Ok(())
    }

    async fn revoke_api_key(&self, id: Uuid) -> Result<bool> {
        let query = "UPDATE api_keys SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke api key")?;
        Ok(result.rows_affected() == 1)
    }

    async fn put_pending_enrollment(&self, pending: PendingEnrollment) -> Result<()> {
        // Re-starting enrollment replaces any previous pending secret.
        let query = r"
            INSERT INTO mfa_enrollments (identity_id, secret, backup_code_hashes, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identity_id) DO UPDATE
            SET secret = EXCLUDED.secret,
                backup_code_hashes = EXCLUDED.backup_code_hashes,
                expires_at = EXCLUDED.expires_at
        ";
        sqlx::query(query)
            .bind(pending.identity_id)
            .bind(&pending.secret)
            .bind(&pending.backup_code_hashes)
            .bind(pending.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to store pending enrollment")?;
        Ok(())
    }

    async fn pending_enrollment(&self, identity_id: Uuid) -> Result<Option<PendingEnrollment>> {
        let query = r"
            SELECT identity_id, secret, backup_code_hashes, expires_at
            FROM mfa_enrollments
            WHERE identity_id = $1
        ";
        let row = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup pending enrollment")?;
        Ok(row.map(|row| PendingEnrollment {
            identity_id: row.get("identity_id"),
            secret: row.get("secret"),
            backup_code_hashes: row.get("backup_code_hashes"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn delete_pending_enrollment(&self, identity_id: Uuid) -> Result<()> {
        let query = "DELETE FROM mfa_enrollments WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete pending enrollment")?;
        Ok(())
    }

    async fn append_audit(&self, row: AuditRow) -> Result<()> {
        let query = r"
            INSERT INTO audit_log (id, event, identity_id, session_id, metadata, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let metadata =
            serde_json::to_string(&row.metadata).context("failed to encode audit metadata")?;
        sqlx::query(query)
            .bind(row.id)
            .bind(&row.event)
            .bind(row.identity_id)
            .bind(row.session_id)
            .bind(metadata)
            .bind(row.recorded_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to append audit row")?;
        Ok(())
    }

    async fn audit_for_identity(&self, identity_id: Uuid, limit: i64) -> Result<Vec<AuditRow>> {
        let query = r"
            SELECT id, event, identity_id, session_id, metadata, recorded_at
            FROM audit_log
            WHERE identity_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
        ";
        let rows = sqlx::query(query)
            .bind(identity_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list audit rows")?;
        rows.into_iter()
            .map(|row| {
                let metadata: String = row.get("metadata");
                let metadata = serde_json::from_str(&metadata)
                    .context("failed to decode audit metadata")?;
                Ok(AuditRow {
                    id: row.get("id"),
                    event: row.get("event"),
                    identity_id: row.get("identity_id"),
                    session_id: row.get("session_id"),
                    metadata,
                    recorded_at: row.get("recorded_at"),
                })
            })
            .collect()
    }
}
