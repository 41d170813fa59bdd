//! # Audit Repository
//!
//! Writes and reads the `audit_logs` trail.
//!
//! ## Best Effort
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  unit of work (BEGIN)                                                   │
//! │    ├── ledger writes                                                    │
//! │    ├── SAVEPOINT ── INSERT audit_logs ── RELEASE                        │
//! │    │        └── on failure: ROLLBACK TO SAVEPOINT, warn!, carry on      │
//! │    └── COMMIT                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! A failed audit write never fails or rolls back the operation it
//! describes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use clinic_core::validation::clamp_history_limit;
use clinic_core::{AuditAction, AuditEntry};

const AUDIT_COLUMNS: &str =
    "id, user_id, action, entity_type, entity_id, old_value, new_value, created_at";

// =============================================================================
// Writing
// =============================================================================

/// One audit row waiting to be written.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    user_id: String,
    action: AuditAction,
    entity_type: &'static str,
    entity_id: String,
    old_value: Option<String>,
    new_value: Option<String>,
}

impl AuditRecord {
    pub fn new(
        user_id: impl Into<String>,
        action: AuditAction,
        entity_type: &'static str,
        entity_id: impl Into<String>,
    ) -> Self {
        AuditRecord {
            user_id: user_id.into(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            old_value: None,
            new_value: None,
        }
    }

    /// State before the change, as JSON.
    pub fn old_value<T: Serialize>(mut self, value: &T) -> Self {
        self.old_value = to_json(value);
        self
    }

    /// State after the change, as JSON.
    pub fn new_value<T: Serialize>(mut self, value: &T) -> Self {
        self.new_value = to_json(value);
        self
    }

    fn into_entry(self, now: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id,
            action: self.action,
            entity_type: self.entity_type.to_string(),
            entity_id: self.entity_id,
            old_value: self.old_value,
            new_value: self.new_value,
            created_at: now,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(error = %e, "Audit payload not serializable, storing NULL");
            None
        }
    }
}

/// Writes an audit row inside a savepoint of the caller's transaction.
///
/// Never fails: errors are logged and the savepoint is rolled back, which
/// leaves the enclosing unit of work untouched.
pub async fn record(conn: &mut SqliteConnection, record: AuditRecord) {
    let entry = record.into_entry(Utc::now());

    let result: DbResult<()> = async {
        let mut savepoint = conn.begin().await?;
        match insert(&mut savepoint, &entry).await {
            Ok(()) => savepoint.commit().await?,
            Err(e) => {
                savepoint.rollback().await?;
                return Err(e);
            }
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => debug!(
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "Audit entry recorded"
        ),
        Err(e) => warn!(
            error = %e,
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "Audit write failed, continuing without it"
        ),
    }
}

async fn insert(conn: &mut SqliteConnection, entry: &AuditEntry) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (
            id, user_id, action, entity_type, entity_id, old_value, new_value, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.user_id)
    .bind(entry.action)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

// =============================================================================
// Reading
// =============================================================================

/// Read access to the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// History of one entity, newest first.
    pub async fn entity_log(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: Option<u32>,
    ) -> DbResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntry>(&format!(
            r#"
            SELECT {} FROM audit_logs
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
            AUDIT_COLUMNS
        ))
        .bind(entity_type)
        .bind(entity_id)
        .bind(i64::from(clamp_history_limit(limit)))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Everything one user did, newest first.
    pub async fn by_user(&self, user_id: &str, limit: Option<u32>) -> DbResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntry>(&format!(
            r#"
            SELECT {} FROM audit_logs
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
            AUDIT_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(clamp_history_limit(limit)))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Latest entries across the whole trail.
    pub async fn recent(&self, limit: Option<u32>) -> DbResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntry>(&format!(
            "SELECT {} FROM audit_logs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            AUDIT_COLUMNS
        ))
        .bind(i64::from(clamp_history_limit(limit)))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
