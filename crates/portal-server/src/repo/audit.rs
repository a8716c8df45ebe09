//! Append-only audit log.

use crate::db::{lock, now_timestamp, DbPool};
use crate::models::AuditLog;

use super::{clamp_limit, RepoResult};

/// An action to record.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub actor_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub detail: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        actor_id: Option<&str>,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
    ) -> Self {
        Self {
            actor_id: actor_id.map(str::to_string),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            detail: None,
        }
    }

    /// Attach structured detail to the entry.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Filter options for listing audit entries.
#[derive(Debug, Default)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Repository for audit log entries.
pub struct AuditRepo {
    db: DbPool,
}

impl AuditRepo {
    /// Create a new audit repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Append an entry and return its ID.
    pub fn record(&self, entry: AuditEntry) -> RepoResult<i64> {
        let detail = entry.detail.as_ref().map(|d| d.to_string());
        let conn = lock(&self.db)?;
        conn.execute(
            "INSERT INTO audit_logs (actor_id, action, entity_type, entity_id, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                &entry.actor_id,
                &entry.action,
                &entry.entity_type,
                &entry.entity_id,
                detail,
                now_timestamp(),
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List entries, newest first.
    pub fn list(&self, filter: AuditFilter) -> RepoResult<Vec<AuditLog>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(
            "SELECT id, actor_id, action, entity_type, entity_id, detail, created_at
             FROM audit_logs
             WHERE (?1 IS NULL OR actor_id = ?1)
               AND (?2 IS NULL OR action = ?2)
               AND (?3 IS NULL OR entity_type = ?3)
               AND (?4 IS NULL OR entity_id = ?4)
             ORDER BY id DESC
             LIMIT ?5 OFFSET ?6",
        )?;

        let entries = stmt
            .query_map(
                (
                    filter.actor_id.as_deref(),
                    filter.action.as_deref(),
                    filter.entity_type.as_deref(),
                    filter.entity_id.as_deref(),
                    clamp_limit(filter.limit),
                    filter.offset.unwrap_or(0).max(0),
                ),
                Self::map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<AuditLog> {
        let detail: Option<String> = row.get(5)?;
        Ok(AuditLog {
            id: row.get(0)?,
            actor_id: row.get(1)?,
            action: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            // Stored detail is always JSON we wrote; anything else reads as a plain string
            detail: detail.map(|d| {
                serde_json::from_str(&d).unwrap_or(serde_json::Value::String(d))
            }),
            created_at: row.get(6)?,
        })
    }
}
