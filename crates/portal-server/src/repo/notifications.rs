//! Notification inbox repository.

use crate::db::{lock, now_timestamp, DbPool};
use crate::models::{NewNotification, Notification};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{clamp_limit, RepoError, RepoResult};

const COLUMNS: &str = "id, member_id, kind, title, body, link, read_at, created_at";

/// Repository for notification database operations.
pub struct NotificationRepo {
    db: DbPool,
}

impl NotificationRepo {
    /// Create a new notification repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Add a notification to a member's inbox.
    pub fn create(&self, new: NewNotification) -> RepoResult<Notification> {
        let id = Uuid::new_v4().to_string();
        {
            let conn = lock(&self.db)?;
            conn.execute(
                "INSERT INTO notifications (id, member_id, kind, title, body, link, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    &id,
                    &new.member_id,
                    &new.kind,
                    &new.title,
                    &new.body,
                    &new.link,
                    now_timestamp(),
                ),
            )?;
        }

        self.get(&id)?.ok_or(RepoError::NotFound("notification"))
    }

    pub fn get(&self, id: &str) -> RepoResult<Option<Notification>> {
        let conn = lock(&self.db)?;
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM notifications WHERE id = ?1"))?;
        Ok(stmt.query_row([id], Self::map_row).optional()?)
    }

    /// List a member's notifications, newest first.
    pub fn list(
        &self,
        member_id: &str,
        unread_only: bool,
        limit: Option<i64>,
    ) -> RepoResult<Vec<Notification>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM notifications
             WHERE member_id = ?1 AND (?2 = 0 OR read_at IS NULL)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ))?;

        let notifications = stmt
            .query_map((member_id, unread_only, clamp_limit(limit)), Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub fn unread_count(&self, member_id: &str) -> RepoResult<i64> {
        let conn = lock(&self.db)?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE member_id = ?1 AND read_at IS NULL",
            [member_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark one notification read. Only the owner may do so.
    ///
    /// Reading an already-read notification keeps its original `read_at`.
    pub fn mark_read(&self, id: &str, member_id: &str) -> RepoResult<Notification> {
        {
            let conn = lock(&self.db)?;
            conn.execute(
                "UPDATE notifications SET read_at = COALESCE(read_at, ?1)
                 WHERE id = ?2 AND member_id = ?3",
                (now_timestamp(), id, member_id),
            )?;
        }

        match self.get(id)? {
            Some(n) if n.member_id == member_id => Ok(n),
            _ => Err(RepoError::NotFound("notification")),
        }
    }

    /// Mark every unread notification for a member read; returns how many changed.
    pub fn mark_all_read(&self, member_id: &str) -> RepoResult<usize> {
        let conn = lock(&self.db)?;
        let updated = conn.execute(
            "UPDATE notifications SET read_at = ?1 WHERE member_id = ?2 AND read_at IS NULL",
            (now_timestamp(), member_id),
        )?;
        Ok(updated)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        Ok(Notification {
            id: row.get(0)?,
            member_id: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            link: row.get(5)?,
            read_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}
