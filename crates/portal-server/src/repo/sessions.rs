//! Login session repository.

use chrono::{DateTime, Duration, Utc};
use portal::codes::generate_session_token;
use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::db::{lock, timestamp, DbPool};

use super::{RepoError, RepoResult};

/// A login session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    pub member_id: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Repository for login sessions.
pub struct SessionRepo {
    db: DbPool,
}

impl SessionRepo {
    /// Create a new session repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Start a session for `member_id` that expires `ttl` after `now`.
    pub fn create(
        &self,
        member_id: &str,
        ttl: std::time::Duration,
        now: DateTime<Utc>,
    ) -> RepoResult<Session> {
        let ttl = Duration::from_std(ttl)
            .map_err(|_| RepoError::Invalid("session ttl out of range".to_string()))?;
        let session = Session {
            token: generate_session_token(),
            member_id: member_id.to_string(),
            created_at: timestamp(now),
            expires_at: timestamp(now + ttl),
        };

        let conn = lock(&self.db)?;
        conn.execute(
            "INSERT INTO sessions (token, member_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            (
                &session.token,
                &session.member_id,
                &session.created_at,
                &session.expires_at,
            ),
        )?;

        Ok(session)
    }

    /// Look up a session that has not expired at `now`.
    pub fn find_valid(&self, token: &str, now: DateTime<Utc>) -> RepoResult<Option<Session>> {
        let conn = lock(&self.db)?;
        let session = conn
            .query_row(
                "SELECT token, member_id, created_at, expires_at
                 FROM sessions WHERE token = ?1 AND expires_at > ?2",
                (token, timestamp(now)),
                |row| {
                    Ok(Session {
                        token: row.get(0)?,
                        member_id: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// End a session. Revoking an unknown token is a no-op.
    pub fn revoke(&self, token: &str) -> RepoResult<()> {
        let conn = lock(&self.db)?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
        Ok(())
    }
}
