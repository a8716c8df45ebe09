//! Magic-link code store.
//!
//! Codes are time-boxed and single-use. Only the newest unused code for an
//! email is accepted, and each wrong guess counts against it.

use chrono::{DateTime, Duration, Utc};
use portal::codes::hash_code;
use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::db::{lock, parse_timestamp, timestamp, DbPool};

use super::{RepoError, RepoResult};

/// Result of checking a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// The code matched and has now been consumed.
    Verified,
    /// No live code for the email, or the code did not match.
    Invalid,
    /// The newest code for the email has expired.
    Expired,
    /// The newest code was guessed wrong too often.
    TooManyAttempts,
}

/// Repository for magic-link codes.
pub struct MagicCodeRepo {
    db: DbPool,
}

impl MagicCodeRepo {
    /// Create a new code repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Store a freshly generated code for `email`.
    ///
    /// Older unused codes for the same email are discarded, so only the
    /// latest email a member received works.
    pub fn issue(
        &self,
        email: &str,
        code: &str,
        ttl: std::time::Duration,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        let ttl = Duration::from_std(ttl)
            .map_err(|_| RepoError::Invalid("code ttl out of range".to_string()))?;

        let mut conn = lock(&self.db)?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM magic_codes WHERE email = ?1 AND used_at IS NULL",
            [email],
        )?;
        tx.execute(
            "INSERT INTO magic_codes (email, code_hash, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            (email, hash_code(code), timestamp(now), timestamp(now + ttl)),
        )?;
        tx.commit()?;

        Ok(())
    }

    /// Check `code` against the newest unused code for `email`.
    pub fn verify(
        &self,
        email: &str,
        code: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> RepoResult<VerifyOutcome> {
        let mut conn = lock(&self.db)?;
        let tx = conn.transaction()?;

        let row: Option<(i64, String, String, u32)> = tx
            .query_row(
                "SELECT id, code_hash, expires_at, attempts FROM magic_codes
                 WHERE email = ?1 AND used_at IS NULL
                 ORDER BY id DESC LIMIT 1",
                [email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((id, code_hash, expires_at, attempts)) = row else {
            return Ok(VerifyOutcome::Invalid);
        };

        let expired = parse_timestamp(&expires_at).map_or(true, |at| at <= now);
        let outcome = if expired {
            VerifyOutcome::Expired
        } else if attempts >= max_attempts {
            VerifyOutcome::TooManyAttempts
        } else if hash_code(code) == code_hash {
            tx.execute(
                "UPDATE magic_codes SET used_at = ?1 WHERE id = ?2 AND used_at IS NULL",
                (timestamp(now), id),
            )?;
            VerifyOutcome::Verified
        } else {
            tx.execute(
                "UPDATE magic_codes SET attempts = attempts + 1 WHERE id = ?1",
                [id],
            )?;
            VerifyOutcome::Invalid
        };

        tx.commit()?;
        Ok(outcome)
    }
}
