//! Fixed-window rate-limit counters.
//!
//! Each bucket key holds one row: the start of the current window and the
//! number of hits admitted in it. A hit after the window has elapsed starts
//! a new window.

use chrono::{DateTime, Utc};
use portal::config::RateLimitConfig;
use rusqlite::OptionalExtension;
use std::time::Duration;

use crate::db::{lock, DbPool};

use super::{RepoError, RepoResult};

/// At most `max` hits per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub window: Duration,
}

impl From<RateLimitConfig> for RateLimit {
    fn from(config: RateLimitConfig) -> Self {
        Self {
            max: config.max,
            window: config.window(),
        }
    }
}

/// Repository for rate-limit counters.
pub struct RateLimitRepo {
    db: DbPool,
}

impl RateLimitRepo {
    /// Create a new rate-limit repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Count a hit against `key`.
    ///
    /// Returns the number of hits still available in the current window, or
    /// [`RepoError::RateLimited`] with the seconds until the window resets.
    pub fn hit(&self, key: &str, limit: RateLimit, now: DateTime<Utc>) -> RepoResult<u32> {
        let now_ms = now.timestamp_millis();
        let window_ms = i64::try_from(limit.window.as_millis()).unwrap_or(i64::MAX);

        let mut conn = lock(&self.db)?;
        let tx = conn.transaction()?;

        let current: Option<(i64, u32)> = tx
            .query_row(
                "SELECT window_start_ms, count FROM rate_limits WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let remaining = match current {
            Some((start, count)) if now_ms < start.saturating_add(window_ms) => {
                if count >= limit.max {
                    let remaining_ms = start.saturating_add(window_ms) - now_ms;
                    let retry_after_secs = (remaining_ms as u64).div_ceil(1000).max(1);
                    tracing::debug!(key, retry_after_secs, "Rate limit exceeded");
                    return Err(RepoError::RateLimited { retry_after_secs });
                }
                tx.execute(
                    "UPDATE rate_limits SET count = count + 1 WHERE key = ?1",
                    [key],
                )?;
                limit.max - count - 1
            }
            _ => {
                tx.execute(
                    "INSERT INTO rate_limits (key, window_start_ms, window_ms, count)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT(key) DO UPDATE SET
                        window_start_ms = excluded.window_start_ms,
                        window_ms = excluded.window_ms,
                        count = 1",
                    (key, now_ms, window_ms),
                )?;
                limit.max.saturating_sub(1)
            }
        };

        tx.commit()?;
        Ok(remaining)
    }

    /// Forget the counter for `key`.
    pub fn reset(&self, key: &str) -> RepoResult<()> {
        let conn = lock(&self.db)?;
        conn.execute("DELETE FROM rate_limits WHERE key = ?1", [key])?;
        Ok(())
    }
}
