//! Repository modules for database operations.

pub mod audit;
pub mod consultations;
pub mod intakes;
pub mod magic_codes;
pub mod members;
pub mod notifications;
pub mod passkeys;
pub mod prescriptions;
pub mod rate_limits;
pub mod sessions;

pub use audit::{AuditEntry, AuditFilter, AuditRepo};
pub use consultations::{ConsultationFilter, ConsultationRepo};
pub use intakes::{IntakeFilter, IntakeRepo};
pub use magic_codes::{MagicCodeRepo, VerifyOutcome};
pub use members::MemberRepo;
pub use notifications::NotificationRepo;
pub use passkeys::PasskeyRepo;
pub use prescriptions::{PrescriptionFilter, PrescriptionRepo};
pub use rate_limits::{RateLimit, RateLimitRepo};
pub use sessions::{Session, SessionRepo};

use std::str::FromStr;
use thiserror::Error;

/// Default page size for list queries.
pub const DEFAULT_LIMIT: i64 = 50;
/// Largest page size a caller may request.
pub const MAX_LIMIT: i64 = 200;

/// Errors returned by repositories.
#[derive(Error, Debug)]
pub enum RepoError {
    /// SQLite reported an error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A thread panicked while holding the connection.
    #[error("Database lock poisoned")]
    LockPoisoned,
    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// The record is not in a state that allows the requested change.
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    /// Another member already holds the record.
    #[error("{0}")]
    Conflict(String),
    /// A fixed-window limit was exhausted.
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    /// The input failed validation.
    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Read a text column into an enum with a `FromStr` impl.
pub(crate) fn text_enum<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.get(idx)?;
    value.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Clamp a requested page size into `1..=MAX_LIMIT`.
pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Reject blank required text fields.
pub(crate) fn require(field: &str, value: &str) -> RepoResult<()> {
    if value.trim().is_empty() {
        Err(RepoError::Invalid(format!("{field} is required")))
    } else {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn test_require() {
        assert!(require("reason", "headache").is_ok());
        match require("reason", "   ") {
            Err(RepoError::Invalid(msg)) => assert_eq!(msg, "reason is required"),
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }
}
