//! Passkey credential registry.

use crate::db::{lock, now_timestamp, DbPool};
use crate::models::Passkey;
use rusqlite::OptionalExtension;

use super::{require, RepoError, RepoResult};

const COLUMNS: &str = "credential_id, member_id, label, public_key, created_at, last_used_at";

/// Repository for passkey database operations.
pub struct PasskeyRepo {
    db: DbPool,
}

impl PasskeyRepo {
    /// Create a new passkey repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Register a credential for a member.
    ///
    /// Credential IDs are globally unique; registering one that already
    /// exists is rejected.
    pub fn register(
        &self,
        member_id: &str,
        credential_id: &str,
        public_key: &str,
        label: Option<&str>,
    ) -> RepoResult<Passkey> {
        require("credential_id", credential_id)?;
        require("public_key", public_key)?;

        {
            let conn = lock(&self.db)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO passkeys (credential_id, member_id, label, public_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (credential_id, member_id, label, public_key, now_timestamp()),
            )?;
            if inserted == 0 {
                return Err(RepoError::Invalid(
                    "credential is already registered".to_string(),
                ));
            }
        }

        self.get(credential_id)?
            .ok_or(RepoError::NotFound("passkey"))
    }

    pub fn get(&self, credential_id: &str) -> RepoResult<Option<Passkey>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM passkeys WHERE credential_id = ?1"
        ))?;
        Ok(stmt.query_row([credential_id], Self::map_row).optional()?)
    }

    /// List a member's credentials, oldest first.
    pub fn list(&self, member_id: &str) -> RepoResult<Vec<Passkey>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM passkeys WHERE member_id = ?1 ORDER BY created_at, credential_id"
        ))?;
        let passkeys = stmt
            .query_map([member_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(passkeys)
    }

    /// Record a successful use of a credential.
    pub fn touch(&self, credential_id: &str) -> RepoResult<Passkey> {
        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(
                "UPDATE passkeys SET last_used_at = ?1 WHERE credential_id = ?2",
                (now_timestamp(), credential_id),
            )?
        };
        if updated == 0 {
            return Err(RepoError::NotFound("passkey"));
        }
        self.get(credential_id)?
            .ok_or(RepoError::NotFound("passkey"))
    }

    /// Remove a member's own credential.
    pub fn remove(&self, member_id: &str, credential_id: &str) -> RepoResult<()> {
        let conn = lock(&self.db)?;
        let deleted = conn.execute(
            "DELETE FROM passkeys WHERE credential_id = ?1 AND member_id = ?2",
            (credential_id, member_id),
        )?;
        if deleted == 0 {
            return Err(RepoError::NotFound("passkey"));
        }
        Ok(())
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Passkey> {
        Ok(Passkey {
            credential_id: row.get(0)?,
            member_id: row.get(1)?,
            label: row.get(2)?,
            public_key: row.get(3)?,
            created_at: row.get(4)?,
            last_used_at: row.get(5)?,
        })
    }
}
