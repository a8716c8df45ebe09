//! Member repository for database operations.

use crate::db::{lock, now_timestamp, DbPool};
use crate::models::{Member, Role};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{text_enum, RepoError, RepoResult};

const COLUMNS: &str =
    "id, email, role, display_name, npi, npi_verified, fax_number, created_at";

/// Repository for member database operations.
pub struct MemberRepo {
    db: DbPool,
}

impl MemberRepo {
    /// Create a new member repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Ensure a member exists for `email` and return it.
    ///
    /// If the member already exists it is returned unchanged; `role` and
    /// `display_name` only apply to newly created members.
    pub fn upsert_by_email(
        &self,
        email: &str,
        role: Role,
        display_name: Option<&str>,
    ) -> RepoResult<Member> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(RepoError::Invalid("email is required".to_string()));
        }

        {
            let conn = lock(&self.db)?;
            conn.execute(
                "INSERT OR IGNORE INTO members (id, email, role, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    Uuid::new_v4().to_string(),
                    &email,
                    role.as_str(),
                    display_name,
                    now_timestamp(),
                ),
            )?;
        }

        self.get_by_email(&email)?
            .ok_or(RepoError::NotFound("member"))
    }

    /// Get a member by ID.
    ///
    /// Returns `None` if the member doesn't exist.
    pub fn get(&self, id: &str) -> RepoResult<Option<Member>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM members WHERE id = ?1"))?;
        Ok(stmt.query_row([id], Self::map_row).optional()?)
    }

    /// Get a member by email (case-insensitive).
    pub fn get_by_email(&self, email: &str) -> RepoResult<Option<Member>> {
        let conn = lock(&self.db)?;
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM members WHERE email = ?1"))?;
        Ok(stmt
            .query_row([email.trim().to_lowercase()], Self::map_row)
            .optional()?)
    }

    /// List members, optionally restricted to one role, ordered by email.
    pub fn list_by_role(&self, role: Option<Role>) -> RepoResult<Vec<Member>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM members
             WHERE (?1 IS NULL OR role = ?1)
             ORDER BY email"
        ))?;

        let members = stmt
            .query_map([role.map(|r| r.as_str())], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Update the editable profile fields. `None` leaves a field unchanged.
    pub fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        fax_number: Option<&str>,
    ) -> RepoResult<Member> {
        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(
                "UPDATE members SET
                    display_name = COALESCE(?1, display_name),
                    fax_number = COALESCE(?2, fax_number)
                 WHERE id = ?3",
                (display_name, fax_number, id),
            )?
        };
        if updated == 0 {
            return Err(RepoError::NotFound("member"));
        }
        self.get(id)?.ok_or(RepoError::NotFound("member"))
    }

    /// Record a provider's NPI and whether the registry confirmed it.
    pub fn set_npi(&self, id: &str, npi: &str, verified: bool) -> RepoResult<Member> {
        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(
                "UPDATE members SET npi = ?1, npi_verified = ?2 WHERE id = ?3",
                (npi, verified, id),
            )?
        };
        if updated == 0 {
            return Err(RepoError::NotFound("member"));
        }
        self.get(id)?.ok_or(RepoError::NotFound("member"))
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Member> {
        Ok(Member {
            id: row.get(0)?,
            email: row.get(1)?,
            role: text_enum(row, 2)?,
            display_name: row.get(3)?,
            npi: row.get(4)?,
            npi_verified: row.get(5)?,
            fax_number: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::fixtures;

    #[test]
    fn test_upsert_creates_member() {
        let repo = MemberRepo::new(fixtures::db());

        let member = repo
            .upsert_by_email("Alice@Example.com", Role::Patient, Some("Alice"))
            .unwrap();

        assert_eq!(member.email, "alice@example.com");
        assert_eq!(member.role, Role::Patient);
        assert_eq!(member.display_name.as_deref(), Some("Alice"));
        assert!(!member.npi_verified);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let repo = MemberRepo::new(fixtures::db());

        let first = repo
            .upsert_by_email("alice@example.com", Role::Patient, Some("Alice"))
            .unwrap();
        // A second call with different role/name returns the existing record
        let second = repo
            .upsert_by_email("ALICE@example.com", Role::Provider, Some("Someone else"))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.list_by_role(None).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_rejects_blank_email() {
        let repo = MemberRepo::new(fixtures::db());
        assert!(matches!(
            repo.upsert_by_email("  ", Role::Patient, None),
            Err(RepoError::Invalid(_))
        ));
    }

    #[test]
    fn test_get_nonexistent_member() {
        let repo = MemberRepo::new(fixtures::db());
        assert!(repo.get("nonexistent").unwrap().is_none());
        assert!(repo.get_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_list_by_role() {
        let db = fixtures::db();
        let repo = MemberRepo::new(db.clone());

        fixtures::member(&db, "p2@example.com", Role::Patient);
        fixtures::member(&db, "p1@example.com", Role::Patient);
        fixtures::member(&db, "rx@example.com", Role::Pharmacy);

        let patients = repo.list_by_role(Some(Role::Patient)).unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].email, "p1@example.com");
        assert_eq!(patients[1].email, "p2@example.com");

        assert_eq!(repo.list_by_role(None).unwrap().len(), 3);
        assert!(repo.list_by_role(Some(Role::Admin)).unwrap().is_empty());
    }

    #[test]
    fn test_update_profile_keeps_unset_fields() {
        let db = fixtures::db();
        let repo = MemberRepo::new(db.clone());
        let pharmacy = fixtures::member(&db, "rx@example.com", Role::Pharmacy);

        let updated = repo
            .update_profile(&pharmacy.id, Some("Corner Pharmacy"), Some("+15555550100"))
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Corner Pharmacy"));
        assert_eq!(updated.fax_number.as_deref(), Some("+15555550100"));

        let updated = repo.update_profile(&pharmacy.id, None, None).unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Corner Pharmacy"));
        assert_eq!(updated.fax_number.as_deref(), Some("+15555550100"));
    }

    #[test]
    fn test_update_profile_missing_member() {
        let repo = MemberRepo::new(fixtures::db());
        assert!(matches!(
            repo.update_profile("nope", Some("x"), None),
            Err(RepoError::NotFound("member"))
        ));
    }

    #[test]
    fn test_set_npi() {
        let db = fixtures::db();
        let repo = MemberRepo::new(db.clone());
        let provider = fixtures::member(&db, "dr@example.com", Role::Provider);

        let updated = repo.set_npi(&provider.id, "1234567893", true).unwrap();
        assert_eq!(updated.npi.as_deref(), Some("1234567893"));
        assert!(updated.npi_verified);
    }
}
