//! Intake repository for database operations.

use crate::db::{lock, now_timestamp, DbPool};
use crate::models::{Intake, IntakeStatus, NewIntake};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{clamp_limit, require, text_enum, RepoError, RepoResult};

const COLUMNS: &str = "id, patient_id, chief_complaint, symptoms, medications, allergies,
                       medical_history, status, summary, created_at, updated_at";

/// Repository for intake database operations.
pub struct IntakeRepo {
    db: DbPool,
}

/// Filter options for listing intakes.
#[derive(Debug, Default)]
pub struct IntakeFilter {
    /// Only intakes submitted by this patient.
    pub patient_id: Option<String>,
    /// Only intakes in this state.
    pub status: Option<IntakeStatus>,
    /// Maximum number of results to return.
    pub limit: Option<i64>,
    /// Number of results to skip.
    pub offset: Option<i64>,
}

impl IntakeRepo {
    /// Create a new intake repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Store a submitted intake form.
    pub fn create(&self, patient_id: &str, intake: NewIntake) -> RepoResult<Intake> {
        require("chief_complaint", &intake.chief_complaint)?;

        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        {
            let conn = lock(&self.db)?;
            conn.execute(
                "INSERT INTO intakes (id, patient_id, chief_complaint, symptoms, medications,
                                      allergies, medical_history, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'submitted', ?8, ?8)",
                (
                    &id,
                    patient_id,
                    intake.chief_complaint.trim(),
                    &intake.symptoms,
                    &intake.medications,
                    &intake.allergies,
                    &intake.medical_history,
                    &now,
                ),
            )?;
        }

        self.get(&id)?.ok_or(RepoError::NotFound("intake"))
    }

    /// Get an intake by ID.
    pub fn get(&self, id: &str) -> RepoResult<Option<Intake>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM intakes WHERE id = ?1"))?;
        Ok(stmt.query_row([id], Self::map_row).optional()?)
    }

    /// List intakes, newest first.
    pub fn list(&self, filter: IntakeFilter) -> RepoResult<Vec<Intake>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM intakes
             WHERE (?1 IS NULL OR patient_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4"
        ))?;

        let intakes = stmt
            .query_map(
                (
                    filter.patient_id.as_deref(),
                    filter.status.map(|s| s.as_str()),
                    clamp_limit(filter.limit),
                    filter.offset.unwrap_or(0).max(0),
                ),
                Self::map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(intakes)
    }

    /// Move an intake to `status`.
    pub fn set_status(&self, id: &str, status: IntakeStatus) -> RepoResult<Intake> {
        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(
                "UPDATE intakes SET status = ?1, updated_at = ?2 WHERE id = ?3",
                (status.as_str(), now_timestamp(), id),
            )?
        };
        if updated == 0 {
            return Err(RepoError::NotFound("intake"));
        }
        self.get(id)?.ok_or(RepoError::NotFound("intake"))
    }

    /// Store a generated summary.
    pub fn set_summary(&self, id: &str, summary: &str) -> RepoResult<Intake> {
        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(
                "UPDATE intakes SET summary = ?1, updated_at = ?2 WHERE id = ?3",
                (summary, now_timestamp(), id),
            )?
        };
        if updated == 0 {
            return Err(RepoError::NotFound("intake"));
        }
        self.get(id)?.ok_or(RepoError::NotFound("intake"))
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Intake> {
        Ok(Intake {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            chief_complaint: row.get(2)?,
            symptoms: row.get(3)?,
            medications: row.get(4)?,
            allergies: row.get(5)?,
            medical_history: row.get(6)?,
            status: text_enum(row, 7)?,
            summary: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}
