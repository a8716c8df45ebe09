//! Consultation repository for database operations.

use crate::db::{lock, now_timestamp, parse_timestamp, timestamp, DbPool};
use crate::models::{Consultation, ConsultationStatus, NewConsultation};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{clamp_limit, require, text_enum, RepoError, RepoResult};

const COLUMNS: &str = "id, patient_id, provider_id, intake_id, reason, scheduled_at, status,
                       room_name, room_url, notes, created_at, updated_at";

/// Repository for consultation database operations.
pub struct ConsultationRepo {
    db: DbPool,
}

/// Filter options for listing consultations.
#[derive(Debug, Default)]
pub struct ConsultationFilter {
    /// Only this patient's consultations.
    pub patient_id: Option<String>,
    /// Only consultations assigned to this provider.
    pub provider_id: Option<String>,
    /// Only consultations in this state.
    pub status: Option<ConsultationStatus>,
    /// Only consultations with no provider yet.
    pub unassigned: bool,
    /// Maximum number of results to return.
    pub limit: Option<i64>,
    /// Number of results to skip.
    pub offset: Option<i64>,
}

impl ConsultationRepo {
    /// Create a new consultation repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Book a consultation for `patient_id`.
    ///
    /// `scheduled_at` must be RFC 3339. A referenced intake must belong to
    /// the same patient.
    pub fn create(&self, patient_id: &str, new: NewConsultation) -> RepoResult<Consultation> {
        require("reason", &new.reason)?;
        let scheduled_at = parse_timestamp(&new.scheduled_at).ok_or_else(|| {
            RepoError::Invalid(format!("scheduled_at '{}' is not RFC 3339", new.scheduled_at))
        })?;

        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        {
            let conn = lock(&self.db)?;

            if let Some(intake_id) = &new.intake_id {
                let owner: Option<String> = conn
                    .query_row(
                        "SELECT patient_id FROM intakes WHERE id = ?1",
                        [intake_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if owner.as_deref() != Some(patient_id) {
                    return Err(RepoError::Invalid(format!(
                        "intake {intake_id} does not belong to this patient"
                    )));
                }
            }

            conn.execute(
                "INSERT INTO consultations (id, patient_id, intake_id, reason, scheduled_at,
                                            status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'scheduled', ?6, ?6)",
                (
                    &id,
                    patient_id,
                    &new.intake_id,
                    new.reason.trim(),
                    timestamp(scheduled_at),
                    &now,
                ),
            )?;
        }

        self.get(&id)?.ok_or(RepoError::NotFound("consultation"))
    }

    /// Get a consultation by ID.
    pub fn get(&self, id: &str) -> RepoResult<Option<Consultation>> {
        let conn = lock(&self.db)?;
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM consultations WHERE id = ?1"))?;
        Ok(stmt.query_row([id], Self::map_row).optional()?)
    }

    /// List consultations ordered by scheduled time.
    pub fn list(&self, filter: ConsultationFilter) -> RepoResult<Vec<Consultation>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM consultations
             WHERE (?1 IS NULL OR patient_id = ?1)
               AND (?2 IS NULL OR provider_id = ?2)
               AND (?3 IS NULL OR status = ?3)
               AND (?4 = 0 OR provider_id IS NULL)
             ORDER BY scheduled_at, id
             LIMIT ?5 OFFSET ?6"
        ))?;

        let consultations = stmt
            .query_map(
                (
                    filter.patient_id.as_deref(),
                    filter.provider_id.as_deref(),
                    filter.status.map(|s| s.as_str()),
                    filter.unassigned,
                    clamp_limit(filter.limit),
                    filter.offset.unwrap_or(0).max(0),
                ),
                Self::map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(consultations)
    }

    /// Assign a provider while the consultation is still scheduled.
    ///
    /// Re-assigning the same provider succeeds; a consultation held by
    /// another provider is a [`RepoError::Conflict`].
    pub fn assign(&self, id: &str, provider_id: &str) -> RepoResult<Consultation> {
        let current = self.require(id)?;
        Self::guard(&current, &[ConsultationStatus::Scheduled], "assigned")?;
        Self::check_holder(&current, provider_id)?;

        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(
                "UPDATE consultations SET provider_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'scheduled'
                   AND (provider_id IS NULL OR provider_id = ?1)",
                (provider_id, now_timestamp(), id),
            )?
        };

        let latest = self.require(id)?;
        if updated == 0 {
            Self::check_holder(&latest, provider_id)?;
            return Err(RepoError::InvalidTransition {
                entity: "consultation",
                from: latest.status.as_str().to_string(),
                to: "assigned".to_string(),
            });
        }
        Ok(latest)
    }

    fn check_holder(consultation: &Consultation, provider_id: &str) -> RepoResult<()> {
        match consultation.provider_id.as_deref() {
            Some(holder) if holder != provider_id => Err(RepoError::Conflict(
                "consultation is assigned to another provider".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Start the visit in the given video room.
    pub fn start(&self, id: &str, room_name: &str, room_url: &str) -> RepoResult<Consultation> {
        let current = self.require(id)?;
        Self::guard(
            &current,
            &[ConsultationStatus::Scheduled],
            ConsultationStatus::InProgress.as_str(),
        )?;
        if current.provider_id.is_none() {
            return Err(RepoError::Invalid(
                "consultation has no assigned provider".to_string(),
            ));
        }

        self.update(
            "UPDATE consultations SET status = 'in_progress', room_name = ?1, room_url = ?2,
                                      updated_at = ?3
             WHERE id = ?4 AND status = 'scheduled'",
            (room_name, room_url, now_timestamp(), id),
            &current,
            ConsultationStatus::InProgress.as_str(),
        )
    }

    /// Finish an in-progress visit, keeping the provider's notes.
    pub fn complete(&self, id: &str, notes: Option<&str>) -> RepoResult<Consultation> {
        let current = self.require(id)?;
        Self::guard(
            &current,
            &[ConsultationStatus::InProgress],
            ConsultationStatus::Completed.as_str(),
        )?;

        self.update(
            "UPDATE consultations SET status = 'completed', notes = COALESCE(?1, notes),
                                      updated_at = ?2
             WHERE id = ?3 AND status = 'in_progress'",
            (notes, now_timestamp(), id),
            &current,
            ConsultationStatus::Completed.as_str(),
        )
    }

    /// Cancel a consultation that has not finished.
    pub fn cancel(&self, id: &str) -> RepoResult<Consultation> {
        let current = self.require(id)?;
        Self::guard(
            &current,
            &[ConsultationStatus::Scheduled, ConsultationStatus::InProgress],
            ConsultationStatus::Cancelled.as_str(),
        )?;

        self.update(
            "UPDATE consultations SET status = 'cancelled', updated_at = ?1
             WHERE id = ?2 AND status IN ('scheduled', 'in_progress')",
            (now_timestamp(), id),
            &current,
            ConsultationStatus::Cancelled.as_str(),
        )
    }

    fn require(&self, id: &str) -> RepoResult<Consultation> {
        self.get(id)?.ok_or(RepoError::NotFound("consultation"))
    }

    fn guard(
        current: &Consultation,
        allowed: &[ConsultationStatus],
        to: &str,
    ) -> RepoResult<()> {
        if allowed.contains(&current.status) {
            Ok(())
        } else {
            Err(RepoError::InvalidTransition {
                entity: "consultation",
                from: current.status.as_str().to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Run a status-guarded update; zero affected rows means another request
    /// changed the status first.
    fn update<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
        current: &Consultation,
        to: &str,
    ) -> RepoResult<Consultation> {
        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(sql, params)?
        };
        if updated == 0 {
            let latest = self.require(&current.id)?;
            return Err(RepoError::InvalidTransition {
                entity: "consultation",
                from: latest.status.as_str().to_string(),
                to: to.to_string(),
            });
        }
        self.require(&current.id)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Consultation> {
        Ok(Consultation {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            provider_id: row.get(2)?,
            intake_id: row.get(3)?,
            reason: row.get(4)?,
            scheduled_at: row.get(5)?,
            status: text_enum(row, 6)?,
            room_name: row.get(7)?,
            room_url: row.get(8)?,
            notes: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}
