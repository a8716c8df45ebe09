//! Prescription repository for database operations.

use crate::db::{lock, now_timestamp, DbPool};
use crate::models::{ConsultationStatus, NewPrescription, Prescription, PrescriptionStatus};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{clamp_limit, require, text_enum, ConsultationRepo, RepoError, RepoResult};

const COLUMNS: &str = "id, consultation_id, patient_id, provider_id, pharmacy_id, medication,
                       dosage, quantity, refills, instructions, status, fax_id,
                       created_at, updated_at";

/// Repository for prescription database operations.
pub struct PrescriptionRepo {
    db: DbPool,
}

/// Filter options for listing prescriptions.
#[derive(Debug, Default)]
pub struct PrescriptionFilter {
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    pub pharmacy_id: Option<String>,
    pub consultation_id: Option<String>,
    pub status: Option<PrescriptionStatus>,
    /// Maximum number of results to return.
    pub limit: Option<i64>,
    /// Number of results to skip.
    pub offset: Option<i64>,
}

impl PrescriptionRepo {
    /// Create a new prescription repository with the given database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Write a prescription for a consultation.
    ///
    /// Patient and provider are taken from the consultation, which must have
    /// started.
    pub fn create(&self, new: NewPrescription) -> RepoResult<Prescription> {
        require("medication", &new.medication)?;
        require("dosage", &new.dosage)?;
        if new.quantity <= 0 {
            return Err(RepoError::Invalid("quantity must be positive".to_string()));
        }
        if new.refills < 0 {
            return Err(RepoError::Invalid("refills cannot be negative".to_string()));
        }

        let consultation = ConsultationRepo::new(self.db.clone())
            .get(&new.consultation_id)?
            .ok_or(RepoError::NotFound("consultation"))?;
        if !matches!(
            consultation.status,
            ConsultationStatus::InProgress | ConsultationStatus::Completed
        ) {
            return Err(RepoError::Invalid(format!(
                "cannot prescribe for a {} consultation",
                consultation.status.as_str()
            )));
        }
        let provider_id = consultation.provider_id.ok_or_else(|| {
            RepoError::Invalid("consultation has no assigned provider".to_string())
        })?;

        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        {
            let conn = lock(&self.db)?;
            conn.execute(
                "INSERT INTO prescriptions (id, consultation_id, patient_id, provider_id,
                                            medication, dosage, quantity, refills, instructions,
                                            status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10, ?10)",
                (
                    &id,
                    &consultation.id,
                    &consultation.patient_id,
                    &provider_id,
                    new.medication.trim(),
                    new.dosage.trim(),
                    new.quantity,
                    new.refills,
                    &new.instructions,
                    &now,
                ),
            )?;
        }

        self.require(&id)
    }

    /// Get a prescription by ID.
    pub fn get(&self, id: &str) -> RepoResult<Option<Prescription>> {
        let conn = lock(&self.db)?;
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM prescriptions WHERE id = ?1"))?;
        Ok(stmt.query_row([id], Self::map_row).optional()?)
    }

    /// List prescriptions, newest first.
    pub fn list(&self, filter: PrescriptionFilter) -> RepoResult<Vec<Prescription>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM prescriptions
             WHERE (?1 IS NULL OR patient_id = ?1)
               AND (?2 IS NULL OR provider_id = ?2)
               AND (?3 IS NULL OR pharmacy_id = ?3)
               AND (?4 IS NULL OR consultation_id = ?4)
               AND (?5 IS NULL OR status = ?5)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?6 OFFSET ?7"
        ))?;

        let prescriptions = stmt
            .query_map(
                (
                    filter.patient_id.as_deref(),
                    filter.provider_id.as_deref(),
                    filter.pharmacy_id.as_deref(),
                    filter.consultation_id.as_deref(),
                    filter.status.map(|s| s.as_str()),
                    clamp_limit(filter.limit),
                    filter.offset.unwrap_or(0).max(0),
                ),
                Self::map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prescriptions)
    }

    /// Record that a pending prescription went to `pharmacy_id`.
    pub fn mark_sent(
        &self,
        id: &str,
        pharmacy_id: &str,
        fax_id: Option<&str>,
    ) -> RepoResult<Prescription> {
        self.transition(
            id,
            &[PrescriptionStatus::Pending],
            PrescriptionStatus::Sent,
            "UPDATE prescriptions SET status = 'sent', pharmacy_id = ?1, fax_id = ?2,
                                      updated_at = ?3
             WHERE id = ?4 AND status = 'pending'",
            (pharmacy_id, fax_id, now_timestamp(), id),
        )
    }

    /// Record that the pharmacy dispensed a sent prescription.
    pub fn mark_filled(&self, id: &str) -> RepoResult<Prescription> {
        self.transition(
            id,
            &[PrescriptionStatus::Sent],
            PrescriptionStatus::Filled,
            "UPDATE prescriptions SET status = 'filled', updated_at = ?1
             WHERE id = ?2 AND status = 'sent'",
            (now_timestamp(), id),
        )
    }

    /// Cancel a prescription that has not been filled.
    pub fn cancel(&self, id: &str) -> RepoResult<Prescription> {
        self.transition(
            id,
            &[PrescriptionStatus::Pending, PrescriptionStatus::Sent],
            PrescriptionStatus::Cancelled,
            "UPDATE prescriptions SET status = 'cancelled', updated_at = ?1
             WHERE id = ?2 AND status IN ('pending', 'sent')",
            (now_timestamp(), id),
        )
    }

    fn require(&self, id: &str) -> RepoResult<Prescription> {
        self.get(id)?.ok_or(RepoError::NotFound("prescription"))
    }

    fn transition<P: rusqlite::Params>(
        &self,
        id: &str,
        allowed: &[PrescriptionStatus],
        to: PrescriptionStatus,
        sql: &str,
        params: P,
    ) -> RepoResult<Prescription> {
        let current = self.require(id)?;
        let invalid = |from: PrescriptionStatus| RepoError::InvalidTransition {
            entity: "prescription",
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        };
        if !allowed.contains(&current.status) {
            return Err(invalid(current.status));
        }

        let updated = {
            let conn = lock(&self.db)?;
            conn.execute(sql, params)?
        };
        let latest = self.require(id)?;
        if updated == 0 {
            return Err(invalid(latest.status));
        }
        Ok(latest)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Prescription> {
        Ok(Prescription {
            id: row.get(0)?,
            consultation_id: row.get(1)?,
            patient_id: row.get(2)?,
            provider_id: row.get(3)?,
            pharmacy_id: row.get(4)?,
            medication: row.get(5)?,
            dosage: row.get(6)?,
            quantity: row.get(7)?,
            refills: row.get(8)?,
            instructions: row.get(9)?,
            status: text_enum(row, 10)?,
            fax_id: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Consultation, Member, NewConsultation, Role};
    use crate::repo::fixtures;

    struct Setup {
        repo: PrescriptionRepo,
        consultations: ConsultationRepo,
        patient: Member,
        provider: Member,
        pharmacy: Member,
    }

    fn setup() -> Setup {
        let db = fixtures::db();
        Setup {
            repo: PrescriptionRepo::new(db.clone()),
            consultations: ConsultationRepo::new(db.clone()),
            patient: fixtures::member(&db, "p@example.com", Role::Patient),
            provider: fixtures::member(&db, "dr@example.com", Role::Provider),
            pharmacy: fixtures::member(&db, "rx@example.com", Role::Pharmacy),
        }
    }

    fn started_consultation(s: &Setup) -> Consultation {
        let c = s
            .consultations
            .create(
                &s.patient.id,
                NewConsultation {
                    reason: "sinus infection".to_string(),
                    scheduled_at: "2025-03-01T09:00:00Z".to_string(),
                    intake_id: None,
                },
            )
            .unwrap();
        s.consultations.assign(&c.id, &s.provider.id).unwrap();
        s.consultations
            .start(&c.id, "room", "https://video.example.com/room")
            .unwrap()
    }

    fn order(consultation_id: &str) -> NewPrescription {
        NewPrescription {
            consultation_id: consultation_id.to_string(),
            medication: "Amoxicillin".to_string(),
            dosage: "500 mg three times daily".to_string(),
            quantity: 21,
            refills: 0,
            instructions: Some("Take with food".to_string()),
        }
    }

    #[test]
    fn test_create_copies_participants() {
        let s = setup();
        let c = started_consultation(&s);

        let rx = s.repo.create(order(&c.id)).unwrap();

        assert_eq!(rx.patient_id, s.patient.id);
        assert_eq!(rx.provider_id, s.provider.id);
        assert_eq!(rx.status, PrescriptionStatus::Pending);
        assert!(rx.pharmacy_id.is_none());
    }

    #[test]
    fn test_create_requires_started_consultation() {
        let s = setup();
        let c = s
            .consultations
            .create(
                &s.patient.id,
                NewConsultation {
                    reason: "rash".to_string(),
                    scheduled_at: "2025-03-01T09:00:00Z".to_string(),
                    intake_id: None,
                },
            )
            .unwrap();

        assert!(matches!(
            s.repo.create(order(&c.id)),
            Err(RepoError::Invalid(_))
        ));
        assert!(matches!(
            s.repo.create(order("missing")),
            Err(RepoError::NotFound("consultation"))
        ));
    }

    #[test]
    fn test_create_validates_quantities() {
        let s = setup();
        let c = started_consultation(&s);

        let mut bad = order(&c.id);
        bad.quantity = 0;
        assert!(matches!(s.repo.create(bad), Err(RepoError::Invalid(_))));

        let mut bad = order(&c.id);
        bad.refills = -1;
        assert!(matches!(s.repo.create(bad), Err(RepoError::Invalid(_))));
    }

    #[test]
    fn test_send_and_fill() {
        let s = setup();
        let c = started_consultation(&s);
        let rx = s.repo.create(order(&c.id)).unwrap();

        let sent = s
            .repo
            .mark_sent(&rx.id, &s.pharmacy.id, Some("fax-42"))
            .unwrap();
        assert_eq!(sent.status, PrescriptionStatus::Sent);
        assert_eq!(sent.pharmacy_id.as_deref(), Some(s.pharmacy.id.as_str()));
        assert_eq!(sent.fax_id.as_deref(), Some("fax-42"));

        let filled = s.repo.mark_filled(&rx.id).unwrap();
        assert_eq!(filled.status, PrescriptionStatus::Filled);

        // Filled prescriptions can no longer be cancelled
        assert!(matches!(
            s.repo.cancel(&rx.id),
            Err(RepoError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cannot_fill_unsent() {
        let s = setup();
        let c = started_consultation(&s);
        let rx = s.repo.create(order(&c.id)).unwrap();

        match s.repo.mark_filled(&rx.id) {
            Err(RepoError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, "pending");
                assert_eq!(to, "filled");
            }
            other => panic!("Expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_list_scoped_by_pharmacy() {
        let s = setup();
        let c = started_consultation(&s);
        let a = s.repo.create(order(&c.id)).unwrap();
        s.repo.create(order(&c.id)).unwrap();
        s.repo.mark_sent(&a.id, &s.pharmacy.id, None).unwrap();

        let incoming = s
            .repo
            .list(PrescriptionFilter {
                pharmacy_id: Some(s.pharmacy.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].id, a.id);

        let for_patient = s
            .repo
            .list(PrescriptionFilter {
                patient_id: Some(s.patient.id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(for_patient.len(), 2);

        let pending = s
            .repo
            .list(PrescriptionFilter {
                status: Some(PrescriptionStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
    }
}
