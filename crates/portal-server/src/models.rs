//! API models for serialization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored or submitted status string is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// What a member is allowed to do in the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Provider,
    Pharmacy,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Provider => "provider",
            Role::Pharmacy => "pharmacy",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "provider" => Ok(Role::Provider),
            "pharmacy" => Ok(Role::Pharmacy),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Intake review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStatus {
    Submitted,
    Reviewed,
    Archived,
}

impl IntakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeStatus::Submitted => "submitted",
            IntakeStatus::Reviewed => "reviewed",
            IntakeStatus::Archived => "archived",
        }
    }
}

impl FromStr for IntakeStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(IntakeStatus::Submitted),
            "reviewed" => Ok(IntakeStatus::Reviewed),
            "archived" => Ok(IntakeStatus::Archived),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Consultation lifecycle.
///
/// `Scheduled -> InProgress -> Completed`, with `Cancelled` reachable from
/// either of the first two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Scheduled => "scheduled",
            ConsultationStatus::InProgress => "in_progress",
            ConsultationStatus::Completed => "completed",
            ConsultationStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the consultation can still change.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConsultationStatus::Scheduled | ConsultationStatus::InProgress
        )
    }
}

impl FromStr for ConsultationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(ConsultationStatus::Scheduled),
            "in_progress" => Ok(ConsultationStatus::InProgress),
            "completed" => Ok(ConsultationStatus::Completed),
            "cancelled" => Ok(ConsultationStatus::Cancelled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Prescription lifecycle: `Pending -> Sent -> Filled`, or `Cancelled`
/// before it is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Pending,
    Sent,
    Filled,
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Pending => "pending",
            PrescriptionStatus::Sent => "sent",
            PrescriptionStatus::Filled => "filled",
            PrescriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PrescriptionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PrescriptionStatus::Pending),
            "sent" => Ok(PrescriptionStatus::Sent),
            "filled" => Ok(PrescriptionStatus::Filled),
            "cancelled" => Ok(PrescriptionStatus::Cancelled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A portal account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    /// Lower-cased email address, unique across members.
    pub email: String,
    pub role: Role,
    pub display_name: Option<String>,
    /// National Provider Identifier, for providers and pharmacies.
    pub npi: Option<String>,
    /// Whether the NPI was confirmed against the registry.
    pub npi_verified: bool,
    /// Fax number prescriptions are sent to (pharmacies).
    pub fax_number: Option<String>,
    pub created_at: String,
}

impl Member {
    /// Name to show in pages and notifications.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// A patient onboarding form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intake {
    pub id: String,
    pub patient_id: String,
    pub chief_complaint: String,
    pub symptoms: Option<String>,
    pub medications: Option<String>,
    pub allergies: Option<String>,
    pub medical_history: Option<String>,
    pub status: IntakeStatus,
    /// Generated clinical summary, once a provider requested one.
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields a patient submits for a new intake.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewIntake {
    pub chief_complaint: String,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
}

/// A telehealth visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: String,
    pub patient_id: String,
    pub provider_id: Option<String>,
    pub intake_id: Option<String>,
    pub reason: String,
    pub scheduled_at: String,
    pub status: ConsultationStatus,
    pub room_name: Option<String>,
    pub room_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Consultation {
    /// Whether `member_id` is the patient or the assigned provider.
    pub fn is_participant(&self, member_id: &str) -> bool {
        self.patient_id == member_id || self.provider_id.as_deref() == Some(member_id)
    }
}

/// Fields a patient submits to request a consultation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewConsultation {
    pub reason: String,
    /// RFC 3339 time the visit should start.
    pub scheduled_at: String,
    #[serde(default)]
    pub intake_id: Option<String>,
}

/// A medication order written during a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub consultation_id: String,
    pub patient_id: String,
    pub provider_id: String,
    pub pharmacy_id: Option<String>,
    pub medication: String,
    pub dosage: String,
    pub quantity: i64,
    pub refills: i64,
    pub instructions: Option<String>,
    pub status: PrescriptionStatus,
    /// Identifier returned by the fax service once sent.
    pub fax_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields a provider submits for a new prescription.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescription {
    pub consultation_id: String,
    pub medication: String,
    pub dosage: String,
    pub quantity: i64,
    #[serde(default)]
    pub refills: i64,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// An inbox entry for one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub member_id: String,
    /// Machine-readable category, e.g. `consultation_started`.
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read_at: Option<String>,
    pub created_at: String,
}

/// Fields for a new notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub member_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

/// A stored audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    /// Member that performed the action; `None` for anonymous or system actions.
    pub actor_id: Option<String>,
    /// Dotted action name, e.g. `prescription.sent`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub created_at: String,
}

/// A registered WebAuthn credential.
///
/// Only identifiers and the browser-supplied public key are kept; assertion
/// verification happens client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passkey {
    pub credential_id: String,
    pub member_id: String,
    pub label: Option<String>,
    pub public_key: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::Patient, Role::Provider, Role::Pharmacy, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!(
            "doctor".parse::<Role>(),
            Err(UnknownVariant("doctor".to_string()))
        );
    }

    #[test]
    fn test_status_serde_matches_storage() {
        let json = serde_json::to_string(&ConsultationStatus::InProgress).unwrap();
        assert_eq!(json, format!("\"{}\"", ConsultationStatus::InProgress.as_str()));

        let status: PrescriptionStatus = serde_json::from_str("\"filled\"").unwrap();
        assert_eq!(status, PrescriptionStatus::Filled);
    }

    #[test]
    fn test_consultation_open_states() {
        assert!(ConsultationStatus::Scheduled.is_open());
        assert!(ConsultationStatus::InProgress.is_open());
        assert!(!ConsultationStatus::Completed.is_open());
        assert!(!ConsultationStatus::Cancelled.is_open());
    }

    #[test]
    fn test_member_label_prefers_display_name() {
        let mut member = Member {
            id: "m1".to_string(),
            email: "jane@example.com".to_string(),
            role: Role::Provider,
            display_name: None,
            npi: None,
            npi_verified: false,
            fax_number: None,
            created_at: "2025-01-01T00:00:00.000Z".to_string(),
        };
        assert_eq!(member.label(), "jane@example.com");

        member.display_name = Some("Dr. Jane".to_string());
        assert_eq!(member.label(), "Dr. Jane");
    }

    #[test]
    fn test_is_participant() {
        let consultation = Consultation {
            id: "c1".to_string(),
            patient_id: "p1".to_string(),
            provider_id: Some("d1".to_string()),
            intake_id: None,
            reason: "rash".to_string(),
            scheduled_at: "2025-01-01T10:00:00.000Z".to_string(),
            status: ConsultationStatus::Scheduled,
            room_name: None,
            room_url: None,
            notes: None,
            created_at: "2025-01-01T00:00:00.000Z".to_string(),
            updated_at: "2025-01-01T00:00:00.000Z".to_string(),
        };
        assert!(consultation.is_participant("p1"));
        assert!(consultation.is_participant("d1"));
        assert!(!consultation.is_participant("x"));
    }
}
