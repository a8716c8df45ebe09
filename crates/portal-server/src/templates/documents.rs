//! Documents sent through the outbound integrations.

use askama::Template;

use crate::models::{Member, Prescription};

/// Sign-in email carrying a one-time code.
#[derive(Template)]
#[template(path = "magic_link_email.html")]
pub struct MagicLinkEmailTemplate {
    /// The one-time code.
    pub code: String,
    /// Minutes until the code expires.
    pub ttl_minutes: u64,
    /// Login page the code is entered on.
    pub login_url: String,
}

/// Prescription faxed to a pharmacy.
#[derive(Template)]
#[template(path = "prescription_fax.html")]
pub struct PrescriptionFaxTemplate {
    pub prescription_id: String,
    pub medication: String,
    pub dosage: String,
    pub quantity: i64,
    pub refills: i64,
    pub instructions: Option<String>,
    pub patient_name: String,
    pub patient_email: String,
    pub provider_name: String,
    /// Prescriber NPI, shown only when the registry verified it.
    pub provider_npi: Option<String>,
    pub pharmacy_name: String,
    pub written_at: String,
}

impl PrescriptionFaxTemplate {
    #[must_use]
    pub fn new(rx: &Prescription, patient: &Member, provider: &Member, pharmacy: &Member) -> Self {
        Self {
            prescription_id: rx.id.clone(),
            medication: rx.medication.clone(),
            dosage: rx.dosage.clone(),
            quantity: rx.quantity,
            refills: rx.refills,
            instructions: rx.instructions.clone(),
            patient_name: patient.label().to_string(),
            patient_email: patient.email.clone(),
            provider_name: provider.label().to_string(),
            provider_npi: provider
                .npi
                .clone()
                .filter(|_| provider.npi_verified),
            pharmacy_name: pharmacy.label().to_string(),
            written_at: rx.created_at.clone(),
        }
    }
}
