//! Prescription API handlers.

use askama::Template;
use axum::{extract::State, http::StatusCode};
use portal::integrations::FaxSender;
use serde::Deserialize;
use serde_json::json;

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::models::{Member, NewPrescription, Prescription, PrescriptionStatus, Role};
use crate::repo::{AuditEntry, ConsultationRepo, MemberRepo, PrescriptionFilter, PrescriptionRepo};
use crate::templates::PrescriptionFaxTemplate;
use crate::AppState;

use super::{audit, notice, notify};

/// Query parameters for listing prescriptions.
#[derive(Debug, Default, Deserialize)]
pub struct PrescriptionQuery {
    pub status: Option<PrescriptionStatus>,
    pub consultation_id: Option<String>,
    /// Admin-only filters; ignored for other roles.
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    pub pharmacy_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub pharmacy_id: String,
}

/// Whether `current` is a party to `rx`.
fn can_see(current: &CurrentMember, rx: &Prescription) -> bool {
    match current.role() {
        Role::Admin => true,
        Role::Patient => rx.patient_id == current.id(),
        Role::Provider => rx.provider_id == current.id(),
        Role::Pharmacy => rx.pharmacy_id.as_deref() == Some(current.id()),
    }
}

fn visible(state: &AppState, current: &CurrentMember, id: &str) -> Result<Prescription, ApiError> {
    PrescriptionRepo::new(state.db.clone())
        .get(id)?
        .filter(|rx| can_see(current, rx))
        .ok_or_else(|| ApiError::NotFound("prescription not found".into()))
}

fn member(state: &AppState, id: &str) -> Result<Member, ApiError> {
    MemberRepo::new(state.db.clone())
        .get(id)?
        .ok_or_else(|| ApiError::NotFound("member not found".into()))
}

/// Write a prescription for a consultation.
///
/// # Endpoint
///
/// `POST /api/prescriptions` (the consultation's provider)
pub async fn create_prescription(
    State(state): State<AppState>,
    current: CurrentMember,
    Json(new): Json<NewPrescription>,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    current.require(&[Role::Provider])?;
    let consultation = ConsultationRepo::new(state.db.clone())
        .get(&new.consultation_id)?
        .ok_or_else(|| ApiError::NotFound("consultation not found".into()))?;
    if consultation.provider_id.as_deref() != Some(current.id()) {
        return Err(ApiError::Forbidden);
    }

    let rx = PrescriptionRepo::new(state.db.clone()).create(new)?;
    notify(
        &state,
        notice(
            &rx.patient_id,
            "prescription_created",
            "New prescription",
            format!("{} prescribed {} ({}).", current.member.label(), rx.medication, rx.dosage),
            Some("/dashboard".to_string()),
        ),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "prescription.created", "prescription", Some(&rx.id))
            .with_detail(json!({ "consultation_id": rx.consultation_id })),
    )?;
    Ok((StatusCode::CREATED, Json(rx)))
}

/// List prescriptions, newest first.
///
/// # Endpoint
///
/// `GET /api/prescriptions`
///
/// Patients see their own, providers those they wrote and pharmacies those
/// sent to them. Admins may filter freely.
pub async fn list_prescriptions(
    State(state): State<AppState>,
    current: CurrentMember,
    Query(query): Query<PrescriptionQuery>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let me = Some(current.id().to_string());
    let mut filter = PrescriptionFilter {
        consultation_id: query.consultation_id,
        status: query.status,
        limit: query.limit,
        offset: query.offset,
        ..Default::default()
    };
    match current.role() {
        Role::Patient => filter.patient_id = me,
        Role::Provider => filter.provider_id = me,
        Role::Pharmacy => filter.pharmacy_id = me,
        Role::Admin => {
            filter.patient_id = query.patient_id;
            filter.provider_id = query.provider_id;
            filter.pharmacy_id = query.pharmacy_id;
        }
    }

    Ok(Json(PrescriptionRepo::new(state.db.clone()).list(filter)?))
}

/// `GET /api/prescriptions/:id`
pub async fn get_prescription(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Prescription>, ApiError> {
    Ok(Json(visible(&state, &current, &id)?))
}

/// Fax a pending prescription to a pharmacy.
///
/// # Endpoint
///
/// `POST /api/prescriptions/:id/send` (prescribing provider), body
/// `{pharmacy_id}`.
///
/// # Response
///
/// - `200 OK`: the sent prescription; pharmacy and patient are notified
/// - `400 Bad Request`: not a pharmacy, or the pharmacy has no fax number
/// - `409 Conflict`: the prescription is not pending
/// - `502 Bad Gateway`: the fax service failed; nothing is changed
pub async fn send_prescription(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Prescription>, ApiError> {
    current.require(&[Role::Provider])?;
    let rx = visible(&state, &current, &id)?;
    if rx.status != PrescriptionStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "prescription is {}",
            rx.status.as_str()
        )));
    }

    let pharmacy = MemberRepo::new(state.db.clone())
        .get(&req.pharmacy_id)?
        .filter(|m| m.role == Role::Pharmacy)
        .ok_or_else(|| ApiError::BadRequest("pharmacy_id is not a pharmacy".into()))?;
    let fax_number = pharmacy
        .fax_number
        .clone()
        .ok_or_else(|| ApiError::BadRequest("pharmacy has no fax number on file".into()))?;
    let patient = member(&state, &rx.patient_id)?;

    let html = PrescriptionFaxTemplate::new(&rx, &patient, &current.member, &pharmacy).render()?;
    let receipt = state.integrations.fax.send_fax(&fax_number, &html).await?;
    tracing::info!(prescription_id = %rx.id, fax_id = %receipt.id, "Prescription faxed");

    let rx = PrescriptionRepo::new(state.db.clone()).mark_sent(&id, &pharmacy.id, Some(&receipt.id))?;
    notify(
        &state,
        notice(
            &pharmacy.id,
            "prescription_received",
            "Incoming prescription",
            format!("{} for {} from {}.", rx.medication, patient.label(), current.member.label()),
            Some("/dashboard".to_string()),
        ),
    )?;
    notify(
        &state,
        notice(
            &rx.patient_id,
            "prescription_sent",
            "Prescription sent to pharmacy",
            format!("Your {} prescription was sent to {}.", rx.medication, pharmacy.label()),
            Some("/dashboard".to_string()),
        ),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "prescription.sent", "prescription", Some(&id))
            .with_detail(json!({ "pharmacy_id": pharmacy.id, "fax_id": receipt.id })),
    )?;
    Ok(Json(rx))
}

/// Mark a sent prescription as dispensed.
///
/// # Endpoint
///
/// `POST /api/prescriptions/:id/fill` (receiving pharmacy)
pub async fn fill_prescription(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Prescription>, ApiError> {
    current.require(&[Role::Pharmacy])?;
    visible(&state, &current, &id)?;

    let rx = PrescriptionRepo::new(state.db.clone()).mark_filled(&id)?;
    notify(
        &state,
        notice(
            &rx.patient_id,
            "prescription_filled",
            "Prescription ready",
            format!("Your {} is ready at {}.", rx.medication, current.member.label()),
            None,
        ),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "prescription.filled", "prescription", Some(&id)),
    )?;
    Ok(Json(rx))
}

/// Cancel a prescription that has not been filled.
///
/// # Endpoint
///
/// `POST /api/prescriptions/:id/cancel` (prescribing provider or admin)
pub async fn cancel_prescription(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Prescription>, ApiError> {
    current.require(&[Role::Provider, Role::Admin])?;
    visible(&state, &current, &id)?;

    let rx = PrescriptionRepo::new(state.db.clone()).cancel(&id)?;
    let recipients = std::iter::once(rx.patient_id.as_str()).chain(rx.pharmacy_id.as_deref());
    for member_id in recipients {
        notify(
            &state,
            notice(
                member_id,
                "prescription_cancelled",
                "Prescription cancelled",
                format!("The {} prescription was cancelled.", rx.medication),
                None,
            ),
        )?;
    }
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "prescription.cancelled", "prescription", Some(&id)),
    )?;
    Ok(Json(rx))
}
