//! Intake form API handlers.

use axum::{extract::State, http::StatusCode};
use portal::integrations::Completion;
use serde::Deserialize;
use serde_json::json;

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::models::{Intake, IntakeStatus, NewIntake, Role};
use crate::repo::{AuditEntry, IntakeFilter, IntakeRepo};
use crate::AppState;

use super::{audit, notice, notify};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a clinical assistant. Summarize the patient \
intake below for the reviewing provider in at most five sentences. Mention allergies and \
current medications explicitly. Do not make a diagnosis.";

/// Query parameters for listing intakes.
#[derive(Debug, Default, Deserialize)]
pub struct IntakeQuery {
    pub patient_id: Option<String>,
    pub status: Option<IntakeStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Load an intake the member may see.
///
/// Patients only see their own; another patient's intake reads as missing.
fn visible_intake(state: &AppState, current: &CurrentMember, id: &str) -> Result<Intake, ApiError> {
    current.require(&[Role::Patient, Role::Provider, Role::Admin])?;
    let intake = IntakeRepo::new(state.db.clone())
        .get(id)?
        .filter(|i| current.role() != Role::Patient || i.patient_id == current.id())
        .ok_or_else(|| ApiError::NotFound("intake not found".into()))?;
    Ok(intake)
}

fn summary_prompt(intake: &Intake) -> String {
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "not provided".into());
    format!(
        "Chief complaint: {}\nSymptoms: {}\nCurrent medications: {}\nAllergies: {}\nMedical history: {}",
        intake.chief_complaint,
        field(&intake.symptoms),
        field(&intake.medications),
        field(&intake.allergies),
        field(&intake.medical_history),
    )
}

/// Submit an intake form.
///
/// # Endpoint
///
/// `POST /api/intakes` (patients)
pub async fn create_intake(
    State(state): State<AppState>,
    current: CurrentMember,
    Json(new): Json<NewIntake>,
) -> Result<(StatusCode, Json<Intake>), ApiError> {
    current.require(&[Role::Patient])?;

    let intake = IntakeRepo::new(state.db.clone()).create(current.id(), new)?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "intake.created", "intake", Some(&intake.id)),
    )?;
    Ok((StatusCode::CREATED, Json(intake)))
}

/// List intakes, newest first.
///
/// # Endpoint
///
/// `GET /api/intakes`
///
/// Patients always get their own intakes; providers and admins may filter by
/// patient and status.
pub async fn list_intakes(
    State(state): State<AppState>,
    current: CurrentMember,
    Query(query): Query<IntakeQuery>,
) -> Result<Json<Vec<Intake>>, ApiError> {
    current.require(&[Role::Patient, Role::Provider, Role::Admin])?;

    let patient_id = match current.role() {
        Role::Patient => Some(current.id().to_string()),
        _ => query.patient_id,
    };
    let intakes = IntakeRepo::new(state.db.clone()).list(IntakeFilter {
        patient_id,
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(Json(intakes))
}

/// `GET /api/intakes/:id`
pub async fn get_intake(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Intake>, ApiError> {
    Ok(Json(visible_intake(&state, &current, &id)?))
}

/// Mark an intake reviewed and let the patient know.
///
/// # Endpoint
///
/// `POST /api/intakes/:id/review` (providers)
pub async fn review_intake(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Intake>, ApiError> {
    current.require(&[Role::Provider])?;
    visible_intake(&state, &current, &id)?;

    let intake = IntakeRepo::new(state.db.clone()).set_status(&id, IntakeStatus::Reviewed)?;
    notify(
        &state,
        notice(
            &intake.patient_id,
            "intake_reviewed",
            "Your intake was reviewed",
            format!(
                "{} reviewed your intake about \"{}\".",
                current.member.label(),
                intake.chief_complaint
            ),
            Some("/dashboard".to_string()),
        ),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "intake.reviewed", "intake", Some(&id)),
    )?;
    Ok(Json(intake))
}

/// Generate and store a clinical summary of an intake.
///
/// # Endpoint
///
/// `POST /api/intakes/:id/summary` (providers)
///
/// # Response
///
/// - `200 OK`: the intake with its new summary
/// - `502 Bad Gateway`: the completion service failed
pub async fn summarize_intake(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Intake>, ApiError> {
    current.require(&[Role::Provider])?;
    let intake = visible_intake(&state, &current, &id)?;

    let summary = state
        .integrations
        .completion
        .complete(SUMMARY_SYSTEM_PROMPT, &summary_prompt(&intake))
        .await?;
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(ApiError::Upstream("completion returned no text".into()));
    }

    let intake = IntakeRepo::new(state.db.clone()).set_summary(&id, summary)?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "intake.summarized", "intake", Some(&id))
            .with_detail(json!({ "chars": summary.len() })),
    )?;
    Ok(Json(intake))
}
