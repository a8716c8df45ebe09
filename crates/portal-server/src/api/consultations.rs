//! Consultation API handlers.

use axum::{extract::State, http::StatusCode};
use chrono::{Duration, Utc};
use portal::integrations::VideoRooms;
use serde::Deserialize;
use serde_json::json;

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::models::{Consultation, ConsultationStatus, NewConsultation, Role};
use crate::repo::{AuditEntry, ConsultationFilter, ConsultationRepo};
use crate::AppState;

use super::{audit, notice, notify};

/// How long a provisioned video room stays open.
const ROOM_LIFETIME_HOURS: i64 = 2;

/// Query parameters for listing consultations.
#[derive(Debug, Default, Deserialize)]
pub struct ConsultationQuery {
    pub status: Option<ConsultationStatus>,
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    /// Only consultations no provider has picked up.
    #[serde(default)]
    pub unassigned: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Load a consultation the member may see.
///
/// Patients see only their own consultations; providers and admins see all.
fn visible(
    state: &AppState,
    current: &CurrentMember,
    id: &str,
) -> Result<Consultation, ApiError> {
    current.require(&[Role::Patient, Role::Provider, Role::Admin])?;
    ConsultationRepo::new(state.db.clone())
        .get(id)?
        .filter(|c| current.role() != Role::Patient || c.patient_id == current.id())
        .ok_or_else(|| ApiError::NotFound("consultation not found".into()))
}

/// Fail unless `current` is the provider assigned to `consultation`.
fn require_assigned(current: &CurrentMember, consultation: &Consultation) -> Result<(), ApiError> {
    current.require(&[Role::Provider])?;
    if consultation.provider_id.as_deref() == Some(current.id()) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Request a consultation.
///
/// # Endpoint
///
/// `POST /api/consultations` (patients)
pub async fn create_consultation(
    State(state): State<AppState>,
    current: CurrentMember,
    Json(new): Json<NewConsultation>,
) -> Result<(StatusCode, Json<Consultation>), ApiError> {
    current.require(&[Role::Patient])?;

    let consultation = ConsultationRepo::new(state.db.clone()).create(current.id(), new)?;
    audit(
        &state,
        AuditEntry::new(
            Some(current.id()),
            "consultation.created",
            "consultation",
            Some(&consultation.id),
        )
        .with_detail(json!({ "scheduled_at": consultation.scheduled_at })),
    )?;
    Ok((StatusCode::CREATED, Json(consultation)))
}

/// List consultations by schedule.
///
/// # Endpoint
///
/// `GET /api/consultations`
///
/// Patients always get their own consultations. Providers and admins may
/// filter; `?unassigned=true` lists the open queue.
pub async fn list_consultations(
    State(state): State<AppState>,
    current: CurrentMember,
    Query(query): Query<ConsultationQuery>,
) -> Result<Json<Vec<Consultation>>, ApiError> {
    current.require(&[Role::Patient, Role::Provider, Role::Admin])?;

    let patient_id = match current.role() {
        Role::Patient => Some(current.id().to_string()),
        _ => query.patient_id,
    };
    let consultations = ConsultationRepo::new(state.db.clone()).list(ConsultationFilter {
        patient_id,
        provider_id: query.provider_id,
        status: query.status,
        unassigned: query.unassigned,
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(Json(consultations))
}

/// `GET /api/consultations/:id`
pub async fn get_consultation(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    Ok(Json(visible(&state, &current, &id)?))
}

/// Take a scheduled consultation.
///
/// # Endpoint
///
/// `POST /api/consultations/:id/assign` (providers)
pub async fn assign_consultation(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    current.require(&[Role::Provider])?;
    let existing = visible(&state, &current, &id)?;
    if existing
        .provider_id
        .as_deref()
        .is_some_and(|provider| provider != current.id())
    {
        return Err(ApiError::Conflict(
            "consultation is assigned to another provider".into(),
        ));
    }

    let consultation = ConsultationRepo::new(state.db.clone()).assign(&id, current.id())?;
    notify(
        &state,
        notice(
            &consultation.patient_id,
            "consultation_assigned",
            "A provider accepted your visit",
            format!(
                "{} will see you at {}.",
                current.member.label(),
                consultation.scheduled_at
            ),
            Some("/dashboard".to_string()),
        ),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "consultation.assigned", "consultation", Some(&id)),
    )?;
    Ok(Json(consultation))
}

/// Open the video room and start the visit.
///
/// # Endpoint
///
/// `POST /api/consultations/:id/start` (assigned provider)
///
/// # Response
///
/// - `200 OK`: the consultation with its room URL; the patient is notified
/// - `409 Conflict`: the consultation is not scheduled
/// - `502 Bad Gateway`: the video service failed
pub async fn start_consultation(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    let existing = visible(&state, &current, &id)?;
    require_assigned(&current, &existing)?;
    if existing.status != ConsultationStatus::Scheduled {
        return Err(ApiError::Conflict(format!(
            "consultation is {}",
            existing.status.as_str()
        )));
    }

    let room_name = format!("consult-{id}");
    let expires_at = Utc::now() + Duration::hours(ROOM_LIFETIME_HOURS);
    let room = state
        .integrations
        .video
        .create_room(&room_name, expires_at)
        .await?;

    let consultation = ConsultationRepo::new(state.db.clone()).start(&id, &room.name, &room.url)?;
    notify(
        &state,
        notice(
            &consultation.patient_id,
            "consultation_started",
            "Your visit has started",
            format!("{} is waiting in the video room.", current.member.label()),
            Some(room.url.clone()),
        ),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "consultation.started", "consultation", Some(&id))
            .with_detail(json!({ "room": room.name })),
    )?;
    Ok(Json(consultation))
}

/// Finish the visit.
///
/// # Endpoint
///
/// `POST /api/consultations/:id/complete` (assigned provider), optional
/// body `{notes}`.
pub async fn complete_consultation(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
    body: Option<Json<CompleteRequest>>,
) -> Result<Json<Consultation>, ApiError> {
    let existing = visible(&state, &current, &id)?;
    require_assigned(&current, &existing)?;

    let notes = body.and_then(|Json(req)| req.notes);
    let notes = notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let consultation = ConsultationRepo::new(state.db.clone()).complete(&id, notes)?;
    notify(
        &state,
        notice(
            &consultation.patient_id,
            "consultation_completed",
            "Your visit is complete",
            "Any prescriptions from this visit will appear on your dashboard.",
            Some("/dashboard".to_string()),
        ),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "consultation.completed", "consultation", Some(&id)),
    )?;
    Ok(Json(consultation))
}

/// Cancel a consultation that has not finished.
///
/// # Endpoint
///
/// `POST /api/consultations/:id/cancel` (participants and admins)
pub async fn cancel_consultation(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Consultation>, ApiError> {
    let existing = visible(&state, &current, &id)?;
    if current.role() != Role::Admin && !existing.is_participant(current.id()) {
        return Err(ApiError::Forbidden);
    }

    let consultation = ConsultationRepo::new(state.db.clone()).cancel(&id)?;
    let others = std::iter::once(consultation.patient_id.as_str())
        .chain(consultation.provider_id.as_deref())
        .filter(|member_id| *member_id != current.id());
    for member_id in others {
        notify(
            &state,
            notice(
                member_id,
                "consultation_cancelled",
                "A visit was cancelled",
                format!(
                    "The visit scheduled for {} was cancelled by {}.",
                    consultation.scheduled_at,
                    current.member.label()
                ),
                Some("/dashboard".to_string()),
            ),
        )?;
    }
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "consultation.cancelled", "consultation", Some(&id)),
    )?;
    Ok(Json(consultation))
}
