//! API handlers for the portal server.

pub mod admin;
pub mod auth;
pub mod consultations;
pub mod intakes;
pub mod me;
pub mod notifications;
pub mod passkeys;
pub mod prescriptions;
pub mod providers;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::error::ApiError;
use crate::models::{NewNotification, Notification};
use crate::repo::{AuditEntry, AuditRepo, NotificationRepo};
use crate::{ws, AppState};

/// Routes mounted under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/magic-link", post(auth::request_magic_link))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/logout", post(auth::logout))
        .route("/me", get(me::get_me).patch(me::update_me))
        .route(
            "/intakes",
            get(intakes::list_intakes).post(intakes::create_intake),
        )
        .route("/intakes/:id", get(intakes::get_intake))
        .route("/intakes/:id/review", post(intakes::review_intake))
        .route("/intakes/:id/summary", post(intakes::summarize_intake))
        .route(
            "/consultations",
            get(consultations::list_consultations).post(consultations::create_consultation),
        )
        .route("/consultations/:id", get(consultations::get_consultation))
        .route(
            "/consultations/:id/assign",
            post(consultations::assign_consultation),
        )
        .route(
            "/consultations/:id/start",
            post(consultations::start_consultation),
        )
        .route(
            "/consultations/:id/complete",
            post(consultations::complete_consultation),
        )
        .route(
            "/consultations/:id/cancel",
            post(consultations::cancel_consultation),
        )
        .route(
            "/prescriptions",
            get(prescriptions::list_prescriptions).post(prescriptions::create_prescription),
        )
        .route("/prescriptions/:id", get(prescriptions::get_prescription))
        .route(
            "/prescriptions/:id/send",
            post(prescriptions::send_prescription),
        )
        .route(
            "/prescriptions/:id/fill",
            post(prescriptions::fill_prescription),
        )
        .route(
            "/prescriptions/:id/cancel",
            post(prescriptions::cancel_prescription),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/read-all",
            post(notifications::mark_all_read),
        )
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/providers/npi", post(providers::verify_npi))
        .route(
            "/passkeys",
            get(passkeys::list_passkeys).post(passkeys::register_passkey),
        )
        .route("/passkeys/:id", delete(passkeys::remove_passkey))
        .route("/admin/audit", get(admin::list_audit))
        .route("/admin/members", get(admin::list_members))
}

/// Append an audit entry for a mutation.
pub(crate) fn audit(state: &AppState, entry: AuditEntry) -> Result<(), ApiError> {
    tracing::info!(
        actor_id = entry.actor_id.as_deref().unwrap_or("-"),
        action = %entry.action,
        entity_type = %entry.entity_type,
        entity_id = entry.entity_id.as_deref().unwrap_or("-"),
        "Audit"
    );
    AuditRepo::new(state.db.clone()).record(entry)?;
    Ok(())
}

/// Store a notification and push it to the recipient's open sockets.
pub(crate) fn notify(state: &AppState, new: NewNotification) -> Result<Notification, ApiError> {
    let notification = NotificationRepo::new(state.db.clone()).create(new)?;
    ws::publish(&state.ws_broadcast, &notification);
    Ok(notification)
}

/// Build a notification for `member_id`.
pub(crate) fn notice(
    member_id: &str,
    kind: &str,
    title: impl Into<String>,
    body: impl Into<String>,
    link: Option<String>,
) -> NewNotification {
    NewNotification {
        member_id: member_id.to_string(),
        kind: kind.to_string(),
        title: title.into(),
        body: body.into(),
        link,
    }
}
