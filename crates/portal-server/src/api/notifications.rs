//! Notification inbox API handlers.

use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::models::Notification;
use crate::repo::{AuditEntry, NotificationRepo};
use crate::AppState;

use super::audit;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    /// Only unread notifications.
    #[serde(default)]
    pub unread: bool,
    pub limit: Option<i64>,
}

/// `GET /api/notifications?unread=true`
pub async fn list_notifications(
    State(state): State<AppState>,
    current: CurrentMember,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications =
        NotificationRepo::new(state.db.clone()).list(current.id(), query.unread, query.limit)?;
    Ok(Json(notifications))
}

/// `POST /api/notifications/:id/read`
pub async fn mark_read(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let notification = NotificationRepo::new(state.db.clone()).mark_read(&id, current.id())?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "notification.read", "notification", Some(&id)),
    )?;
    Ok(Json(notification))
}

/// `POST /api/notifications/read-all`
pub async fn mark_all_read(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<Value>, ApiError> {
    let updated = NotificationRepo::new(state.db.clone()).mark_all_read(current.id())?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "notification.read_all", "member", Some(current.id()))
            .with_detail(json!({ "updated": updated })),
    )?;
    Ok(Json(json!({ "updated": updated })))
}
