//! Current member profile.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::Json;
use crate::models::Member;
use crate::repo::{AuditEntry, MemberRepo, NotificationRepo};
use crate::AppState;

use super::audit;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub member: Member,
    pub unread_notifications: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub fax_number: Option<String>,
}

/// `GET /api/me`
pub async fn get_me(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<MeResponse>, ApiError> {
    let unread_notifications = NotificationRepo::new(state.db.clone()).unread_count(current.id())?;
    Ok(Json(MeResponse {
        member: current.member,
        unread_notifications,
    }))
}

/// `PATCH /api/me`
///
/// Only fields present in the body change.
pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentMember,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Member>, ApiError> {
    let trimmed = |value: &Option<String>| value.as_deref().map(str::trim).map(str::to_string);
    let display_name = trimmed(&update.display_name);
    let fax_number = trimmed(&update.fax_number);

    let member = MemberRepo::new(state.db.clone()).update_profile(
        current.id(),
        display_name.as_deref(),
        fax_number.as_deref(),
    )?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "member.updated", "member", Some(current.id())),
    )?;
    Ok(Json(member))
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_me() {
        let app = TestApp::new();
        let (member, token) = app.sign_in("p@example.com", Role::Patient);

        let (status, body) = app.get("/api/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["member"]["id"], member.id.as_str());
        assert_eq!(body["unread_notifications"], 0);
    }

    #[tokio::test]
    async fn test_update_me_partial() {
        let app = TestApp::new();
        let (_, token) = app.sign_in("rx@example.com", Role::Pharmacy);

        let (status, body) = app
            .patch(
                "/api/me",
                Some(&token),
                json!({ "display_name": " Corner Pharmacy ", "fax_number": "+15550100" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_name"], "Corner Pharmacy");

        let (_, body) = app
            .patch("/api/me", Some(&token), json!({ "display_name": "Corner Rx" }))
            .await;
        assert_eq!(body["display_name"], "Corner Rx");
        assert_eq!(body["fax_number"], "+15550100");
        assert_eq!(app.audit_actions(), vec!["member.updated", "member.updated"]);
    }
}
