//! Passkey registry handlers.
//!
//! The browser runs the WebAuthn ceremony and keeps the private key; the
//! server only records which credential IDs belong to which member.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::models::Passkey;
use crate::repo::{AuditEntry, PasskeyRepo};
use crate::AppState;

use super::audit;

#[derive(Debug, Deserialize)]
pub struct RegisterPasskey {
    /// Base64url credential ID from the authenticator.
    pub credential_id: String,
    /// Base64 public key as exported by the browser.
    pub public_key: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// `GET /api/passkeys`
pub async fn list_passkeys(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Json<Vec<Passkey>>, ApiError> {
    Ok(Json(PasskeyRepo::new(state.db.clone()).list(current.id())?))
}

/// `POST /api/passkeys`
pub async fn register_passkey(
    State(state): State<AppState>,
    current: CurrentMember,
    Json(req): Json<RegisterPasskey>,
) -> Result<(StatusCode, Json<Passkey>), ApiError> {
    let label = req.label.as_deref().map(str::trim).filter(|l| !l.is_empty());
    let passkey = PasskeyRepo::new(state.db.clone()).register(
        current.id(),
        req.credential_id.trim(),
        req.public_key.trim(),
        label,
    )?;
    audit(
        &state,
        AuditEntry::new(
            Some(current.id()),
            "passkey.registered",
            "passkey",
            Some(&passkey.credential_id),
        ),
    )?;
    Ok((StatusCode::CREATED, Json(passkey)))
}

/// `DELETE /api/passkeys/:id`
pub async fn remove_passkey(
    State(state): State<AppState>,
    current: CurrentMember,
    Path(credential_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    PasskeyRepo::new(state.db.clone()).remove(current.id(), &credential_id)?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "passkey.removed", "passkey", Some(&credential_id)),
    )?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_list_remove() {
        let app = TestApp::new();
        let (_, token) = app.sign_in("p@example.com", Role::Patient);

        let (status, body) = app
            .post(
                "/api/passkeys",
                Some(&token),
                json!({ "credential_id": "cred-abc", "public_key": "pk", "label": "Phone" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["label"], "Phone");

        let (_, list) = app.get("/api/passkeys", Some(&token)).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _) = app.delete("/api/passkeys/cred-abc", Some(&token)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, list) = app.get("/api/passkeys", Some(&token)).await;
        assert!(list.as_array().unwrap().is_empty());
        assert_eq!(
            app.audit_actions(),
            vec!["passkey.removed", "passkey.registered"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_and_foreign_credentials() {
        let app = TestApp::new();
        let (_, alice) = app.sign_in("alice@example.com", Role::Patient);
        let (_, bob) = app.sign_in("bob@example.com", Role::Patient);
        let body = json!({ "credential_id": "cred-1", "public_key": "pk" });

        assert_eq!(
            app.post("/api/passkeys", Some(&alice), body.clone()).await.0,
            StatusCode::CREATED
        );
        assert_eq!(
            app.post("/api/passkeys", Some(&bob), body).await.0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            app.delete("/api/passkeys/cred-1", Some(&bob)).await.0,
            StatusCode::NOT_FOUND
        );
    }
}
