//! Magic-link sign-in.
//!
//! `POST /api/auth/magic-link` emails a short numeric code; `POST
//! /api/auth/verify` exchanges it for a session. Both are rate-limited per
//! email address.

use askama::Template;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use portal::codes::{generate_code, normalize_email};
use portal::config::{MAGIC_LINK_BUCKET, VERIFY_BUCKET};
use portal::integrations::{Email, Mailer};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{clear_session_cookie, session_cookie, CurrentMember};
use crate::error::ApiError;
use crate::extract::Json;
use crate::models::{Member, Role};
use crate::repo::{
    AuditEntry, MagicCodeRepo, MemberRepo, RateLimit, RateLimitRepo, SessionRepo, VerifyOutcome,
};
use crate::templates::MagicLinkEmailTemplate;
use crate::AppState;

use super::audit;

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
    /// Role for a first sign-in. Ignored for existing members.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub token: String,
    pub member: Member,
}

/// Count a hit against `bucket` for `key`.
fn check_limit(state: &AppState, bucket: &str, key: &str) -> Result<(), ApiError> {
    if let Some(limit) = state.config.rate_limit(bucket) {
        RateLimitRepo::new(state.db.clone()).hit(
            &format!("{bucket}:{key}"),
            RateLimit::from(limit),
            Utc::now(),
        )?;
    }
    Ok(())
}

fn parse_email(email: &str) -> Result<String, ApiError> {
    normalize_email(email).ok_or_else(|| ApiError::BadRequest("invalid email address".into()))
}

/// Email a sign-in code.
///
/// # Endpoint
///
/// `POST /api/auth/magic-link`
///
/// # Response
///
/// - `202 Accepted`: code issued and handed to the mail service
/// - `400 Bad Request`: malformed email
/// - `429 Too Many Requests`: too many codes requested for this email
/// - `502 Bad Gateway`: the mail service failed
pub async fn request_magic_link(
    State(state): State<AppState>,
    Json(req): Json<MagicLinkRequest>,
) -> Result<Response, ApiError> {
    let email = parse_email(&req.email)?;
    check_limit(&state, MAGIC_LINK_BUCKET, &email)?;

    let settings = &state.config.magic_link;
    let code = generate_code(settings.code_length);
    let html = MagicLinkEmailTemplate {
        code: code.clone(),
        ttl_minutes: settings.code_ttl_minutes,
        login_url: format!("{}/", state.config.server.public_url.trim_end_matches('/')),
    }
    .render()?;

    // The code only becomes usable once the mail service has accepted it.
    let sent = state
        .integrations
        .mailer
        .send(Email {
            to: email.clone(),
            subject: "Your sign-in code".to_string(),
            html,
        })
        .await;
    if let Err(err) = sent {
        audit(
            &state,
            AuditEntry::new(None, "auth.code_email_failed", "member", None)
                .with_detail(json!({ "email": email })),
        )?;
        return Err(err.into());
    }

    MagicCodeRepo::new(state.db.clone()).issue(&email, &code, settings.code_ttl(), Utc::now())?;

    audit(
        &state,
        AuditEntry::new(None, "auth.code_requested", "member", None)
            .with_detail(json!({ "email": email })),
    )?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "sent" }))).into_response())
}

/// Exchange a sign-in code for a session.
///
/// # Endpoint
///
/// `POST /api/auth/verify`
///
/// # Response
///
/// - `200 OK`: `{token, member}` and a `portal_session` cookie
/// - `400 Bad Request`: malformed email, expired code or an `admin` role request
/// - `401 Unauthorized`: wrong or already used code
/// - `429 Too Many Requests`: rate limit or attempt limit reached
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Response, ApiError> {
    let email = parse_email(&req.email)?;
    if req.role == Some(Role::Admin) {
        return Err(ApiError::BadRequest(
            "admin accounts cannot be self-registered".into(),
        ));
    }
    check_limit(&state, VERIFY_BUCKET, &email)?;

    let now = Utc::now();
    let outcome = MagicCodeRepo::new(state.db.clone()).verify(
        &email,
        &req.code,
        state.config.magic_link.max_attempts,
        now,
    )?;
    match outcome {
        VerifyOutcome::Verified => {}
        VerifyOutcome::Invalid => return Err(ApiError::InvalidCode),
        VerifyOutcome::Expired => return Err(ApiError::CodeExpired),
        VerifyOutcome::TooManyAttempts => return Err(ApiError::TooManyAttempts),
    }

    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let member = MemberRepo::new(state.db.clone()).upsert_by_email(
        &email,
        req.role.unwrap_or(Role::Patient),
        display_name,
    )?;

    let ttl = state.config.server.session_ttl();
    let session = SessionRepo::new(state.db.clone()).create(&member.id, ttl, now)?;

    audit(
        &state,
        AuditEntry::new(Some(&member.id), "auth.signed_in", "member", Some(&member.id)),
    )?;
    tracing::info!(member_id = %member.id, role = member.role.as_str(), "Member signed in");

    let cookie = session_cookie(&session.token, ttl);
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(VerifyResponse {
            token: session.token,
            member,
        }),
    )
        .into_response())
}

/// End the current session.
///
/// # Endpoint
///
/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentMember,
) -> Result<Response, ApiError> {
    SessionRepo::new(state.db.clone()).revoke(&current.token)?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "auth.signed_out", "member", Some(current.id())),
    )?;

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie())],
    )
        .into_response())
}
