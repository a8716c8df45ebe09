//! Session authentication.
//!
//! A session token arrives either as `Authorization: Bearer <token>` (API
//! clients) or in the `portal_session` cookie (browser pages).

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use std::time::Duration;

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::{Member, Role};
use crate::repo::{MemberRepo, SessionRepo};
use crate::AppState;

/// Name of the browser session cookie.
pub const SESSION_COOKIE: &str = "portal_session";

/// The signed-in member making the request.
#[derive(Debug, Clone)]
pub struct CurrentMember {
    pub member: Member,
    /// Session token the request carried.
    pub token: String,
}

impl CurrentMember {
    pub fn id(&self) -> &str {
        &self.member.id
    }

    pub fn role(&self) -> Role {
        self.member.role
    }

    /// Fail with [`ApiError::Forbidden`] unless the member has one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.member.role) {
            Ok(())
        } else {
            tracing::debug!(
                member_id = %self.member.id,
                role = self.member.role.as_str(),
                "Role not permitted"
            );
            Err(ApiError::Forbidden)
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentMember {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = session_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        resolve(&state.db, &token)?.ok_or(ApiError::Unauthorized)
    }
}

/// Look up the member behind a session token, ignoring expired sessions.
pub fn resolve(db: &DbPool, token: &str) -> Result<Option<CurrentMember>, ApiError> {
    let Some(session) = SessionRepo::new(db.clone()).find_valid(token, Utc::now())? else {
        return Ok(None);
    };
    let member = MemberRepo::new(db.clone()).get(&session.member_id)?;
    Ok(member.map(|member| CurrentMember {
        member,
        token: session.token,
    }))
}

/// Extract the session token from the bearer header or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value that stores the session in the browser.
pub fn session_cookie(token: &str, ttl: Duration) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.as_secs()
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
