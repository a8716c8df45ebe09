//! Admin-only API handlers.

use axum::extract::State;
use serde::Deserialize;

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::{Json, Query};
use crate::models::{AuditLog, Member, Role};
use crate::repo::{AuditFilter, AuditRepo, MemberRepo};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<AuditQuery> for AuditFilter {
    fn from(q: AuditQuery) -> Self {
        Self {
            actor_id: q.actor_id,
            action: q.action,
            entity_type: q.entity_type,
            entity_id: q.entity_id,
            limit: q.limit,
            offset: q.offset,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MemberQuery {
    pub role: Option<Role>,
}

/// `GET /api/admin/audit`
pub async fn list_audit(
    State(state): State<AppState>,
    current: CurrentMember,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    current.require(&[Role::Admin])?;
    Ok(Json(AuditRepo::new(state.db.clone()).list(query.into())?))
}

/// `GET /api/admin/members?role=`
pub async fn list_members(
    State(state): State<AppState>,
    current: CurrentMember,
    Query(query): Query<MemberQuery>,
) -> Result<Json<Vec<Member>>, ApiError> {
    current.require(&[Role::Admin])?;
    Ok(Json(MemberRepo::new(state.db.clone()).list_by_role(query.role)?))
}
