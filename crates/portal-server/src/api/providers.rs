//! Provider registry verification.

use axum::extract::State;
use portal::integrations::{ProviderRegistry, RegistryRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::extract::Json;
use crate::models::{Member, Role};
use crate::repo::{AuditEntry, MemberRepo};
use crate::AppState;

use super::audit;

#[derive(Debug, Deserialize)]
pub struct NpiRequest {
    pub npi: String,
}

#[derive(Debug, Serialize)]
pub struct NpiResponse {
    pub member: Member,
    /// The registry entry, when one was found.
    pub record: Option<RegistryRecord>,
}

/// NPIs are exactly ten digits.
fn parse_npi(npi: &str) -> Result<String, ApiError> {
    let npi = npi.trim();
    if npi.len() == 10 && npi.chars().all(|c| c.is_ascii_digit()) {
        Ok(npi.to_string())
    } else {
        Err(ApiError::BadRequest("npi must be 10 digits".into()))
    }
}

/// Look up an NPI and store it on the member.
///
/// # Endpoint
///
/// `POST /api/providers/npi` (providers and pharmacies)
///
/// # Response
///
/// - `200 OK`: the member with `npi_verified` set when the registry has an
///   active record, plus the record itself
/// - `400 Bad Request`: malformed NPI
/// - `502 Bad Gateway`: the registry failed
pub async fn verify_npi(
    State(state): State<AppState>,
    current: CurrentMember,
    Json(req): Json<NpiRequest>,
) -> Result<Json<NpiResponse>, ApiError> {
    current.require(&[Role::Provider, Role::Pharmacy])?;
    let npi = parse_npi(&req.npi)?;

    let record = state.integrations.registry.lookup_npi(&npi).await?;
    let verified = record.as_ref().is_some_and(|r| r.active);

    let member = MemberRepo::new(state.db.clone()).set_npi(current.id(), &npi, verified)?;
    audit(
        &state,
        AuditEntry::new(Some(current.id()), "member.npi_checked", "member", Some(current.id()))
            .with_detail(json!({ "npi": npi, "verified": verified })),
    )?;
    tracing::info!(member_id = %member.id, %npi, verified, "NPI checked");

    Ok(Json(NpiResponse { member, record }))
}
