//! Server-rendered pages.
//!
//! Pages read the session from the `portal_session` cookie. Without one they
//! redirect to the sign-in page instead of answering 401.

use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};

use crate::auth::CurrentMember;
use crate::error::ApiError;
use crate::models::{ConsultationStatus, Role};
use crate::repo::{
    AuditFilter, AuditRepo, ConsultationFilter, ConsultationRepo, IntakeFilter, IntakeRepo,
    MemberRepo, NotificationRepo, PrescriptionFilter, PrescriptionRepo,
};
use crate::templates::{
    AuditRow, AuditTemplate, DashboardRow, DashboardSection, DashboardTemplate, LoginTemplate,
};
use crate::AppState;

const AUDIT_PAGE_SIZE: i64 = 200;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(login_page))
        .route("/dashboard", get(dashboard))
        .route("/admin/audit", get(audit_page))
}

async fn login_page(
    State(state): State<AppState>,
    current: Option<CurrentMember>,
) -> Result<Response, ApiError> {
    if current.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let settings = &state.config.magic_link;
    let html = LoginTemplate {
        code_length: settings.code_length,
        ttl_minutes: settings.code_ttl_minutes,
    }
    .render()?;
    Ok(Html(html).into_response())
}

async fn dashboard(
    State(state): State<AppState>,
    current: Option<CurrentMember>,
) -> Result<Response, ApiError> {
    let Some(current) = current else {
        return Ok(Redirect::to("/").into_response());
    };

    let sections = match current.role() {
        Role::Patient => patient_sections(&state, current.id())?,
        Role::Provider => provider_sections(&state, current.id())?,
        Role::Pharmacy => pharmacy_sections(&state, current.id())?,
        Role::Admin => admin_sections(&state)?,
    };
    let unread = NotificationRepo::new(state.db.clone()).unread_count(current.id())?;

    let html = DashboardTemplate {
        member_label: current.member.label().to_string(),
        role: current.role().as_str().to_string(),
        unread,
        sections,
        show_audit_link: current.role() == Role::Admin,
        ws_token: current.token.clone(),
    }
    .render()?;
    Ok(Html(html).into_response())
}

async fn audit_page(
    State(state): State<AppState>,
    current: Option<CurrentMember>,
) -> Result<Response, ApiError> {
    let Some(current) = current else {
        return Ok(Redirect::to("/").into_response());
    };
    if current.role() != Role::Admin {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let entries = AuditRepo::new(state.db.clone())
        .list(AuditFilter {
            limit: Some(AUDIT_PAGE_SIZE),
            ..Default::default()
        })?
        .into_iter()
        .map(|entry| AuditRow {
            created_at: entry.created_at,
            actor: entry.actor_id.unwrap_or_else(|| "system".to_string()),
            entity: match entry.entity_id {
                Some(id) => format!("{} {id}", entry.entity_type),
                None => entry.entity_type,
            },
            action: entry.action,
            detail: entry.detail.map(|d| d.to_string()).unwrap_or_default(),
        })
        .collect();

    Ok(Html(AuditTemplate { entries }.render()?).into_response())
}

fn section(title: &str, empty_text: &str, rows: Vec<DashboardRow>) -> DashboardSection {
    DashboardSection {
        title: title.to_string(),
        empty_text: empty_text.to_string(),
        rows,
    }
}

fn consultation_rows(
    state: &AppState,
    filter: ConsultationFilter,
) -> Result<Vec<DashboardRow>, ApiError> {
    Ok(ConsultationRepo::new(state.db.clone())
        .list(filter)?
        .into_iter()
        .filter(|c| c.status.is_open())
        .map(|c| DashboardRow {
            title: c.reason,
            detail: c.scheduled_at,
            status: c.status.as_str().to_string(),
            link: c.room_url,
        })
        .collect())
}

fn prescription_rows(
    state: &AppState,
    filter: PrescriptionFilter,
) -> Result<Vec<DashboardRow>, ApiError> {
    Ok(PrescriptionRepo::new(state.db.clone())
        .list(filter)?
        .into_iter()
        .map(|rx| DashboardRow {
            title: rx.medication,
            detail: format!("{}, qty {}, {} refills", rx.dosage, rx.quantity, rx.refills),
            status: rx.status.as_str().to_string(),
            link: None,
        })
        .collect())
}

fn patient_sections(
    state: &AppState,
    member_id: &str,
) -> Result<Vec<DashboardSection>, ApiError> {
    let intakes = IntakeRepo::new(state.db.clone())
        .list(IntakeFilter {
            patient_id: Some(member_id.to_string()),
            ..Default::default()
        })?
        .into_iter()
        .map(|i| DashboardRow {
            title: i.chief_complaint,
            detail: i.created_at,
            status: i.status.as_str().to_string(),
            link: None,
        })
        .collect();
    let consultations = consultation_rows(
        state,
        ConsultationFilter {
            patient_id: Some(member_id.to_string()),
            ..Default::default()
        },
    )?;
    let prescriptions = prescription_rows(
        state,
        PrescriptionFilter {
            patient_id: Some(member_id.to_string()),
            ..Default::default()
        },
    )?;

    Ok(vec![
        section("Intakes", "No intakes submitted.", intakes),
        section("Upcoming consultations", "No consultations scheduled.", consultations),
        section("Prescriptions", "No prescriptions yet.", prescriptions),
    ])
}

fn provider_sections(
    state: &AppState,
    member_id: &str,
) -> Result<Vec<DashboardSection>, ApiError> {
    let mine = consultation_rows(
        state,
        ConsultationFilter {
            provider_id: Some(member_id.to_string()),
            ..Default::default()
        },
    )?;
    let unassigned = consultation_rows(
        state,
        ConsultationFilter {
            unassigned: true,
            status: Some(ConsultationStatus::Scheduled),
            ..Default::default()
        },
    )?;

    Ok(vec![
        section("My consultations", "Nothing scheduled.", mine),
        section("Waiting for a provider", "No open requests.", unassigned),
    ])
}

fn pharmacy_sections(
    state: &AppState,
    member_id: &str,
) -> Result<Vec<DashboardSection>, ApiError> {
    let incoming = prescription_rows(
        state,
        PrescriptionFilter {
            pharmacy_id: Some(member_id.to_string()),
            ..Default::default()
        },
    )?;
    Ok(vec![section(
        "Incoming prescriptions",
        "No prescriptions received.",
        incoming,
    )])
}

fn admin_sections(state: &AppState) -> Result<Vec<DashboardSection>, ApiError> {
    let members = MemberRepo::new(state.db.clone())
        .list_by_role(None)?
        .into_iter()
        .map(|m| DashboardRow {
            title: m.label().to_string(),
            detail: m.email,
            status: m.role.as_str().to_string(),
            link: None,
        })
        .collect();
    Ok(vec![section("Members", "No members.", members)])
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::test_support::TestApp;
    use axum::http::{header, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::json;

    async fn body(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_login_page() {
        let app = TestApp::new();
        let (status, html) = app.get_text("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Sign in"));
        assert!(html.contains("/api/auth/magic-link"));
    }

    #[tokio::test]
    async fn test_signed_in_login_goes_to_dashboard() {
        let app = TestApp::new();
        let (_, token) = app.sign_in("p@example.com", Role::Patient);
        let response = app.get_page("/", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");
    }

    #[tokio::test]
    async fn test_pages_redirect_without_session() {
        let app = TestApp::new();
        for uri in ["/dashboard", "/admin/audit"] {
            let response = app.get_page(uri, None).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/");
        }
        let response = app.get_page("/dashboard", Some("bogus")).await;
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn test_patient_dashboard() {
        let app = TestApp::new();
        let (_, token) = app.sign_in("p@example.com", Role::Patient);
        app.post(
            "/api/intakes",
            Some(&token),
            json!({ "chief_complaint": "Persistent cough" }),
        )
        .await;

        let response = app.get_page("/dashboard", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body(response).await;
        assert!(html.contains("Persistent cough"));
        assert!(html.contains("No consultations scheduled."));
        assert!(html.contains("No prescriptions yet."));
        assert!(!html.contains("/admin/audit"));
    }

    #[tokio::test]
    async fn test_provider_sees_open_requests() {
        let app = TestApp::new();
        let (_, patient) = app.sign_in("p@example.com", Role::Patient);
        let (_, provider) = app.sign_in("dr@example.com", Role::Provider);
        app.post(
            "/api/consultations",
            Some(&patient),
            json!({ "reason": "Rash on arm", "scheduled_at": "2099-01-01T10:00:00Z" }),
        )
        .await;

        let html = body(app.get_page("/dashboard", Some(&provider)).await).await;
        assert!(html.contains("Waiting for a provider"));
        assert!(html.contains("Rash on arm"));
    }

    #[tokio::test]
    async fn test_audit_page_admin_only() {
        let app = TestApp::new();
        let (_, admin) = app.sign_in("admin@example.com", Role::Admin);
        let (_, patient) = app.sign_in("p@example.com", Role::Patient);
        app.patch("/api/me", Some(&patient), json!({ "display_name": "Pat" }))
            .await;

        let response = app.get_page("/admin/audit", Some(&patient)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");

        let response = app.get_page("/admin/audit", Some(&admin)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(response).await.contains("member.updated"));

        let html = body(app.get_page("/dashboard", Some(&admin)).await).await;
        assert!(html.contains("/admin/audit"));
        assert!(html.contains("p@example.com"));
    }
}
