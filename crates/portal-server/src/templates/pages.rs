//! Page templates and the view rows they display.

use askama::Template;

/// Sign-in page: request a code, then verify it.
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub code_length: usize,
    pub ttl_minutes: u64,
}

/// One line in a dashboard section.
#[derive(Debug, Clone)]
pub struct DashboardRow {
    pub title: String,
    pub detail: String,
    pub status: String,
    pub link: Option<String>,
}

/// A titled list on the dashboard.
#[derive(Debug, Clone)]
pub struct DashboardSection {
    pub title: String,
    /// Shown when `rows` is empty.
    pub empty_text: String,
    pub rows: Vec<DashboardRow>,
}

/// Role-specific landing page.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub member_label: String,
    pub role: String,
    pub unread: i64,
    pub sections: Vec<DashboardSection>,
    pub show_audit_link: bool,
    /// Session token used by the page script to subscribe over `/ws`.
    pub ws_token: String,
}

#[derive(Debug, Clone)]
pub struct AuditRow {
    pub created_at: String,
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub detail: String,
}

/// Admin audit table.
#[derive(Template)]
#[template(path = "audit.html")]
pub struct AuditTemplate {
    pub entries: Vec<AuditRow>,
}
