//! Askama templates for outbound documents and server-rendered pages.
//!
//! Documents (the sign-in email and the prescription fax) are standalone
//! HTML; pages extend `base.html`.

pub mod documents;
pub mod pages;

pub use documents::{MagicLinkEmailTemplate, PrescriptionFaxTemplate};
pub use pages::{
    AuditRow, AuditTemplate, DashboardRow, DashboardSection, DashboardTemplate, LoginTemplate,
};
