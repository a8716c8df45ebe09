//! Shared setup for handler tests: an in-memory app with recording fakes in
//! place of the outbound integrations.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use portal::config::PortalConfig;
use portal::integrations::{
    Completion, Email, FaxReceipt, FaxSender, IntegrationError, Integrations, Mailer,
    ProviderRegistry, RegistryRecord, VideoRoom, VideoRooms,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use crate::models::{Member, Role};
use crate::repo::{fixtures, SessionRepo};
use crate::AppState;

#[derive(Default)]
pub struct FakeRegistry {
    pub record: Mutex<Option<RegistryRecord>>,
    pub lookups: Mutex<Vec<String>>,
}

#[async_trait]
impl ProviderRegistry for FakeRegistry {
    async fn lookup_npi(&self, npi: &str) -> Result<Option<RegistryRecord>, IntegrationError> {
        self.lookups.lock().unwrap().push(npi.to_string());
        Ok(self.record.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeVideo {
    pub rooms: Mutex<Vec<String>>,
}

#[async_trait]
impl VideoRooms for FakeVideo {
    async fn create_room(
        &self,
        name: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<VideoRoom, IntegrationError> {
        self.rooms.lock().unwrap().push(name.to_string());
        Ok(VideoRoom {
            name: name.to_string(),
            url: format!("https://video.test/{name}"),
        })
    }
}

#[derive(Default)]
pub struct FakeCompletion {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Completion for FakeCompletion {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, IntegrationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Patient reports a three-day cough.".to_string())
    }
}

#[derive(Default)]
pub struct FakeFax {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl FaxSender for FakeFax {
    async fn send_fax(&self, to: &str, html: &str) -> Result<FaxReceipt, IntegrationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IntegrationError::Status {
                service: "fax",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), html.to_string()));
        Ok(FaxReceipt {
            id: format!("fax-{}", sent.len()),
        })
    }
}

#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<Email>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: Email) -> Result<(), IntegrationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IntegrationError::Status {
                service: "email",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[derive(Default)]
pub struct Fakes {
    pub registry: Arc<FakeRegistry>,
    pub video: Arc<FakeVideo>,
    pub completion: Arc<FakeCompletion>,
    pub fax: Arc<FakeFax>,
    pub mailer: Arc<FakeMailer>,
}

impl Fakes {
    /// The sign-in code from the most recent email.
    pub fn last_code(&self) -> String {
        let sent = self.mailer.sent.lock().unwrap();
        let email = sent.last().expect("No email sent");
        email
            .html
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| part.len() == 6)
            .expect("No code in email")
            .to_string()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub fakes: Fakes,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(PortalConfig::default())
    }

    pub fn with_config(config: PortalConfig) -> Self {
        let fakes = Fakes::default();
        let integrations = Integrations {
            registry: fakes.registry.clone(),
            video: fakes.video.clone(),
            completion: fakes.completion.clone(),
            fax: fakes.fax.clone(),
            mailer: fakes.mailer.clone(),
        };
        let state = AppState::new(fixtures::db(), Arc::new(config), integrations);
        Self { state, fakes }
    }

    /// Create a member with a live session, bypassing the magic-link flow.
    pub fn sign_in(&self, email: &str, role: Role) -> (Member, String) {
        let member = fixtures::member(&self.state.db, email, role);
        let session = SessionRepo::new(self.state.db.clone())
            .create(&member.id, Duration::from_secs(3600), Utc::now())
            .expect("Failed to create session");
        (member, session.token)
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        crate::app(self.state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        Self::json(self.send("GET", uri, token, None).await).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        Self::json(self.send("POST", uri, token, Some(body)).await).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        Self::json(self.send("PATCH", uri, token, Some(body)).await).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        Self::json(self.send("DELETE", uri, token, None).await).await
    }

    /// Fetch a page or plain-text route with an optional session cookie.
    pub async fn get_page(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("cookie", format!("portal_session={token}"));
        }
        crate::app(self.state.clone())
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self.get_page(uri, None).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Audit actions recorded so far, newest first.
    pub fn audit_actions(&self) -> Vec<String> {
        crate::repo::AuditRepo::new(self.state.db.clone())
            .list(Default::default())
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }
}
