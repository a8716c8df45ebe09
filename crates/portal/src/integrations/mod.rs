//! Outbound integrations.
//!
//! Every integration is one authenticated request/response against a
//! third-party API. Each sits behind a small async trait so handlers can be
//! exercised against in-process fakes; the `Http*` types are the real
//! `reqwest` implementations.

pub mod email;
pub mod fax;
pub mod llm;
pub mod registry;
pub mod video;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{IntegrationsConfig, ServiceConfig};

pub use email::{Email, HttpMailer, LogMailer, Mailer};
pub use fax::{FaxReceipt, FaxSender, HttpFaxSender};
pub use llm::{Completion, HttpCompletion};
pub use registry::{HttpProviderRegistry, ProviderRegistry, RegistryRecord};
pub use video::{HttpVideoRooms, VideoRoom, VideoRooms};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors raised by outbound integrations.
#[derive(Error, Debug)]
pub enum IntegrationError {
    /// The request could not be sent or the connection failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Status {
        /// Which integration failed.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// The response body did not have the expected shape.
    #[error("Unexpected {service} response: {detail}")]
    Decode {
        /// Which integration failed.
        service: &'static str,
        /// What was wrong with the body.
        detail: String,
    },
    /// No base URL is configured for the service.
    #[error("{0} integration is not configured")]
    NotConfigured(&'static str),
}

/// Shared handles to every integration.
#[derive(Clone)]
pub struct Integrations {
    /// Provider registry lookups.
    pub registry: Arc<dyn ProviderRegistry>,
    /// Video room provisioning.
    pub video: Arc<dyn VideoRooms>,
    /// LLM completion.
    pub completion: Arc<dyn Completion>,
    /// Fax delivery.
    pub fax: Arc<dyn FaxSender>,
    /// Email delivery.
    pub mailer: Arc<dyn Mailer>,
}

impl Integrations {
    /// Build the HTTP implementations from configuration.
    ///
    /// When no email service is configured, outgoing mail is written to the
    /// log instead so local logins keep working.
    pub fn from_config(
        config: &IntegrationsConfig,
        from_address: &str,
    ) -> Result<Self, IntegrationError> {
        let client = http_client()?;

        let mailer: Arc<dyn Mailer> = if config.email.is_configured() {
            Arc::new(HttpMailer::new(
                client.clone(),
                config.email.clone(),
                from_address.to_string(),
            ))
        } else {
            tracing::warn!("No email service configured, emails will only be logged");
            Arc::new(LogMailer)
        };

        Ok(Self {
            registry: Arc::new(HttpProviderRegistry::new(
                client.clone(),
                config.registry.clone(),
            )),
            video: Arc::new(HttpVideoRooms::new(client.clone(), config.video.clone())),
            completion: Arc::new(HttpCompletion::new(client.clone(), config.llm.clone())),
            fax: Arc::new(HttpFaxSender::new(client, config.fax.clone())),
            mailer,
        })
    }
}

/// Build the shared `reqwest` client used by all integrations.
pub fn http_client() -> Result<reqwest::Client, IntegrationError> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("telehealth-portal/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Join a configured base URL and a path without doubling slashes.
pub(crate) fn endpoint(config: &ServiceConfig, path: &str) -> String {
    format!(
        "{}/{}",
        config.base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Attach the configured bearer token, if any.
pub(crate) fn authorize(
    request: reqwest::RequestBuilder,
    config: &ServiceConfig,
) -> reqwest::RequestBuilder {
    match &config.api_key {
        Some(key) if !key.is_empty() => request.bearer_auth(key),
        _ => request,
    }
}

/// Turn a non-success response into [`IntegrationError::Status`].
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    body.truncate(500);
    tracing::warn!(service, status = status.as_u16(), "Integration request failed");
    Err(IntegrationError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Decode a JSON body, mapping failures to [`IntegrationError::Decode`].
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T, IntegrationError> {
    response
        .json::<T>()
        .await
        .map_err(|e| IntegrationError::Decode {
            service,
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = ServiceConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            endpoint(&config, "/rooms"),
            "https://api.example.com/v1/rooms"
        );
        assert_eq!(
            endpoint(&config, "chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_from_config_defaults_build() {
        let integrations =
            Integrations::from_config(&IntegrationsConfig::default(), "portal@example.com");
        assert!(integrations.is_ok());
    }

    #[test]
    fn test_error_messages() {
        let err = IntegrationError::Status {
            service: "video",
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "video returned 401: unauthorized");
        assert_eq!(
            IntegrationError::NotConfigured("fax").to_string(),
            "fax integration is not configured"
        );
    }
}
