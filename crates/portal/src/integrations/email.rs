//! Transactional email.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{authorize, check_status, endpoint, IntegrationError};
use crate::config::ServiceConfig;

const SERVICE: &str = "email";

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Delivers email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), IntegrationError>;
}

/// Email API client over HTTP.
pub struct HttpMailer {
    client: reqwest::Client,
    config: ServiceConfig,
    from: String,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, config: ServiceConfig, from: String) -> Self {
        Self {
            client,
            config,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> Result<(), IntegrationError> {
        if !self.config.is_configured() {
            return Err(IntegrationError::NotConfigured(SERVICE));
        }

        let body = json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
        });
        let request = self.client.post(endpoint(&self.config, "/emails")).json(&body);
        let response = authorize(request, &self.config).send().await?;
        check_status(SERVICE, response).await?;

        tracing::debug!(subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Development mailer that writes emails to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), IntegrationError> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.html, "Email (not sent)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Email {
        Email {
            to: "alice@example.com".to_string(),
            subject: "Your sign-in code".to_string(),
            html: "<p>123456</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        assert!(LogMailer.send(sample()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unconfigured_http_mailer() {
        let mailer = HttpMailer::new(
            reqwest::Client::new(),
            ServiceConfig::default(),
            "portal@example.com".to_string(),
        );
        let result = mailer.send(sample()).await;
        assert!(matches!(result, Err(IntegrationError::NotConfigured("email"))));
    }
}
