//! Fax delivery for prescriptions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{authorize, check_status, decode, endpoint, IntegrationError};
use crate::config::ServiceConfig;

const SERVICE: &str = "fax";

/// Acknowledgement returned by the fax service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaxReceipt {
    /// Service-side identifier of the queued fax.
    pub id: String,
}

/// Sends documents by fax.
#[async_trait]
pub trait FaxSender: Send + Sync {
    /// Queue `html` for delivery to the fax number `to`.
    async fn send_fax(&self, to: &str, html: &str) -> Result<FaxReceipt, IntegrationError>;
}

/// Fax service client over HTTP. The configured `option` is the sender number.
pub struct HttpFaxSender {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpFaxSender {
    pub fn new(client: reqwest::Client, config: ServiceConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl FaxSender for HttpFaxSender {
    async fn send_fax(&self, to: &str, html: &str) -> Result<FaxReceipt, IntegrationError> {
        if !self.config.is_configured() {
            return Err(IntegrationError::NotConfigured(SERVICE));
        }

        let body = json!({
            "to": to,
            "from": self.config.option,
            "content_type": "text/html",
            "content": html,
        });
        let request = self.client.post(endpoint(&self.config, "/faxes")).json(&body);
        let response = authorize(request, &self.config).send().await?;
        let response = check_status(SERVICE, response).await?;
        let receipt: FaxReceipt = decode(SERVICE, response).await?;

        tracing::info!(fax_id = %receipt.id, "Fax queued");
        Ok(receipt)
    }
}
