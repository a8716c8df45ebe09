//! Video room provisioning.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{authorize, check_status, decode, endpoint, IntegrationError};
use crate::config::ServiceConfig;

const SERVICE: &str = "video";

/// A provisioned video room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRoom {
    /// Room name as known to the video service.
    pub name: String,
    /// URL participants open to join.
    pub url: String,
}

/// Creates video rooms for consultations.
#[async_trait]
pub trait VideoRooms: Send + Sync {
    /// Create a room that stops accepting participants at `expires_at`.
    async fn create_room(
        &self,
        name: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<VideoRoom, IntegrationError>;
}

/// Video service client over HTTP.
pub struct HttpVideoRooms {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpVideoRooms {
    pub fn new(client: reqwest::Client, config: ServiceConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl VideoRooms for HttpVideoRooms {
    async fn create_room(
        &self,
        name: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<VideoRoom, IntegrationError> {
        if !self.config.is_configured() {
            return Err(IntegrationError::NotConfigured(SERVICE));
        }

        let body = json!({
            "name": name,
            "privacy": "private",
            "properties": {
                "exp": expires_at.timestamp(),
                "enable_chat": true,
            }
        });
        let request = self.client.post(endpoint(&self.config, "/rooms")).json(&body);
        let response = authorize(request, &self.config).send().await?;
        let response = check_status(SERVICE, response).await?;
        let room: VideoRoom = decode(SERVICE, response).await?;

        tracing::info!(room = %room.name, "Video room created");
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_decodes_ignoring_extra_fields() {
        let room: VideoRoom = serde_json::from_str(
            r#"{"id": "abc", "name": "consult-1", "url": "https://example.daily.co/consult-1", "privacy": "private"}"#,
        )
        .unwrap();
        assert_eq!(room.name, "consult-1");
        assert_eq!(room.url, "https://example.daily.co/consult-1");
    }

    #[tokio::test]
    async fn test_unconfigured_video() {
        let video = HttpVideoRooms::new(reqwest::Client::new(), ServiceConfig::default());
        let result = video.create_room("consult-1", Utc::now()).await;
        assert!(matches!(result, Err(IntegrationError::NotConfigured("video"))));
    }
}
