//! LLM completion against an OpenAI-compatible chat endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{authorize, check_status, decode, endpoint, IntegrationError};
use crate::config::ServiceConfig;

const SERVICE: &str = "llm";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Single-shot text completion.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Complete `prompt` under the `system` instruction and return the text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, IntegrationError>;
}

/// Chat-completions client over HTTP. The configured `option` is the model.
pub struct HttpCompletion {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpCompletion {
    pub fn new(client: reqwest::Client, config: ServiceConfig) -> Self {
        Self { client, config }
    }

    fn model(&self) -> &str {
        self.config.option.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn first_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl Completion for HttpCompletion {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, IntegrationError> {
        if !self.config.is_configured() {
            return Err(IntegrationError::NotConfigured(SERVICE));
        }

        let body = json!({
            "model": self.model(),
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.2,
        });
        let request = self
            .client
            .post(endpoint(&self.config, "/chat/completions"))
            .json(&body);
        let response = authorize(request, &self.config).send().await?;
        let response = check_status(SERVICE, response).await?;
        let chat: ChatResponse = decode(SERVICE, response).await?;

        chat.first_content().ok_or(IntegrationError::Decode {
            service: SERVICE,
            detail: "no completion choices".to_string(),
        })
    }
}
