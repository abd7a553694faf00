//! Completion service clients

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::RepairSettings;
use crate::error::RepairError;

const API_VERSION: &str = "2023-06-01";

/// A single-turn text completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `system` and `user` messages and return the reply text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, RepairError>;
}

/// Messages-style JSON API over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    http: reqwest::Client,
    settings: RepairSettings,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl HttpCompletionClient {
    pub fn new(settings: RepairSettings, api_key: impl Into<String>) -> Result<Self, RepairError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            settings,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RepairError> {
        let body = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });
        tracing::debug!(endpoint = %self.settings.endpoint, model = %self.settings.model, "requesting completion");

        let response = self
            .http
            .post(&self.settings.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RepairError::ServiceStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        extract_text(&text)
    }
}

/// Concatenate the text blocks of a messages response.
fn extract_text(raw: &str) -> Result<String, RepairError> {
    let parsed: MessagesResponse = serde_json::from_str(raw)?;
    let text: String = parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return Err(RepairError::EmptyResponse);
    }
    Ok(text)
}
