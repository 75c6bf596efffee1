//! Reply-generation collaborator client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use banter_config::GenerationSettings;
use banter_core::{BotConfig, ChatMessage};

/// Substituted verbatim whenever the generation collaborator fails or
/// returns nothing usable; the channel never sees an error from this path.
pub const FALLBACK_REPLY: &str = "Sorry, I spaced out for a second. What were we saying?";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub recent_messages: Vec<ChatMessage>,
    pub current_message: ChatMessage,
    pub bot_config: BotConfig,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    text: String,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String>;
}

pub struct HttpReplyGenerator {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpReplyGenerator {
    pub fn new(settings: &GenerationSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: settings.url.clone(),
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String> {
        debug!(url = %self.url, bot = %request.bot_config.name, "requesting bot reply");
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: GenerationResponse = response.json().await?;
        Ok(body.text)
    }
}
