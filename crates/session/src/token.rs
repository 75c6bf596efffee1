//! Access-credential issuance client.
//!
//! Connecting requires a short-lived token from an external service; the
//! request/response shapes here are that service's contract. Failure here
//! aborts `connect()`; it is the one collaborator error that surfaces.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use banter_config::TokenServiceSettings;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Request(String),
    #[error("token service returned status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub room_name: String,
    pub participant_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub token: String,
    pub server_url: String,
}

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, request: TokenRequest) -> Result<TokenGrant, TokenError>;
}

pub struct HttpTokenIssuer {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTokenIssuer {
    pub fn new(settings: &TokenServiceSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: settings.url.clone(),
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, request: TokenRequest) -> Result<TokenGrant, TokenError> {
        debug!(url = %self.url, room = %request.room_name, "requesting access token");
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenError::Status(response.status().as_u16()));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))
    }
}
