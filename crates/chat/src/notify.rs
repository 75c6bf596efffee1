//! Out-of-band message notification webhook.
//!
//! A second delivery path alongside the data-channel publish, used for
//! consumers outside the room (push digests, logs). Strictly best-effort:
//! the primary send never blocks on it and never learns whether it worked.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use banter_config::NotifySettings;
use banter_core::WireKind;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize)]
pub struct MessageNotification {
    pub author: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: WireKind,
    pub room: String,
    pub timestamp: i64,
}

#[async_trait]
pub trait MessageNotifier: Send + Sync {
    async fn notify(&self, notification: MessageNotification) -> anyhow::Result<()>;
}

pub struct HttpMessageNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpMessageNotifier {
    /// `None` when no webhook is configured; the notify path is then
    /// skipped entirely.
    pub fn from_settings(settings: &NotifySettings) -> Option<Self> {
        settings.url.as_ref().map(|url| Self {
            client: reqwest::Client::new(),
            url: url.clone(),
        })
    }
}

#[async_trait]
impl MessageNotifier for HttpMessageNotifier {
    async fn notify(&self, notification: MessageNotification) -> anyhow::Result<()> {
        // Response body and status are ignored by contract; errors only
        // reach the debug log of the spawned task.
        self.client
            .post(&self.url)
            .timeout(NOTIFY_TIMEOUT)
            .json(&notification)
            .send()
            .await?;
        debug!(room = %notification.room, "message notification delivered");
        Ok(())
    }
}
