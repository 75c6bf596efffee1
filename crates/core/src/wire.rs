//! Data-channel wire envelope.
//!
//! This is the bit-exact contract peer implementations must match:
//! `{"type", "id", "userId", "userName", "content", "timestamp", "metadata"?}`
//! encoded as UTF-8 JSON, with `timestamp` in epoch milliseconds and
//! `metadata` omitted entirely when absent.

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireKind {
    Message,
    Bot,
    System,
    Typing,
}

impl From<MessageKind> for WireKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::User => WireKind::Message,
            MessageKind::Bot => WireKind::Bot,
            MessageKind::System => WireKind::System,
            MessageKind::Typing => WireKind::Typing,
        }
    }
}

impl From<WireKind> for MessageKind {
    fn from(kind: WireKind) -> Self {
        match kind {
            WireKind::Message => MessageKind::User,
            WireKind::Bot => MessageKind::Bot,
            WireKind::System => MessageKind::System,
            WireKind::Typing => MessageKind::Typing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    #[serde(rename = "type")]
    pub kind: WireKind,
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WireEnvelope {
    pub fn from_message(msg: &ChatMessage) -> Self {
        Self {
            kind: msg.kind.into(),
            id: msg.id.clone(),
            user_id: msg.sender_id.clone(),
            user_name: msg.sender_name.clone(),
            content: msg.content.clone(),
            timestamp: msg.timestamp,
            metadata: None,
        }
    }

    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            sender_id: self.user_id,
            sender_name: self.user_name,
            content: self.content,
            timestamp: self.timestamp,
            kind: self.kind.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
