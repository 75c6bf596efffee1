use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Bot,
    System,
    /// Transient signaling only; never retained in history.
    Typing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender-assigned, globally unique.
    pub id: String,
    pub sender_id: ParticipantId,
    pub sender_name: String,
    /// Raw content; may itself encode a structured payload (opaque here).
    pub content: String,
    /// Sender-assigned epoch milliseconds. Monotonicity across participants
    /// is not guaranteed.
    pub timestamp: i64,
    pub kind: MessageKind,
}
