//! Ordered, de-duplicated chat over the session's data path.
//!
//! Messages ride the reliable path, typing signals the unreliable one,
//! matching their consistency needs: losing a message is unacceptable,
//! losing a typing signal is invisible because it self-expires.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use banter_config::{ChatSettings, Settings};
use banter_core::{ChatMessage, MessageKind, WireEnvelope, WireKind, epoch_millis};
use banter_session::{ConnectionState, RoomEvent, RoomSessionController, SessionError};

use crate::notify::{HttpMessageNotifier, MessageNotification, MessageNotifier};
use crate::typing::TypingTracker;

/// Guard that aborts a spawned task when dropped.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to encode message envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Publish(#[from] SessionError),
}

/// Typed notification for newly retained history entries. Typing never
/// appears here; it is transient signaling, not history.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    UserMessage(ChatMessage),
    BotMessage(ChatMessage),
    SystemMessage(ChatMessage),
}

struct History {
    entries: VecDeque<ChatMessage>,
    /// Ids currently retained, kept in sync with `entries` on truncation.
    ids: HashSet<String>,
}

pub struct ChatMessageChannel {
    controller: Arc<RoomSessionController>,
    settings: ChatSettings,
    room_name: String,
    local_name: String,
    history: Mutex<History>,
    typing: TypingTracker,
    notifier: Option<Arc<dyn MessageNotifier>>,
    events_tx: broadcast::Sender<ChatEvent>,
    attach_task: Mutex<Option<AbortOnDrop>>,
}

impl ChatMessageChannel {
    pub fn new(controller: Arc<RoomSessionController>, settings: &Settings) -> Arc<Self> {
        let notifier = HttpMessageNotifier::from_settings(&settings.notify)
            .map(|n| Arc::new(n) as Arc<dyn MessageNotifier>);
        Self::with_notifier(controller, settings, notifier)
    }

    pub fn with_notifier(
        controller: Arc<RoomSessionController>,
        settings: &Settings,
        notifier: Option<Arc<dyn MessageNotifier>>,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            controller,
            settings: settings.chat.clone(),
            room_name: settings.room.name.clone(),
            local_name: settings.room.participant_name.clone(),
            history: Mutex::new(History {
                entries: VecDeque::new(),
                ids: HashSet::new(),
            }),
            typing: TypingTracker::new(Duration::from_millis(settings.chat.typing_ttl_ms)),
            notifier,
            events_tx,
            attach_task: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events_tx.subscribe()
    }

    /// Wires the channel to the controller's event stream: inbound data
    /// payloads flow through ingestion, and join/leave become local system
    /// annotations. Idempotent.
    pub fn attach(self: &Arc<Self>) {
        let mut guard = self.attach_task.lock();
        if guard.is_some() {
            return;
        }

        let chat = Arc::clone(self);
        let mut rx = self.controller.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(RoomEvent::DataReceived { payload, sender }) => {
                        chat.ingest(&payload, &sender);
                    }
                    Ok(RoomEvent::ParticipantConnected { display_name, .. }) => {
                        chat.add_local_system_message(format!("{display_name} joined"));
                    }
                    Ok(RoomEvent::ParticipantDisconnected { display_name, .. }) => {
                        if !display_name.is_empty() {
                            chat.add_local_system_message(format!("{display_name} left"));
                        }
                    }
                    Ok(RoomEvent::StateChanged(ConnectionState::Disconnected)) => {
                        chat.typing.clear();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "chat fell behind the room event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *guard = Some(AbortOnDrop(handle));
    }

    /// Handles one inbound data payload. Malformed payloads are dropped
    /// silently; a peer can never crash the channel.
    pub fn ingest(&self, payload: &[u8], sender: &str) {
        let envelope = match WireEnvelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(%sender, %err, "dropping undecodable data payload");
                return;
            }
        };

        if envelope.kind == WireKind::Typing {
            // Self-typing is never reflected back.
            if self.controller.local_identity().as_deref() != Some(envelope.user_id.as_str()) {
                self.typing.signal(&envelope.user_id, &envelope.user_name);
            }
            return;
        }

        self.append_and_emit(envelope.into_message());
    }

    /// Sends a message as the local participant. The message lands in
    /// local history before publish. The reliable path never echoes our
    /// own messages back, so local echo is the only way the sender sees
    /// its own view.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Result<ChatMessage, ChatError> {
        let (sender_id, sender_name) = self.local_sender();
        self.send_as(sender_id, sender_name, content.into(), kind)
            .await
    }

    /// Sends with an explicit sender identity/name on the envelope, the
    /// path bot replies take.
    pub async fn send_as(
        &self,
        sender_id: String,
        sender_name: String,
        content: String,
        kind: MessageKind,
    ) -> Result<ChatMessage, ChatError> {
        let msg = ChatMessage {
            id: nanoid::nanoid!(),
            sender_id,
            sender_name,
            content,
            timestamp: epoch_millis(),
            kind,
        };

        self.append_and_emit(msg.clone());
        self.notify_out_of_band(&msg);

        let bytes = WireEnvelope::from_message(&msg).encode()?;
        self.controller.publish_data(bytes, true).await?;
        Ok(msg)
    }

    /// Publishes a typing signal over the unreliable path. Loss is
    /// inconsequential (the indicator self-expires), so failures only
    /// reach the debug log. Never echoed locally.
    pub async fn send_typing(&self) {
        let (sender_id, sender_name) = self.local_sender();
        let envelope = WireEnvelope {
            kind: WireKind::Typing,
            id: nanoid::nanoid!(),
            user_id: sender_id,
            user_name: sender_name,
            content: String::new(),
            timestamp: epoch_millis(),
            metadata: None,
        };
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(%err, "failed to encode typing signal");
                return;
            }
        };
        if let Err(err) = self.controller.publish_data(bytes, false).await {
            debug!(%err, "typing signal not published");
        }
    }

    /// Appends a purely local annotation (e.g. "X joined") that is never
    /// published to peers.
    pub fn add_local_system_message(&self, content: impl Into<String>) {
        let msg = ChatMessage {
            id: nanoid::nanoid!(),
            sender_id: "system".to_string(),
            sender_name: "System".to_string(),
            content: content.into(),
            timestamp: epoch_millis(),
            kind: MessageKind::System,
        };
        self.append_and_emit(msg);
    }

    /// The sender identity/name for locally-originated envelopes: the live
    /// session's local participant when connected, the configured name
    /// otherwise.
    fn local_sender(&self) -> (String, String) {
        match self.controller.local_identity() {
            Some(identity) => {
                let name = self
                    .controller
                    .participant(&identity)
                    .map(|p| p.display_name)
                    .unwrap_or_else(|| self.local_name.clone());
                (identity, name)
            }
            None => ("local".to_string(), self.local_name.clone()),
        }
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().entries.iter().cloned().collect()
    }

    /// The most recent `n` history entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ChatMessage> {
        let history = self.history.lock();
        let skip = history.entries.len().saturating_sub(n);
        history.entries.iter().skip(skip).cloned().collect()
    }

    /// Display names currently typing (lazily pruned; never includes the
    /// local participant).
    pub fn typing_participants(&self) -> Vec<String> {
        self.typing.active()
    }

    /// Dedup + append + truncate + notify. The single ingestion point for
    /// both local echo and remote payloads.
    fn append_and_emit(&self, msg: ChatMessage) {
        if msg.kind == MessageKind::Typing {
            return;
        }

        {
            let mut history = self.history.lock();
            if !history.ids.insert(msg.id.clone()) {
                debug!(id = %msg.id, "duplicate message dropped on ingestion");
                return;
            }
            history.entries.push_back(msg.clone());
            while history.entries.len() > self.settings.history_limit {
                if let Some(oldest) = history.entries.pop_front() {
                    history.ids.remove(&oldest.id);
                }
            }
        }

        let event = match msg.kind {
            MessageKind::User => ChatEvent::UserMessage(msg),
            MessageKind::Bot => ChatEvent::BotMessage(msg),
            MessageKind::System => ChatEvent::SystemMessage(msg),
            MessageKind::Typing => unreachable!("typing filtered above"),
        };
        let _ = self.events_tx.send(event);
    }

    /// Fires the out-of-band notification without ever blocking or failing
    /// the primary send.
    fn notify_out_of_band(&self, msg: &ChatMessage) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let notification = MessageNotification {
            author: msg.sender_name.clone(),
            content: msg.content.clone(),
            kind: msg.kind.into(),
            room: self.room_name.clone(),
            timestamp: msg.timestamp,
        };
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(notification).await {
                debug!(%err, "message notification failed");
            }
        });
    }
}
