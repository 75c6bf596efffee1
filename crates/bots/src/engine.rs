//! Decides, per outgoing user message, whether and which bot replies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use banter_chat::{ChatEvent, ChatMessageChannel};
use banter_config::Settings;
use banter_core::{BotConfig, ChatMessage, MessageKind};
use banter_session::{ConnectionState, RoomEvent, RoomSessionController};

use crate::generator::{FALLBACK_REPLY, GenerationRequest, ReplyGenerator};
use crate::probability::{
    HistoryFeatures, calculate_interjection_probability, draw, is_addressed,
};

/// How much history rides along on a generation request.
const RECENT_WINDOW: usize = 12;

/// Guard that aborts a spawned task when dropped.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct BotRuntime {
    config: BotConfig,
    /// Cooldown bookkeeping; cleared when the owning session tears down.
    last_responded: Option<Instant>,
}

impl BotRuntime {
    fn on_cooldown(&self, cooldown: Duration) -> bool {
        self.last_responded
            .is_some_and(|at| at.elapsed() < cooldown)
    }
}

pub struct BotInterjectionEngine {
    bots: RwLock<Vec<BotRuntime>>,
    chat: Arc<ChatMessageChannel>,
    controller: Arc<RoomSessionController>,
    generator: Arc<dyn ReplyGenerator>,
    cooldown: Duration,
    attach_task: Mutex<Option<AbortOnDrop>>,
}

impl BotInterjectionEngine {
    pub fn new(
        chat: Arc<ChatMessageChannel>,
        controller: Arc<RoomSessionController>,
        generator: Arc<dyn ReplyGenerator>,
        settings: &Settings,
    ) -> Arc<Self> {
        let bots = settings
            .bots
            .roster
            .iter()
            .cloned()
            .map(|config| BotRuntime {
                config,
                last_responded: None,
            })
            .collect();
        Arc::new(Self {
            bots: RwLock::new(bots),
            chat,
            controller,
            generator,
            cooldown: Duration::from_millis(settings.bots.cooldown_ms),
            attach_task: Mutex::new(None),
        })
    }

    /// Externally toggles a bot. Returns whether the name was known.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut bots = self.bots.write();
        match bots.iter_mut().find(|b| b.config.name == name) {
            Some(bot) => {
                bot.config.enabled = enabled;
                info!(bot = %name, enabled, "bot toggled");
                true
            }
            None => false,
        }
    }

    /// Forgets every cooldown; they belonged to the torn-down session.
    pub fn clear_cooldowns(&self) {
        for bot in self.bots.write().iter_mut() {
            bot.last_responded = None;
        }
    }

    /// Wires the engine to the conversation: outgoing user messages (the
    /// local sender's only) run through `evaluate`, and a disconnect
    /// clears cooldown state. Idempotent.
    pub fn attach(self: &Arc<Self>) {
        let mut guard = self.attach_task.lock();
        if guard.is_some() {
            return;
        }

        let engine = Arc::clone(self);
        let mut chat_rx = self.chat.subscribe();
        let mut room_rx = self.controller.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    chat_event = chat_rx.recv() => match chat_event {
                        Ok(ChatEvent::UserMessage(msg)) => {
                            let local = engine.controller.local_identity();
                            if local.as_deref() == Some(msg.sender_id.as_str()) {
                                engine.evaluate(&msg).await;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "bot engine fell behind the chat stream");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    room_event = room_rx.recv() => match room_event {
                        Ok(RoomEvent::StateChanged(ConnectionState::Disconnected)) => {
                            engine.clear_cooldowns();
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "bot engine fell behind the room stream");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        *guard = Some(AbortOnDrop(handle));
    }

    /// Runs the decision for one user message and, when a bot is selected,
    /// publishes its reply through the ordinary chat send path. Returns
    /// the sent reply, if any.
    pub async fn evaluate(&self, message: &ChatMessage) -> Option<ChatMessage> {
        if message.kind != MessageKind::User {
            return None;
        }

        let participant_count = self.controller.participant_count().max(1);
        let recent = self.chat.recent(RECENT_WINDOW);
        let features = HistoryFeatures::derive(&recent, message);

        let selected = self.select_responder(message, participant_count, &features)?;

        // Suspension point: the session that prompted this reply may be
        // torn down while we wait for text.
        let epoch = self.controller.session_epoch();

        let request = GenerationRequest {
            recent_messages: recent,
            current_message: message.clone(),
            bot_config: selected.clone(),
        };
        let reply = match self.generator.generate(request).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!(bot = %selected.name, "empty generation result, using fallback");
                FALLBACK_REPLY.to_string()
            }
            Err(err) => {
                warn!(bot = %selected.name, %err, "reply generation failed, using fallback");
                FALLBACK_REPLY.to_string()
            }
        };

        if self.controller.session_epoch() != epoch {
            debug!(bot = %selected.name, "discarding reply for superseded session");
            return None;
        }

        match self
            .chat
            .send_as(
                selected.identity(),
                selected.name.clone(),
                reply,
                MessageKind::Bot,
            )
            .await
        {
            Ok(sent) => Some(sent),
            Err(err) => {
                warn!(bot = %selected.name, %err, "failed to publish bot reply");
                None
            }
        }
    }

    /// Picks the responding bot, if any, and stamps its cooldown. An
    /// addressed bot responds with certainty; otherwise each bot gets an
    /// independent draw against the pure probability model. A bot still
    /// cooling down never responds, addressed or not.
    fn select_responder(
        &self,
        message: &ChatMessage,
        participant_count: usize,
        features: &HistoryFeatures,
    ) -> Option<BotConfig> {
        let mut bots = self.bots.write();

        let index = bots
            .iter()
            .position(|bot| {
                bot.config.enabled
                    && !bot.on_cooldown(self.cooldown)
                    && is_addressed(&bot.config, &message.content)
            })
            .or_else(|| {
                bots.iter().position(|bot| {
                    if !bot.config.enabled || bot.on_cooldown(self.cooldown) {
                        return false;
                    }
                    let p = calculate_interjection_probability(
                        &bot.config,
                        participant_count,
                        features,
                    );
                    p > 0.0 && draw(p)
                })
            })?;

        bots[index].last_responded = Some(Instant::now());
        debug!(bot = %bots[index].config.name, "bot selected to respond");
        Some(bots[index].config.clone())
    }
}
