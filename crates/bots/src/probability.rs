//! The interjection probability model.
//!
//! Pure functions only: the random draw and all cooldown bookkeeping live
//! in the engine so this part stays exhaustively testable.

use banter_core::{BotConfig, ChatMessage, MessageKind};

/// Spontaneous interjections never exceed this, no matter how favorable
/// the conversation looks. Only a direct address yields certainty.
const SPONTANEOUS_CAP: f64 = 0.9;

/// Dampening applied per consecutive trailing bot reply, so bots do not
/// pile onto their own chatter.
const BOT_CHATTER_DAMPENING: f64 = 0.5;

/// Mild boost for messages that read as questions.
const QUESTION_BOOST: f64 = 1.5;

/// Features extracted from recent history that modulate the spontaneous
/// path. Deliberately independent of participant count so the
/// count-monotonicity of the model is preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFeatures {
    /// Consecutive bot messages at the tail of recent history.
    pub trailing_bot_replies: usize,
    /// Whether the triggering message ends like a question.
    pub is_question: bool,
}

impl HistoryFeatures {
    pub fn derive(recent: &[ChatMessage], current: &ChatMessage) -> Self {
        let trailing_bot_replies = recent
            .iter()
            .rev()
            .take_while(|m| m.kind == MessageKind::Bot)
            .count();
        let is_question = current.content.trim_end().ends_with('?');
        Self {
            trailing_bot_replies,
            is_question,
        }
    }
}

/// Probability in [0, 1] that `bot` spontaneously interjects on the
/// current message.
///
/// Fixed points: a disabled bot never speaks; shyness at or above 1 never
/// speaks; a bot alone with one participant always speaks. In between, the
/// chance dilutes with the crowd: monotonically non-increasing in
/// participant count for a fixed shyness.
pub fn calculate_interjection_probability(
    bot: &BotConfig,
    participant_count: usize,
    features: &HistoryFeatures,
) -> f64 {
    if !bot.enabled {
        return 0.0;
    }
    if bot.shyness >= 1.0 {
        return 0.0;
    }
    if participant_count <= 1 {
        return 1.0;
    }

    let mut p = (1.0 - bot.shyness) / (participant_count as f64 - 1.0);
    p *= BOT_CHATTER_DAMPENING.powi(features.trailing_bot_replies as i32);
    if features.is_question {
        p *= QUESTION_BOOST;
    }
    p.clamp(0.0, SPONTANEOUS_CAP)
}

/// Whether `content` directly addresses `bot`, by `@name` mention or any
/// configured trigger keyword (case-insensitive substring match).
pub fn is_addressed(bot: &BotConfig, content: &str) -> bool {
    let content = content.to_lowercase();
    if content.contains(&format!("@{}", bot.name.to_lowercase())) {
        return true;
    }
    bot.triggers
        .iter()
        .any(|t| !t.is_empty() && content.contains(&t.to_lowercase()))
}

/// The thin random wrapper around the pure model.
pub fn draw(probability: f64) -> bool {
    use rand::Rng;
    rand::rng().random::<f64>() < probability
}
