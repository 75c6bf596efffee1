use serde::{Deserialize, Serialize};

/// Static configuration for one automated participant.
///
/// Cooldown state (last-responded instant) is runtime bookkeeping held by
/// the interjection engine, deliberately not part of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Unique bot name; also matched (case-insensitively) for `@name`
    /// mentions.
    pub name: String,
    /// Keywords that address this bot when they occur in a message.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// 0 = interjects freely, 1 = never spontaneously interjects.
    #[serde(default)]
    pub shyness: f64,
    /// Temperature/personality parameters, opaque to this layer; passed
    /// through verbatim to the generation collaborator.
    #[serde(default)]
    pub personality: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BotConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            shyness: 0.5,
            personality: serde_json::Value::Null,
            enabled: true,
        }
    }

    /// Identity stamped on wire envelopes for messages this bot sends.
    pub fn identity(&self) -> String {
        format!("bot:{}", self.name.to_lowercase())
    }
}
