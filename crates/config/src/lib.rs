//! Typed settings for the session layer.
//!
//! Loaded from `config/default.*`, an optional environment-specific file,
//! and `BANTER`-prefixed environment variables (`__` separator), in that
//! order of increasing priority.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use banter_core::BotConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub room: RoomSettings,
    #[serde(default)]
    pub token_service: TokenServiceSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub notify: NotifySettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub bots: BotsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    pub name: String,
    pub participant_name: String,
    /// Opaque metadata forwarded to the token-issuance request.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            name: "lobby".to_string(),
            participant_name: "guest".to_string(),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenServiceSettings {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for TokenServiceSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/token".to_string(),
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/bot-reply".to_string(),
            timeout_ms: 8_000,
        }
    }
}

/// Out-of-band message notification webhook. Strictly best-effort; unset
/// means the notify path is disabled entirely.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifySettings {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Maximum retained history entries; oldest are discarded first.
    pub history_limit: usize,
    /// A typing signal expires this many ms after its last renewal.
    pub typing_ttl_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_limit: 200,
            typing_ttl_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// EMA time constant for level smoothing.
    pub tau_ms: u64,
    /// Refresh tick interval for the smoothing loop.
    pub refresh_interval_ms: u64,
    /// Speaking indicator enters above this level.
    pub speaking_enter: f32,
    /// Speaking indicator exits below this level.
    pub speaking_exit: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            tau_ms: 150,
            refresh_interval_ms: 50,
            speaking_enter: 0.30,
            speaking_exit: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotsSettings {
    /// Minimum interval after a bot response before that bot may respond
    /// again.
    pub cooldown_ms: u64,
    #[serde(default)]
    pub roster: Vec<BotConfig>,
}

impl Default for BotsSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: 5_000,
            roster: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "chat.history_limit must be at least 1".to_string(),
            ));
        }
        if self.chat.typing_ttl_ms == 0 {
            return Err(ConfigError::Invalid(
                "chat.typing_ttl_ms must be non-zero".to_string(),
            ));
        }
        if self.audio.tau_ms == 0 || self.audio.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "audio.tau_ms and audio.refresh_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.audio.speaking_enter <= self.audio.speaking_exit {
            return Err(ConfigError::Invalid(
                "audio.speaking_enter must be above audio.speaking_exit".to_string(),
            ));
        }
        let mut names: Vec<&str> = self.bots.roster.iter().map(|b| b.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.bots.roster.len() {
            return Err(ConfigError::Invalid("bot names must be unique".to_string()));
        }
        for bot in &self.bots.roster {
            if !(0.0..=1.0).contains(&bot.shyness) {
                return Err(ConfigError::Invalid(format!(
                    "bot '{}' shyness must be within [0, 1]",
                    bot.name
                )));
            }
        }
        Ok(())
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest): `BANTER__`-prefixed env vars,
/// `config/{env}`, `config/default`.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("BANTER")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
