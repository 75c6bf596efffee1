use serde::{Deserialize, Serialize};

/// Stable identity string assigned by the transport, unique for the
/// lifetime of a connection.
pub type ParticipantId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub identity: ParticipantId,
    pub display_name: String,
    #[serde(default)]
    pub is_camera_enabled: bool,
    #[serde(default)]
    pub is_microphone_enabled: bool,
    #[serde(default)]
    pub is_screen_share_enabled: bool,
    /// Smoothed loudness, 0–100.
    #[serde(default)]
    pub audio_level: u8,
    #[serde(default)]
    pub connection_quality: ConnectionQuality,
    #[serde(default)]
    pub is_local: bool,
}

impl Participant {
    pub fn new(identity: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            is_camera_enabled: false,
            is_microphone_enabled: false,
            is_screen_share_enabled: false,
            audio_level: 0,
            connection_quality: ConnectionQuality::Unknown,
            is_local: false,
        }
    }

    /// The local participant reports `excellent` quality by convention.
    pub fn local(identity: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        let mut p = Self::new(identity, display_name);
        p.is_local = true;
        p.connection_quality = ConnectionQuality::Excellent;
        p
    }
}
