use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Camera,
    ScreenShare,
    Microphone,
    ScreenShareAudio,
}

impl TrackSource {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackSource::Camera | TrackSource::ScreenShare => TrackKind::Video,
            TrackSource::Microphone | TrackSource::ScreenShareAudio => TrackKind::Audio,
        }
    }
}

/// Handle to a media object owned by the transport. Two handles refer to
/// the same underlying object iff their `sid`s are equal; the registry
/// relies on this for stale-removal checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub sid: String,
    pub kind: TrackKind,
}

impl RemoteTrack {
    pub fn new(sid: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            sid: sid.into(),
            kind,
        }
    }
}
