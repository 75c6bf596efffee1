//! Application-vocabulary events.
//!
//! The controller is the single translation point between transport
//! vocabulary and what the rest of the system (UI, chat, bots) consumes.

use serde::Serialize;

use banter_core::{ConnectionQuality, ParticipantId, TrackSource};

use crate::transport::SpeakerUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub enum RoomEvent {
    StateChanged(ConnectionState),
    ParticipantConnected {
        identity: ParticipantId,
        display_name: String,
    },
    ParticipantDisconnected {
        identity: ParticipantId,
        display_name: String,
    },
    TrackSubscribed {
        identity: ParticipantId,
        source: TrackSource,
    },
    TrackUnsubscribed {
        identity: ParticipantId,
        source: TrackSource,
    },
    TrackMuted {
        identity: ParticipantId,
        source: TrackSource,
    },
    TrackUnmuted {
        identity: ParticipantId,
        source: TrackSource,
    },
    ActiveSpeakers {
        speakers: Vec<SpeakerUpdate>,
    },
    ConnectionQualityChanged {
        identity: ParticipantId,
        quality: ConnectionQuality,
    },
    DataReceived {
        payload: Vec<u8>,
        sender: ParticipantId,
    },
}
