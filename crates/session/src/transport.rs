//! Abstraction over the external selective-forwarding transport.
//!
//! The concrete SFU client lives outside this crate; everything here is the
//! typed surface the session layer consumes: a connect entry point, a
//! broadcast event stream, and a handle for the lifetime of one logical
//! connection.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use banter_core::{ConnectionQuality, ParticipantId, RemoteTrack, TrackSource};

use crate::audio::TrackSampler;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    Connect(String),
    #[error("not connected")]
    NotConnected,
    #[error("data publish failed: {0}")]
    Publish(String),
}

/// One entry of an active-speakers report. `level` is the transport's own
/// coarse loudness estimate in [0, 1].
#[derive(Debug, Clone)]
pub struct SpeakerUpdate {
    pub identity: ParticipantId,
    pub level: f32,
}

/// Events delivered by the transport, in delivery order. The session layer
/// never reorders them.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected {
        reason: Option<String>,
    },
    Reconnecting,
    Reconnected,
    ParticipantJoined {
        identity: ParticipantId,
        display_name: String,
    },
    ParticipantLeft {
        identity: ParticipantId,
    },
    TrackPublished {
        identity: ParticipantId,
        source: TrackSource,
        track: RemoteTrack,
    },
    TrackUnpublished {
        identity: ParticipantId,
        source: TrackSource,
        track: RemoteTrack,
    },
    TrackMuted {
        identity: ParticipantId,
        source: TrackSource,
    },
    TrackUnmuted {
        identity: ParticipantId,
        source: TrackSource,
    },
    DataReceived {
        payload: Vec<u8>,
        sender: ParticipantId,
    },
    ActiveSpeakersChanged {
        speakers: Vec<SpeakerUpdate>,
    },
    ConnectionQualityChanged {
        identity: ParticipantId,
        quality: ConnectionQuality,
    },
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub server_url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub identity: ParticipantId,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct PublishedTrack {
    pub identity: ParticipantId,
    pub source: TrackSource,
    pub track: RemoteTrack,
}

/// Room contents as seen by the transport at subscription time. Used for
/// the reconciliation pass: anything that joined or published before the
/// event stream was wired shows up here and nowhere else.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    pub participants: Vec<ParticipantInfo>,
    pub tracks: Vec<PublishedTrack>,
}

#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn connect(
        &self,
        request: ConnectRequest,
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}

/// Handle for one logical transport connection. Owned by the controller;
/// dropped (after `close`) on disconnect.
#[async_trait]
pub trait TransportSession: Send + Sync {
    fn local_identity(&self) -> ParticipantId;

    fn local_name(&self) -> String;

    /// Subscribes to the event stream. Events published before the first
    /// subscription are not replayed; use `snapshot` to reconcile.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    fn snapshot(&self) -> RoomSnapshot;

    /// Attaches a raw-signal sampler to a track, when the underlying media
    /// object is locally accessible. `None` means the capability is
    /// unavailable; callers fall back to transport-reported levels.
    fn attach_sampler(&self, track: &RemoteTrack) -> Option<Arc<dyn TrackSampler>>;

    async fn publish_data(&self, payload: Vec<u8>, reliable: bool) -> Result<(), TransportError>;

    async fn close(&self);
}
