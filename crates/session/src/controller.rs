//! Room session lifecycle and transport event reconciliation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use banter_config::Settings;
use banter_core::{
    ConnectionQuality, Participant, ParticipantId, RemoteTrack, TrackSource,
};

use crate::audio::AudioLevelMonitor;
use crate::events::{ConnectionState, RoomEvent};
use crate::quality::ConnectionQualityTracker;
use crate::token::{TokenError, TokenIssuer, TokenRequest};
use crate::tracks::TrackRegistry;
use crate::transport::{
    ConnectRequest, RoomTransport, TransportError, TransportEvent, TransportSession,
};
use crate::util::AbortOnDrop;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session already exists; disconnect first")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("connect attempt superseded by a newer connect or disconnect")]
    Superseded,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct ActiveSession {
    session: Arc<dyn TransportSession>,
    _event_loop: AbortOnDrop,
}

/// Owns the connect/disconnect/reconnect lifecycle, consumes every
/// transport event, and fans derived state into the track registry, audio
/// monitor, and quality tracker. All mutation of those three happens here
/// and nowhere else.
pub struct RoomSessionController {
    transport: Arc<dyn RoomTransport>,
    token_issuer: Arc<dyn TokenIssuer>,
    settings: Settings,

    tracks: TrackRegistry,
    audio: Arc<AudioLevelMonitor>,
    quality: ConnectionQualityTracker,
    participants: DashMap<ParticipantId, Participant>,

    state: RwLock<ConnectionState>,
    active: RwLock<Option<ActiveSession>>,
    /// Brands each connect attempt; every continuation that crosses an
    /// await re-validates it so a superseded attempt can never mutate
    /// newer state.
    epoch: AtomicU64,
    /// Serializes connect sequences; two can never overlap.
    connect_gate: tokio::sync::Mutex<()>,

    events_tx: broadcast::Sender<RoomEvent>,
}

impl RoomSessionController {
    pub fn new(
        transport: Arc<dyn RoomTransport>,
        token_issuer: Arc<dyn TokenIssuer>,
        settings: Settings,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            transport,
            token_issuer,
            audio: Arc::new(AudioLevelMonitor::new(settings.audio.clone())),
            settings,
            tracks: TrackRegistry::new(),
            quality: ConnectionQualityTracker::new(),
            participants: DashMap::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            active: RwLock::new(None),
            epoch: AtomicU64::new(0),
            connect_gate: tokio::sync::Mutex::new(()),
            events_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected)
    }

    pub fn local_identity(&self) -> Option<ParticipantId> {
        self.active
            .read()
            .as_ref()
            .map(|a| a.session.local_identity())
    }

    /// Monotonic counter bumped by every connect and disconnect. Async
    /// flows capture it before a suspension point and compare after, so a
    /// continuation from a superseded session can discard its result
    /// instead of mutating newer state.
    pub fn session_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Composed snapshot for one participant: stored record plus the
    /// current audio level and quality, so no copy survives an event tick.
    pub fn participant(&self, identity: &str) -> Option<Participant> {
        let mut p = self.participants.get(identity).map(|e| e.clone())?;
        p.audio_level = (self.audio.level(identity) * 100.0).round().clamp(0.0, 100.0) as u8;
        p.connection_quality = if p.is_local {
            ConnectionQuality::Excellent
        } else {
            self.quality.get(identity)
        };
        Some(p)
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.participants
            .iter()
            .filter_map(|e| self.participant(e.key()))
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn tracks(&self, identity: &str) -> HashMap<TrackSource, RemoteTrack> {
        self.tracks.tracks(identity)
    }

    pub fn audio_level(&self, identity: &str) -> f32 {
        self.audio.level(identity)
    }

    pub fn is_speaking(&self, identity: &str) -> bool {
        self.audio.is_speaking(identity)
    }

    /// Connects to the room: fetches an access credential, opens the
    /// transport, wires the event stream, and reconciles everything that
    /// joined or published before the subscription existed.
    ///
    /// Fails fast with `AlreadyConnected` when a session object exists.
    /// Any failure rolls the controller fully back to `disconnected`; no
    /// partial state stays observable.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SessionError> {
        let _gate = self.connect_gate.lock().await;

        if self.active.read().is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Connecting);

        let request = TokenRequest {
            room_name: self.settings.room.name.clone(),
            participant_name: self.settings.room.participant_name.clone(),
            metadata: self.settings.room.metadata.clone(),
        };

        let grant = match self.token_issuer.issue(request).await {
            Ok(grant) => grant,
            Err(err) => {
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    self.rollback();
                }
                return Err(err.into());
            }
        };

        // A disconnect or newer connect ran while we awaited the token;
        // its state is authoritative, ours is stale.
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Err(SessionError::Superseded);
        }

        let session = match self
            .transport
            .connect(ConnectRequest {
                server_url: grant.server_url,
                token: grant.token,
            })
            .await
        {
            Ok(session) => session,
            Err(err) => {
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    self.rollback();
                }
                return Err(err.into());
            }
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            session.close().await;
            return Err(SessionError::Superseded);
        }

        // Subscribe before reconciling so nothing falls in the gap; events
        // arriving during the pass buffer in the channel and replay through
        // the same idempotent handlers.
        let rx = session.subscribe();

        let local = Participant::local(session.local_identity(), session.local_name());
        self.participants.insert(local.identity.clone(), local);

        self.reconcile(&session);

        let event_loop = tokio::spawn(Self::run_event_loop(
            Arc::clone(self),
            Arc::clone(&session),
            rx,
            epoch,
        ));
        *self.active.write() = Some(ActiveSession {
            session: Arc::clone(&session),
            _event_loop: AbortOnDrop(event_loop),
        });

        self.set_state(ConnectionState::Connected);
        info!(
            room = %self.settings.room.name,
            identity = %session.local_identity(),
            "session connected"
        );
        Ok(())
    }

    /// Tears the session down. Derived state is cleared before returning
    /// regardless of whether a live transport session existed; this is the
    /// cancellation primitive for everything the session spawned.
    pub async fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let active = self.active.write().take();
        self.clear_derived_state();
        self.set_state(ConnectionState::Disconnected);
        if let Some(active) = active {
            active.session.close().await;
            debug!("transport session closed");
        }
    }

    /// Sequential disconnect + connect. Not atomic against concurrent
    /// callers: the last call wins, and a superseded in-flight attempt
    /// detects the epoch mismatch and bows out.
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), SessionError> {
        info!("reconnecting session");
        self.disconnect().await;
        self.connect().await
    }

    /// Forwards a payload over the session's data path. The chat channel's
    /// outbound route.
    pub async fn publish_data(&self, payload: Vec<u8>, reliable: bool) -> Result<(), SessionError> {
        let session = self
            .active
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.session))
            .ok_or(SessionError::NotConnected)?;
        session
            .publish_data(payload, reliable)
            .await
            .map_err(SessionError::from)
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            *state = next;
            drop(state);
            debug!(state = ?next, "connection state changed");
            self.emit(RoomEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: RoomEvent) {
        // No subscribers is fine; the controller never depends on them.
        let _ = self.events_tx.send(event);
    }

    fn rollback(&self) {
        self.clear_derived_state();
        self.set_state(ConnectionState::Disconnected);
    }

    fn clear_derived_state(&self) {
        self.tracks.clear();
        self.audio.clear();
        self.quality.clear();
        self.participants.clear();
    }

    /// Catches up on room contents that predate our event subscription,
    /// the late-attaching-listener gap. Runs through the same upsert paths
    /// as live events, so replays are harmless.
    fn reconcile(self: &Arc<Self>, session: &Arc<dyn TransportSession>) {
        let snapshot = session.snapshot();
        let local_identity = session.local_identity();

        for info in snapshot.participants {
            if info.identity == local_identity {
                continue;
            }
            self.on_participant_joined(info.identity, info.display_name);
        }
        for published in snapshot.tracks {
            self.on_track_published(
                session,
                published.identity,
                published.source,
                published.track,
            );
        }
    }

    async fn run_event_loop(
        controller: Arc<Self>,
        session: Arc<dyn TransportSession>,
        mut rx: broadcast::Receiver<TransportEvent>,
        epoch: u64,
    ) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if controller.epoch.load(Ordering::SeqCst) != epoch {
                        break;
                    }
                    if !controller.handle_transport_event(&session, event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "transport event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("transport event loop exited");
    }

    /// Processes one transport event synchronously; every mutation
    /// completes before the loop polls again. Returns `false` when the
    /// session ended and the loop should stop.
    fn handle_transport_event(
        self: &Arc<Self>,
        session: &Arc<dyn TransportSession>,
        event: TransportEvent,
    ) -> bool {
        match event {
            TransportEvent::Connected => {
                debug!("transport confirmed connection");
            }
            TransportEvent::Disconnected { reason } => {
                warn!(?reason, "transport session ended");
                // The transport already tore the session down; bump the
                // epoch so stale continuations die, then clear everything.
                self.epoch.fetch_add(1, Ordering::SeqCst);
                *self.active.write() = None;
                self.clear_derived_state();
                self.set_state(ConnectionState::Disconnected);
                return false;
            }
            TransportEvent::Reconnecting => {
                self.set_state(ConnectionState::Reconnecting);
            }
            TransportEvent::Reconnected => {
                // Resync: the room may have changed while we were away.
                self.reconcile(session);
                self.set_state(ConnectionState::Connected);
            }
            TransportEvent::ParticipantJoined {
                identity,
                display_name,
            } => {
                self.on_participant_joined(identity, display_name);
            }
            TransportEvent::ParticipantLeft { identity } => {
                let display_name = self
                    .participants
                    .remove(&identity)
                    .map(|(_, p)| p.display_name)
                    .unwrap_or_default();
                self.tracks.remove_participant(&identity);
                self.audio.retire(&identity);
                self.quality.remove(&identity);
                info!(%identity, "participant left");
                self.emit(RoomEvent::ParticipantDisconnected {
                    identity,
                    display_name,
                });
            }
            TransportEvent::TrackPublished {
                identity,
                source,
                track,
            } => {
                self.on_track_published(session, identity, source, track);
            }
            TransportEvent::TrackUnpublished {
                identity,
                source,
                track,
            } => {
                if self.tracks.remove_track(&identity, &track, source) {
                    self.set_media_flag(&identity, source, false);
                    if source == TrackSource::Microphone {
                        self.audio.cleanup_analyser(&identity);
                    }
                    self.emit(RoomEvent::TrackUnsubscribed { identity, source });
                } else {
                    debug!(%identity, ?source, sid = %track.sid, "stale unpublish ignored");
                }
            }
            TransportEvent::TrackMuted { identity, source } => {
                self.set_media_flag(&identity, source, false);
                self.emit(RoomEvent::TrackMuted { identity, source });
            }
            TransportEvent::TrackUnmuted { identity, source } => {
                self.set_media_flag(&identity, source, true);
                self.emit(RoomEvent::TrackUnmuted { identity, source });
            }
            TransportEvent::DataReceived { payload, sender } => {
                self.emit(RoomEvent::DataReceived { payload, sender });
            }
            TransportEvent::ActiveSpeakersChanged { speakers } => {
                self.audio.set_transport_levels(&speakers);
                self.emit(RoomEvent::ActiveSpeakers { speakers });
            }
            TransportEvent::ConnectionQualityChanged { identity, quality } => {
                if self.local_identity().as_deref() != Some(identity.as_str()) {
                    self.quality.set(&identity, quality);
                }
                self.emit(RoomEvent::ConnectionQualityChanged { identity, quality });
            }
        }
        true
    }

    fn on_participant_joined(&self, identity: ParticipantId, display_name: String) {
        let known = self.participants.contains_key(&identity);
        if !known {
            self.participants.insert(
                identity.clone(),
                Participant::new(identity.clone(), display_name.clone()),
            );
            info!(%identity, %display_name, "participant joined");
            self.emit(RoomEvent::ParticipantConnected {
                identity,
                display_name,
            });
        }
    }

    fn on_track_published(
        self: &Arc<Self>,
        session: &Arc<dyn TransportSession>,
        identity: ParticipantId,
        source: TrackSource,
        track: RemoteTrack,
    ) {
        self.tracks.upsert_track(&identity, track.clone(), source);
        self.set_media_flag(&identity, source, true);

        if source == TrackSource::Microphone {
            // Raw-signal analysis is best-effort; a missing capability
            // leaves the participant on transport-reported levels.
            let sampler = session.attach_sampler(&track);
            self.audio.setup_monitoring(&identity, sampler);
        }

        debug!(%identity, ?source, sid = %track.sid, "track subscribed");
        self.emit(RoomEvent::TrackSubscribed { identity, source });
    }

    fn set_media_flag(&self, identity: &str, source: TrackSource, enabled: bool) {
        if let Some(mut p) = self.participants.get_mut(identity) {
            match source {
                TrackSource::Camera => p.is_camera_enabled = enabled,
                TrackSource::Microphone => p.is_microphone_enabled = enabled,
                TrackSource::ScreenShare => p.is_screen_share_enabled = enabled,
                TrackSource::ScreenShareAudio => {}
            }
        }
    }
}
