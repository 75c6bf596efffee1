use std::sync::Arc;
use std::time::Duration;

use banter_core::{ConnectionQuality, RemoteTrack, TrackKind, TrackSource};
use banter_session::{
    ConnectionState, ParticipantInfo, PublishedTrack, RoomSnapshot, SessionError, SpeakerUpdate,
    TransportEvent,
};

use crate::fixtures::{TestRoom, wait_until};

fn camera(sid: &str) -> RemoteTrack {
    RemoteTrack::new(sid, TrackKind::Video)
}

fn mic(sid: &str) -> RemoteTrack {
    RemoteTrack::new(sid, TrackKind::Audio)
}

fn joined(identity: &str, name: &str) -> TransportEvent {
    TransportEvent::ParticipantJoined {
        identity: identity.into(),
        display_name: name.into(),
    }
}

fn published(identity: &str, source: TrackSource, track: RemoteTrack) -> TransportEvent {
    TransportEvent::TrackPublished {
        identity: identity.into(),
        source,
        track,
    }
}

#[tokio::test]
async fn connect_reconciles_preexisting_participants_and_tracks() {
    let room = TestRoom::spawn();
    room.transport.set_snapshot(RoomSnapshot {
        participants: vec![ParticipantInfo {
            identity: "bob".into(),
            display_name: "Bob".into(),
        }],
        tracks: vec![PublishedTrack {
            identity: "bob".into(),
            source: TrackSource::Camera,
            track: camera("cam-1"),
        }],
    });

    room.connect().await.unwrap();

    // Nothing was emitted as an event; the reconciliation pass alone must
    // account for the already-populated room.
    assert!(room.controller.is_connected());
    let bob = room.controller.participant("bob").unwrap();
    assert!(bob.is_camera_enabled);
    assert_eq!(
        room.controller.tracks("bob")[&TrackSource::Camera].sid,
        "cam-1"
    );
    assert_eq!(room.controller.participant_count(), 2); // local + bob
}

#[tokio::test]
async fn second_connect_fails_fast_without_disturbing_state() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    room.session().emit(joined("alice", "Alice"));
    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller.participant("alice").is_some()
        })
        .await
    );

    let err = room.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyConnected));
    assert!(room.controller.is_connected());
    assert!(room.controller.participant("alice").is_some());
    assert_eq!(room.transport.session_count(), 1);
}

#[tokio::test]
async fn failed_transport_connect_rolls_back_fully() {
    let room = TestRoom::spawn();
    room.transport.set_snapshot(RoomSnapshot {
        participants: vec![ParticipantInfo {
            identity: "bob".into(),
            display_name: "Bob".into(),
        }],
        tracks: vec![PublishedTrack {
            identity: "bob".into(),
            source: TrackSource::Camera,
            track: camera("cam-1"),
        }],
    });
    room.transport.fail_next_connect();

    let err = room.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));

    // No partial state may be observable after a failed connect.
    assert!(!room.controller.is_connected());
    assert_eq!(room.controller.state(), ConnectionState::Disconnected);
    assert!(room.controller.tracks("bob").is_empty());
    assert_eq!(room.controller.participant_count(), 0);

    // Recovery is the next explicit action.
    room.connect().await.unwrap();
    assert!(room.controller.is_connected());
}

#[tokio::test]
async fn token_failure_aborts_connect() {
    let room = TestRoom::spawn();
    room.issuer.fail_requests(true);

    let err = room.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Token(_)));
    assert_eq!(room.controller.state(), ConnectionState::Disconnected);
    assert_eq!(room.transport.session_count(), 0);
}

#[tokio::test]
async fn join_publish_leave_leaves_no_residue() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    let session = room.session();

    session.emit(joined("alice", "Alice"));
    session.emit(joined("bob", "Bob"));
    session.emit(published("alice", TrackSource::Camera, camera("cam-a")));
    session.emit(published("bob", TrackSource::Camera, camera("cam-b")));
    session.emit(TransportEvent::ActiveSpeakersChanged {
        speakers: vec![SpeakerUpdate {
            identity: "bob".into(),
            level: 0.8,
        }],
    });

    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller.audio_level("bob") > 0.1
        })
        .await
    );
    assert_eq!(room.controller.participant_count(), 3);

    session.emit(TransportEvent::ParticipantLeft {
        identity: "bob".into(),
    });

    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller.participant("bob").is_none()
        })
        .await
    );
    assert!(room.controller.tracks("bob").is_empty());
    assert!(
        wait_until(Duration::from_secs(2), || {
            room.controller.audio_level("bob") == 0.0
        })
        .await,
        "departed participant's audio level entry must decay out"
    );

    // The remaining participant is untouched.
    let alice = room.controller.participant("alice").unwrap();
    assert!(alice.is_camera_enabled);
    assert_eq!(
        room.controller.tracks("alice")[&TrackSource::Camera].sid,
        "cam-a"
    );
}

#[tokio::test]
async fn republish_replaces_and_stale_unpublish_is_ignored() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    let session = room.session();

    session.emit(joined("alice", "Alice"));
    session.emit(published("alice", TrackSource::Camera, camera("cam-1")));
    session.emit(published("alice", TrackSource::Camera, camera("cam-2")));
    // Late unpublish for the replaced track.
    session.emit(TransportEvent::TrackUnpublished {
        identity: "alice".into(),
        source: TrackSource::Camera,
        track: camera("cam-1"),
    });

    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller
                .tracks("alice")
                .get(&TrackSource::Camera)
                .is_some_and(|t| t.sid == "cam-2")
        })
        .await
    );
    let alice = room.controller.participant("alice").unwrap();
    assert!(alice.is_camera_enabled);
}

#[tokio::test]
async fn mute_and_unmute_update_media_flags() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    let session = room.session();

    session.emit(joined("alice", "Alice"));
    session.emit(published("alice", TrackSource::Microphone, mic("mic-1")));
    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller
                .participant("alice")
                .is_some_and(|p| p.is_microphone_enabled)
        })
        .await
    );

    session.emit(TransportEvent::TrackMuted {
        identity: "alice".into(),
        source: TrackSource::Microphone,
    });
    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller
                .participant("alice")
                .is_some_and(|p| !p.is_microphone_enabled)
        })
        .await
    );

    session.emit(TransportEvent::TrackUnmuted {
        identity: "alice".into(),
        source: TrackSource::Microphone,
    });
    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller
                .participant("alice")
                .is_some_and(|p| p.is_microphone_enabled)
        })
        .await
    );
}

#[tokio::test]
async fn quality_updates_are_last_write_wins_and_local_stays_excellent() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    let session = room.session();

    session.emit(joined("alice", "Alice"));
    session.emit(TransportEvent::ConnectionQualityChanged {
        identity: "alice".into(),
        quality: ConnectionQuality::Good,
    });
    session.emit(TransportEvent::ConnectionQualityChanged {
        identity: "alice".into(),
        quality: ConnectionQuality::Poor,
    });

    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller
                .participant("alice")
                .is_some_and(|p| p.connection_quality == ConnectionQuality::Poor)
        })
        .await
    );

    let local_identity = room.controller.local_identity().unwrap();
    session.emit(TransportEvent::ConnectionQualityChanged {
        identity: local_identity.clone(),
        quality: ConnectionQuality::Poor,
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let local = room.controller.participant(&local_identity).unwrap();
    assert_eq!(local.connection_quality, ConnectionQuality::Excellent);
}

#[tokio::test]
async fn unexpected_transport_disconnect_clears_everything() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    let session = room.session();

    session.emit(joined("alice", "Alice"));
    session.emit(published("alice", TrackSource::Camera, camera("cam-1")));
    assert!(
        wait_until(Duration::from_secs(1), || {
            !room.controller.tracks("alice").is_empty()
        })
        .await
    );

    session.emit(TransportEvent::Disconnected {
        reason: Some("server shutdown".into()),
    });

    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller.state() == ConnectionState::Disconnected
        })
        .await
    );
    assert_eq!(room.controller.participant_count(), 0);
    assert!(room.controller.tracks("alice").is_empty());
}

#[tokio::test]
async fn disconnect_without_session_still_clears_state() {
    let room = TestRoom::spawn();
    room.controller.disconnect().await;
    assert_eq!(room.controller.state(), ConnectionState::Disconnected);
    assert_eq!(room.controller.participant_count(), 0);
}

#[tokio::test]
async fn disconnect_closes_the_transport_session() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    let session = room.session();

    room.controller.disconnect().await;
    assert!(session.is_closed());
    assert_eq!(room.controller.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_supersedes_an_in_flight_connect() {
    let room = TestRoom::spawn();
    room.issuer.set_delay(Duration::from_millis(150));

    let controller = Arc::clone(&room.controller);
    let pending = tokio::spawn(async move { controller.connect().await });

    // Let the connect reach its token await, then supersede it.
    tokio::time::sleep(Duration::from_millis(40)).await;
    room.controller.disconnect().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(SessionError::Superseded)));
    assert_eq!(room.controller.state(), ConnectionState::Disconnected);
    assert_eq!(room.transport.session_count(), 0);

    // The superseding caller can connect cleanly afterwards.
    room.issuer.set_delay(Duration::from_millis(0));
    room.connect().await.unwrap();
    assert!(room.controller.is_connected());
}

#[tokio::test]
async fn reconnecting_and_reconnected_events_track_state() {
    let room = TestRoom::spawn();
    room.connect().await.unwrap();
    let session = room.session();

    session.emit(TransportEvent::Reconnecting);
    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller.state() == ConnectionState::Reconnecting
        })
        .await
    );

    session.emit(TransportEvent::Reconnected);
    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller.state() == ConnectionState::Connected
        })
        .await
    );
}
