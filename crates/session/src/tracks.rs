use std::collections::HashMap;

use dashmap::DashMap;

use banter_core::{ParticipantId, RemoteTrack, TrackSource};

/// Owns the (participant, source) → track binding. Pure state: no I/O, no
/// events; the controller notifies consumers after mutating.
///
/// Invariant: at most one track per (participant, source) slot; a new track
/// for an occupied slot replaces, never appends.
#[derive(Default)]
pub struct TrackRegistry {
    tracks: DashMap<ParticipantId, HashMap<TrackSource, RemoteTrack>>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `track` for the slot, replacing whatever was there.
    pub fn upsert_track(&self, identity: &str, track: RemoteTrack, source: TrackSource) {
        self.tracks
            .entry(identity.to_string())
            .or_default()
            .insert(source, track);
    }

    /// Clears the slot only when `track` is the currently-registered one.
    /// A stale removal (an unpublish for a track that was already replaced)
    /// no-ops. Returns whether anything was removed.
    pub fn remove_track(&self, identity: &str, track: &RemoteTrack, source: TrackSource) -> bool {
        let mut removed = false;
        if let Some(mut slots) = self.tracks.get_mut(identity) {
            if slots.get(&source).is_some_and(|current| current.sid == track.sid) {
                slots.remove(&source);
                removed = true;
            }
            if slots.is_empty() {
                drop(slots);
                self.tracks.remove(identity);
            }
        }
        removed
    }

    /// Snapshot of the participant's current tracks; empty when unknown.
    pub fn tracks(&self, identity: &str) -> HashMap<TrackSource, RemoteTrack> {
        self.tracks
            .get(identity)
            .map(|slots| slots.clone())
            .unwrap_or_default()
    }

    /// Purges every track owned by the participant.
    pub fn remove_participant(&self, identity: &str) {
        self.tracks.remove(identity);
    }

    pub fn clear(&self) {
        self.tracks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
