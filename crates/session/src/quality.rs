use dashmap::DashMap;

use banter_core::{ConnectionQuality, ParticipantId};

/// Last-write-wins map from participant to connection quality. Quality is
/// already coarse-grained at the source, so there is no smoothing here.
#[derive(Default)]
pub struct ConnectionQualityTracker {
    qualities: DashMap<ParticipantId, ConnectionQuality>,
}

impl ConnectionQualityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, identity: &str, quality: ConnectionQuality) {
        self.qualities.insert(identity.to_string(), quality);
    }

    /// `Unknown` for participants that never reported.
    pub fn get(&self, identity: &str) -> ConnectionQuality {
        self.qualities
            .get(identity)
            .map(|q| *q)
            .unwrap_or_default()
    }

    pub fn remove(&self, identity: &str) {
        self.qualities.remove(identity);
    }

    pub fn clear(&self) {
        self.qualities.clear();
    }
}
