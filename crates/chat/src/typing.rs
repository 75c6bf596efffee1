use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use banter_core::ParticipantId;

struct TypingEntry {
    display_name: String,
    last_signal: Instant,
}

/// Ephemeral per-participant typing state. Entries expire `ttl` after their
/// last renewal and are pruned lazily on each read; there is no timer.
pub struct TypingTracker {
    ttl: Duration,
    entries: Mutex<HashMap<ParticipantId, TypingEntry>>,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records (or renews) a typing signal.
    pub fn signal(&self, identity: &str, display_name: &str) {
        self.entries.lock().insert(
            identity.to_string(),
            TypingEntry {
                display_name: display_name.to_string(),
                last_signal: Instant::now(),
            },
        );
    }

    /// Display names of everyone currently typing, pruning expired entries
    /// on the way.
    pub fn active(&self) -> Vec<String> {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.last_signal.elapsed() < self.ttl);
        entries.values().map(|e| e.display_name.clone()).collect()
    }

    pub fn is_typing(&self, identity: &str) -> bool {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.last_signal.elapsed() < self.ttl);
        entries.contains_key(identity)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
