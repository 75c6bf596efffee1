//! Per-participant loudness tracking.
//!
//! Two independent sources feed one level: the transport's active-speakers
//! report (authoritative but burst-y: it only updates while a participant
//! is confidently above the transport's own threshold) and an optional
//! local sampler over the raw signal. They reconcile by `max`, and a
//! time-based exponential moving average decouples presentation from
//! signal arrival rate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use banter_config::AudioSettings;
use banter_core::ParticipantId;

use crate::transport::SpeakerUpdate;

/// Smoothed values below this are close enough to silence that a retired
/// participant's entry can be dropped.
const REMOVAL_EPSILON: f32 = 0.005;

/// Samples instantaneous signal energy for one track. Implementations wrap
/// whatever the transport exposes locally; `None` means the capability is
/// gone (sample access denied, track detached).
pub trait TrackSampler: Send + Sync {
    fn sample(&self) -> Option<f32>;
}

/// RMS energy of an f32 PCM frame, clamped to [0, 1]. The standard raw
/// level for samplers that read decoded audio.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt().min(1.0)
}

struct LevelState {
    /// Latest coarse level from the transport report.
    transport_level: f32,
    sampler: Option<Arc<dyn TrackSampler>>,
    smoothed: f32,
    speaking: bool,
    /// Retired entries decay toward zero and are dropped at silence
    /// instead of vanishing discontinuously.
    retired: bool,
}

impl LevelState {
    fn new() -> Self {
        Self {
            transport_level: 0.0,
            sampler: None,
            smoothed: 0.0,
            speaking: false,
            retired: false,
        }
    }
}

pub struct AudioLevelMonitor {
    settings: AudioSettings,
    levels: DashMap<ParticipantId, LevelState>,
    refresh: Mutex<Option<AbortHandle>>,
}

impl AudioLevelMonitor {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings,
            levels: DashMap::new(),
            refresh: Mutex::new(None),
        }
    }

    /// Starts (or restarts) raw-signal monitoring for a participant.
    /// Idempotent: any prior sampler for the identity is released first.
    /// `sampler` is `None` when the analysis capability is unavailable;
    /// the participant still tracks via transport-reported levels.
    pub fn setup_monitoring(
        self: &Arc<Self>,
        identity: &str,
        sampler: Option<Arc<dyn TrackSampler>>,
    ) {
        let mut entry = self
            .levels
            .entry(identity.to_string())
            .or_insert_with(LevelState::new);
        entry.retired = false;
        if sampler.is_none() {
            debug!(identity, "signal analysis unavailable, transport levels only");
        }
        entry.sampler = sampler;
        drop(entry);
        self.ensure_refresh_task();
    }

    /// Releases the analyser resource for a participant. Safe to call when
    /// none exists.
    pub fn cleanup_analyser(&self, identity: &str) {
        if let Some(mut entry) = self.levels.get_mut(identity) {
            entry.sampler = None;
        }
    }

    /// Ingests an active-speakers report. Tracked participants absent from
    /// the report fall back toward silence; listed ones are tracked from
    /// here on even if nothing else registered them.
    pub fn set_transport_levels(self: &Arc<Self>, speakers: &[SpeakerUpdate]) {
        for mut entry in self.levels.iter_mut() {
            if !speakers.iter().any(|s| s.identity == *entry.key()) {
                entry.transport_level = 0.0;
            }
        }
        for speaker in speakers {
            let mut entry = self
                .levels
                .entry(speaker.identity.clone())
                .or_insert_with(LevelState::new);
            entry.retired = false;
            entry.transport_level = speaker.level.clamp(0.0, 1.0);
        }
        if !speakers.is_empty() {
            self.ensure_refresh_task();
        }
    }

    /// Begins tracking a participant without any signal yet.
    pub fn track(self: &Arc<Self>, identity: &str) {
        self.levels
            .entry(identity.to_string())
            .or_insert_with(LevelState::new)
            .retired = false;
        self.ensure_refresh_task();
    }

    /// Stops tracking a participant: the level decays to zero on the
    /// refresh loop and the entry is dropped once silent.
    pub fn retire(&self, identity: &str) {
        if let Some(mut entry) = self.levels.get_mut(identity) {
            entry.retired = true;
            entry.sampler = None;
            entry.transport_level = 0.0;
        }
    }

    /// Last smoothed level in [0, 1]; 0.0 for unknown participants.
    pub fn level(&self, identity: &str) -> f32 {
        self.levels.get(identity).map(|e| e.smoothed).unwrap_or(0.0)
    }

    /// Hysteresis-stabilized speaking indicator.
    pub fn is_speaking(&self, identity: &str) -> bool {
        self.levels.get(identity).map(|e| e.speaking).unwrap_or(false)
    }

    pub fn is_idle(&self) -> bool {
        self.levels.is_empty()
    }

    /// Drops all state immediately and stops the refresh loop. Used by the
    /// disconnect path, where derived state must not remain observable.
    pub fn clear(&self) {
        self.levels.clear();
        if let Some(handle) = self.refresh.lock().take() {
            handle.abort();
        }
    }

    /// One smoothing step over `dt` of elapsed real time. Returns whether
    /// any participant is still tracked.
    fn tick(&self, dt: Duration) -> bool {
        let tau = Duration::from_millis(self.settings.tau_ms).as_secs_f32();
        let alpha = 1.0 - (-dt.as_secs_f32() / tau).exp();

        let mut silenced: Vec<ParticipantId> = Vec::new();
        for mut entry in self.levels.iter_mut() {
            let raw = if entry.retired {
                0.0
            } else {
                let sampled = entry
                    .sampler
                    .as_ref()
                    .and_then(|s| s.sample())
                    .unwrap_or(0.0);
                entry.transport_level.max(sampled)
            };

            entry.smoothed += (raw - entry.smoothed) * alpha;

            if !entry.speaking && entry.smoothed >= self.settings.speaking_enter {
                entry.speaking = true;
            } else if entry.speaking && entry.smoothed <= self.settings.speaking_exit {
                entry.speaking = false;
            }

            if entry.retired && entry.smoothed < REMOVAL_EPSILON {
                silenced.push(entry.key().clone());
            }
        }
        for identity in silenced {
            self.levels.remove(&identity);
            trace!(%identity, "audio level entry decayed out");
        }

        !self.levels.is_empty()
    }

    /// Spawns the refresh loop if it is not already running. The loop
    /// parameterizes each step by elapsed real time and exits on its own
    /// once no participant remains tracked, so an idle room costs nothing.
    fn ensure_refresh_task(self: &Arc<Self>) {
        let mut refresh = self.refresh.lock();
        if refresh.is_some() {
            return;
        }

        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(monitor.settings.refresh_interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // first tick completes immediately

            let mut last = Instant::now();
            loop {
                ticker.tick().await;
                let dt = last.elapsed();
                last = Instant::now();
                if !monitor.tick(dt) {
                    // Re-check under the spawn lock: a participant may have
                    // been tracked between the empty tick and here, and
                    // `ensure_refresh_task` would then see a live handle.
                    let mut refresh = monitor.refresh.lock();
                    if monitor.levels.is_empty() {
                        *refresh = None;
                        debug!("audio refresh loop stopped, no tracked participants");
                        break;
                    }
                }
            }
        });

        *refresh = Some(handle.abort_handle());
    }
}
