pub mod bot;
pub mod message;
pub mod participant;
pub mod track;
pub mod wire;

pub use bot::BotConfig;
pub use message::{ChatMessage, MessageKind};
pub use participant::{ConnectionQuality, Participant, ParticipantId};
pub use track::{RemoteTrack, TrackKind, TrackSource};
pub use wire::{WireEnvelope, WireKind};

/// Current wall-clock time as epoch milliseconds, the unit used for all
/// sender-assigned wire timestamps.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
