pub mod audio;
pub mod controller;
pub mod events;
pub mod quality;
pub mod token;
pub mod tracks;
pub mod transport;

mod util;

pub use audio::{AudioLevelMonitor, TrackSampler, rms_level};
pub use controller::{RoomSessionController, SessionError};
pub use events::{ConnectionState, RoomEvent};
pub use quality::ConnectionQualityTracker;
pub use token::{HttpTokenIssuer, TokenError, TokenGrant, TokenIssuer, TokenRequest};
pub use tracks::TrackRegistry;
pub use transport::{
    ConnectRequest, ParticipantInfo, PublishedTrack, RoomSnapshot, RoomTransport, SpeakerUpdate,
    TransportError, TransportEvent, TransportSession,
};
