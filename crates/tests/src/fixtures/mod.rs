
pub use collaborators::{RecordingNotifier, ScriptedGenerator, StaticTokenIssuer};
pub use test_room::{TestRoom, init_tracing, wait_until};
pub use transport::{FakeSession, FakeTransport};
