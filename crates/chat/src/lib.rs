pub mod channel;
pub mod notify;
pub mod typing;

pub use channel::{ChatError, ChatEvent, ChatMessageChannel};
pub use notify::{HttpMessageNotifier, MessageNotification, MessageNotifier};
pub use typing::TypingTracker;
