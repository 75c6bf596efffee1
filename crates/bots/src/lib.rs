pub mod engine;
pub mod generator;
pub mod probability;

pub use engine::BotInterjectionEngine;
pub use generator::{FALLBACK_REPLY, GenerationRequest, HttpReplyGenerator, ReplyGenerator};
pub use probability::{
    HistoryFeatures, calculate_interjection_probability, draw, is_addressed,
};
