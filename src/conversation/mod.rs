//! Conversation orchestration: state machine, message store and audio gate.

mod constants;
mod engine;
mod gate;
mod runtime;
mod session;
mod store;

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{CaptureConfig, ChatConfig, ConversationConfig, SpeechEngineConfig};
pub use engine::{ConversationComponents, ConversationOrchestrator};
pub use error::ConversationError;
pub use gate::GateHolder;
pub use runtime::{ConversationCommand, ConversationHandle};
pub use traits::{
    AudioSession, CaptureStream, ChatCompletion, ChatStream, SpeechCapture, SpeechOutput,
    SpeechOutputCompletion,
};
pub use types::{
    Author, CaptureEvent, CaptureRequest, ChatChunk, ChatMessage, ChatRequest, ChatRole,
    ConversationEvent, ConversationSnapshot, ConversationState, Message, OutputModality,
};

#[cfg(test)]
mod tests;
