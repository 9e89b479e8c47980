use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::conversation::error::ConversationError;
use crate::conversation::types::{CaptureEvent, CaptureRequest, ChatChunk, ChatRequest};

pub type CaptureStream = mpsc::Receiver<Result<CaptureEvent, ConversationError>>;
pub type ChatStream = mpsc::Receiver<ChatChunk>;
pub type SpeechOutputCompletion = oneshot::Receiver<Result<(), ConversationError>>;

/// Speech recognition source. Dropping the returned stream unsubscribes.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    async fn start(&self, request: CaptureRequest) -> Result<CaptureStream, ConversationError>;

    /// Must be safe to call at any time, including right after `start`.
    async fn stop(&self);
}

/// Text to speech. Completion or failure is reported on the returned receiver.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    async fn speak(&self, text: &str) -> Result<SpeechOutputCompletion, ConversationError>;

    async fn stop(&self);

    fn label(&self) -> &'static str;
}

/// Streaming chat completion. Dropping the stream cancels the request.
pub trait ChatCompletion: Send + Sync {
    fn stream(&self, request: ChatRequest) -> ChatStream;
}

/// Platform audio session backing the audio gate.
#[async_trait]
pub trait AudioSession: Send + Sync {
    async fn activate(&self) -> Result<(), ConversationError>;

    async fn deactivate(&self) -> Result<(), ConversationError>;
}
