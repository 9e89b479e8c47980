use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use crate::conversation::gate::GateHolder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Listening => "listening",
            ConversationState::Processing => "processing",
            ConversationState::Speaking => "speaking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputModality {
    Voice,
    Text,
    Undecided,
}

impl Default for OutputModality {
    fn default() -> Self {
        OutputModality::Undecided
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub content: String,
    pub author: Author,
    pub created_at: SystemTime,
    pub is_partial: bool,
    /// Error notices are shown in the conversation but never sent upstream.
    pub is_error: bool,
}

impl Message {
    pub(crate) fn new(id: u64, author: Author, content: String, is_partial: bool) -> Self {
        Self {
            id,
            content,
            author,
            created_at: SystemTime::now(),
            is_partial,
            is_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    StateChanged(ConversationState),
    MessageUpserted(Message),
    MessageRemoved(u64),
    RawTranscript(String),
    TriageCompleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSnapshot {
    pub state: ConversationState,
    pub messages: Vec<Message>,
    pub output_modality: OutputModality,
    pub triage_complete: bool,
    pub system_prompt: String,
    pub audio_holder: Option<GateHolder>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub locale: String,
    pub max_duration: Duration,
    pub silence_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureEvent {
    pub text: String,
    pub is_final: bool,
}

impl CaptureEvent {
    pub fn partial<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_result<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// One upstream request: the system instruction plus finalized turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Messages in wire order with the system instruction prepended once.
    pub fn wire_messages(&self) -> Vec<ChatMessage> {
        let mut wire = Vec::with_capacity(self.messages.len() + 1);
        if !self.system_prompt.trim().is_empty() {
            wire.push(ChatMessage {
                role: ChatRole::System,
                content: self.system_prompt.clone(),
            });
        }
        wire.extend(
            self.messages
                .iter()
                .filter(|message| message.role != ChatRole::System)
                .cloned(),
        );
        wire
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    Delta(String),
    Done,
    Failed(crate::conversation::error::ConversationError),
}
