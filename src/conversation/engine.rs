use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::info;

use crate::adapters::audio_session::LocalAudioSession;
use crate::adapters::chat::HttpChatCompletion;
use crate::adapters::speech::{build_speech_output, VoiceSelection};
use crate::conversation::config::ConversationConfig;
use crate::conversation::runtime::{self, ConversationHandle};
use crate::conversation::traits::{AudioSession, ChatCompletion, SpeechCapture, SpeechOutput};
use crate::conversation::types::ConversationEvent;

/// The collaborators one conversation session drives.
#[derive(Clone)]
pub struct ConversationComponents {
    pub capture: Arc<dyn SpeechCapture>,
    pub output: Arc<dyn SpeechOutput>,
    pub chat: Arc<dyn ChatCompletion>,
    pub audio_session: Arc<dyn AudioSession>,
}

pub struct ConversationOrchestrator {
    config: ConversationConfig,
    components: ConversationComponents,
    voice_selection: Option<VoiceSelection>,
}

impl ConversationOrchestrator {
    /// Builds the HTTP chat adapter and the configured speech engine around
    /// the given capture source.
    pub fn new(config: ConversationConfig, capture: Arc<dyn SpeechCapture>) -> Result<Self> {
        let engine = build_speech_output(&config.speech)?;
        let chat: Arc<dyn ChatCompletion> = Arc::new(HttpChatCompletion::new(config.chat.clone()));
        let orchestrator = Self::with_components(
            config,
            ConversationComponents {
                capture,
                output: engine.output,
                chat,
                audio_session: Arc::new(LocalAudioSession::default()),
            },
        );
        Ok(Self {
            voice_selection: engine.voice_selection,
            ..orchestrator
        })
    }

    pub fn with_components(config: ConversationConfig, components: ConversationComponents) -> Self {
        Self {
            config,
            components,
            voice_selection: None,
        }
    }

    /// Voice and model of the remote speech engine. Changes apply from the
    /// next utterance. `None` for engines without a selectable voice.
    pub fn voice_selection(&self) -> Option<VoiceSelection> {
        self.voice_selection.clone()
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn speech_output(&self) -> Arc<dyn SpeechOutput> {
        Arc::clone(&self.components.output)
    }

    /// Starts an isolated session; every call gets its own state and history.
    pub fn start_session(&self) -> (ConversationHandle, broadcast::Receiver<ConversationEvent>) {
        info!(
            target: "conversation_orchestrator",
            speech_engine = self.components.output.label(),
            model = %self.config.chat.model,
            "starting conversation session"
        );
        runtime::spawn_conversation(&self.config, &self.components)
    }
}
