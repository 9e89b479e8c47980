use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::conversation::error::ConversationError;
use crate::conversation::traits::AudioSession;

/// Desktop audio session. There is no OS-level session to negotiate, so this
/// only tracks the activation flag for diagnostics.
#[derive(Debug, Default)]
pub struct LocalAudioSession {
    active: AtomicBool,
}

impl LocalAudioSession {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSession for LocalAudioSession {
    async fn activate(&self) -> Result<(), ConversationError> {
        if !self.active.swap(true, Ordering::SeqCst) {
            debug!(target: "audio_gate", "audio session activated");
        }
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), ConversationError> {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!(target: "audio_gate", "audio session deactivated");
        }
        Ok(())
    }
}
