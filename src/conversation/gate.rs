use std::sync::Arc;

use tracing::{info, warn};

use crate::conversation::error::ConversationError;
use crate::conversation::traits::AudioSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateHolder {
    Listening,
    Speaking,
}

impl GateHolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateHolder::Listening => "listening",
            GateHolder::Speaking => "speaking",
        }
    }
}

/// Exclusive owner record for the shared audio session.
///
/// Only one holder exists at a time. Passing an active session from one holder
/// to the other is a handover and does not re-activate the device.
pub(crate) struct AudioGate {
    session: Arc<dyn AudioSession>,
    holder: Option<GateHolder>,
}

impl AudioGate {
    pub(crate) fn new(session: Arc<dyn AudioSession>) -> Self {
        Self {
            session,
            holder: None,
        }
    }

    pub(crate) fn holder(&self) -> Option<GateHolder> {
        self.holder
    }

    pub(crate) async fn acquire(&mut self, holder: GateHolder) -> Result<(), ConversationError> {
        match self.holder {
            Some(current) if current == holder => Ok(()),
            Some(current) => {
                info!(
                    target: "audio_gate",
                    from = current.as_str(),
                    to = holder.as_str(),
                    "handing over audio session"
                );
                self.holder = Some(holder);
                Ok(())
            }
            None => {
                self.session.activate().await.map_err(|err| match err {
                    ConversationError::ResourceContention(_) => err,
                    other => ConversationError::contention(other.to_string()),
                })?;
                self.holder = Some(holder);
                Ok(())
            }
        }
    }

    /// Deactivates the session if held. The holder is cleared even when the
    /// platform refuses to deactivate so later acquires start from a clean slate.
    pub(crate) async fn release(&mut self) -> Result<(), ConversationError> {
        let Some(holder) = self.holder.take() else {
            return Ok(());
        };

        if let Err(err) = self.session.deactivate().await {
            warn!(
                target: "audio_gate",
                holder = holder.as_str(),
                %err,
                "failed to deactivate audio session"
            );
            return Err(ConversationError::contention(err.to_string()));
        }
        Ok(())
    }
}
