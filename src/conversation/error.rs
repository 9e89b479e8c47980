use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("{capability} unavailable: {reason}")]
    AdapterUnavailable {
        capability: &'static str,
        reason: String,
    },
    #[error("missing credential for {service}: {reason}")]
    CredentialMissing {
        service: &'static str,
        reason: String,
    },
    #[error("transport failure: {0}")]
    TransportError(String),
    #[error("malformed stream chunk: {0}")]
    MalformedChunk(String),
    #[error("audio session contention: {0}")]
    ResourceContention(String),
}

impl ConversationError {
    pub fn unavailable<S: Into<String>>(capability: &'static str, reason: S) -> Self {
        Self::AdapterUnavailable {
            capability,
            reason: reason.into(),
        }
    }

    pub fn credential<S: Into<String>>(service: &'static str, reason: S) -> Self {
        Self::CredentialMissing {
            service,
            reason: reason.into(),
        }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::TransportError(message.into())
    }

    pub fn contention<S: Into<String>>(message: S) -> Self {
        Self::ResourceContention(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConversationError::AdapterUnavailable { .. } => "adapter_unavailable",
            ConversationError::CredentialMissing { .. } => "credential_missing",
            ConversationError::TransportError(_) => "transport_error",
            ConversationError::MalformedChunk(_) => "malformed_chunk",
            ConversationError::ResourceContention(_) => "resource_contention",
        }
    }

    /// Text appended to the conversation when this error ends a turn.
    pub fn user_message(&self) -> String {
        match self {
            ConversationError::AdapterUnavailable { capability, .. } => {
                format!("{capability} is not available on this device. You can keep going by typing.")
            }
            ConversationError::CredentialMissing { service, .. } => {
                format!("The {service} service is not configured. Please add an API key and try again.")
            }
            ConversationError::TransportError(_) | ConversationError::MalformedChunk(_) => {
                "I'm having trouble connecting right now. Please try again.".to_string()
            }
            ConversationError::ResourceContention(_) => {
                "The microphone or speaker is busy. Please try again in a moment.".to_string()
            }
        }
    }
}
