use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::conversation::constants::{
    DEFAULT_CHAT_MODEL, DEFAULT_MAX_TOKENS, DEFAULT_SYSTEM_PROMPT, RELISTEN_GUARD_DELAY,
    TRIAGE_COMPLETE_MARKER,
};
use crate::conversation::types::{CaptureRequest, OutputModality};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub system_prompt: String,
    pub completion_marker: String,
    pub relisten_guard_delay_ms: u64,
    /// Modality to fix up front instead of deriving it from the first interaction.
    pub output_modality: OutputModality,
    pub event_capacity: usize,
    pub command_capacity: usize,
    pub capture: CaptureConfig,
    pub chat: ChatConfig,
    pub speech: SpeechEngineConfig,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            completion_marker: TRIAGE_COMPLETE_MARKER.to_string(),
            relisten_guard_delay_ms: RELISTEN_GUARD_DELAY.as_millis() as u64,
            output_modality: OutputModality::Undecided,
            event_capacity: 128,
            command_capacity: 32,
            capture: CaptureConfig::default(),
            chat: ChatConfig::default(),
            speech: SpeechEngineConfig::default(),
        }
    }
}

impl ConversationConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn relisten_guard_delay(&self) -> Duration {
        Duration::from_millis(self.relisten_guard_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub locale: String,
    pub max_duration_ms: u64,
    pub silence_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            max_duration_ms: 60_000,
            silence_timeout_ms: 1_500,
        }
    }
}

impl CaptureConfig {
    pub fn request(&self) -> CaptureRequest {
        CaptureRequest {
            locale: self.locale.clone(),
            max_duration: Duration::from_millis(self.max_duration_ms),
            silence_timeout: Duration::from_millis(self.silence_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum SpeechEngineConfig {
    Local {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Remote {
        base_url: String,
        api_key_env: String,
        model: String,
        voice: String,
        player_program: String,
        #[serde(default)]
        player_args: Vec<String>,
    },
}

impl Default for SpeechEngineConfig {
    fn default() -> Self {
        let program = if cfg!(target_os = "macos") {
            "say"
        } else {
            "espeak"
        };
        SpeechEngineConfig::Local {
            program: program.to_string(),
            args: Vec::new(),
        }
    }
}

impl SpeechEngineConfig {
    pub fn remote_defaults() -> Self {
        SpeechEngineConfig::Remote {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            player_program: "ffplay".to_string(),
            player_args: ["-nodisp", "-autoexit", "-loglevel", "quiet", "-"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeechEngineConfig::Local { .. } => "local",
            SpeechEngineConfig::Remote { .. } => "remote",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"system_prompt":"be brief","relisten_guard_delay_ms":50,"chat":{{"max_tokens":120}}}}"#
        )
        .expect("write config");

        let config = ConversationConfig::from_path(file.path()).expect("config loads");
        assert_eq!(config.system_prompt, "be brief");
        assert_eq!(config.relisten_guard_delay(), Duration::from_millis(50));
        assert_eq!(config.chat.max_tokens, 120);
        assert_eq!(config.chat.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.completion_marker, TRIAGE_COMPLETE_MARKER);
        assert_eq!(config.output_modality, OutputModality::Undecided);
    }

    #[test]
    fn remote_engine_section_parses() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"speech":{{"engine":"remote","base_url":"http://localhost:9000/v1","api_key_env":"TTS_KEY","model":"tts-1-hd","voice":"nova","player_program":"mpv"}}}}"#
        )
        .expect("write config");

        let config = ConversationConfig::from_path(file.path()).expect("config loads");
        match config.speech {
            SpeechEngineConfig::Remote {
                voice,
                player_program,
                player_args,
                ..
            } => {
                assert_eq!(voice, "nova");
                assert_eq!(player_program, "mpv");
                assert!(player_args.is_empty());
            }
            other => panic!("unexpected engine: {other:?}"),
        }
    }

    #[test]
    fn invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write config");

        let err = ConversationConfig::from_path(file.path()).expect_err("parse should fail");
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn capture_request_uses_millisecond_fields() {
        let request = CaptureConfig::default().request();
        assert_eq!(request.locale, "en-US");
        assert_eq!(request.silence_timeout, Duration::from_millis(1_500));
    }
}
