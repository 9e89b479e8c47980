//! Speech output engines. Both variants honour the same contract: `speak`
//! returns a completion receiver, `stop` halts playback and is always safe.

mod local;
mod player;
mod remote;

pub use local::CommandSpeechOutput;
pub use player::{AudioPlayer, CommandAudioPlayer};
pub use remote::{RemoteSpeechOutput, VoiceSelection};

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::oneshot;
use tracing::warn;

use crate::conversation::config::SpeechEngineConfig;
use crate::conversation::traits::SpeechOutput;

/// A configured speech engine. `voice_selection` is set for the remote engine
/// so callers can change voice and model while it is in use.
pub struct SpeechEngine {
    pub output: Arc<dyn SpeechOutput>,
    pub voice_selection: Option<VoiceSelection>,
}

pub fn build_speech_output(config: &SpeechEngineConfig) -> Result<SpeechEngine> {
    let engine = match config {
        SpeechEngineConfig::Local { program, args } => SpeechEngine {
            output: Arc::new(CommandSpeechOutput::new(program.clone(), args.clone())),
            voice_selection: None,
        },
        SpeechEngineConfig::Remote {
            base_url,
            api_key_env,
            model,
            voice,
            player_program,
            player_args,
        } => {
            let player = Arc::new(CommandAudioPlayer::new(
                player_program.clone(),
                player_args.clone(),
            ));
            let selection = VoiceSelection::new(voice.clone(), model.clone());
            let output = RemoteSpeechOutput::new(
                base_url.clone(),
                api_key_env.clone(),
                selection.clone(),
                player,
            )?;
            SpeechEngine {
                output: Arc::new(output),
                voice_selection: Some(selection),
            }
        }
    };
    Ok(engine)
}

/// Cancellation slot for the utterance currently playing. Arming a new one
/// cancels the previous utterance.
#[derive(Debug, Default)]
pub(crate) struct PlaybackSlot {
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl PlaybackSlot {
    pub(crate) fn arm(&self) -> oneshot::Receiver<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        match self.cancel.lock() {
            Ok(mut guard) => {
                if let Some(previous) = guard.replace(cancel_tx) {
                    let _ = previous.send(());
                }
            }
            Err(err) => {
                warn!(target: "speech_output", %err, "playback slot poisoned");
            }
        }
        cancel_rx
    }

    pub(crate) fn cancel(&self) -> bool {
        match self.cancel.lock() {
            Ok(mut guard) => guard.take().map(|tx| tx.send(()).is_ok()).unwrap_or(false),
            Err(err) => {
                warn!(target: "speech_output", %err, "playback slot poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_engine_matching_config() {
        let local = build_speech_output(&SpeechEngineConfig::Local {
            program: "espeak".into(),
            args: Vec::new(),
        })
        .expect("local engine");
        assert_eq!(local.output.label(), "local");
        assert!(local.voice_selection.is_none());

        let remote = build_speech_output(&SpeechEngineConfig::remote_defaults()).expect("remote engine");
        assert_eq!(remote.output.label(), "remote");
        let selection = remote.voice_selection.expect("remote engine exposes its voice");
        assert_eq!(
            selection.current().expect("readable"),
            ("alloy".to_string(), "tts-1".to_string())
        );
    }

    #[tokio::test]
    async fn arming_cancels_previous_utterance() {
        let slot = PlaybackSlot::default();
        let first = slot.arm();
        let _second = slot.arm();
        assert!(first.await.is_ok());
        assert!(slot.cancel());
        assert!(!slot.cancel());
    }
}
