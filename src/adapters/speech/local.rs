use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::conversation::error::ConversationError;
use crate::conversation::traits::{SpeechOutput, SpeechOutputCompletion};

use super::PlaybackSlot;

const TARGET: &str = "speech_output";

/// On-device synthesis through a system speech command (`say`, `espeak`).
/// The text is passed as the last argument.
pub struct CommandSpeechOutput {
    program: String,
    args: Vec<String>,
    slot: PlaybackSlot,
}

impl CommandSpeechOutput {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            slot: PlaybackSlot::default(),
        }
    }
}

#[async_trait]
impl SpeechOutput for CommandSpeechOutput {
    async fn speak(&self, text: &str) -> Result<SpeechOutputCompletion, ConversationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ConversationError::unavailable("speech output", format!("{}: {err}", self.program))
                }
                _ => ConversationError::transport(format!("failed to start {}: {err}", self.program)),
            })?;

        let (done_tx, done_rx) = oneshot::channel();
        let cancel = self.slot.arm();
        let program = self.program.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => Ok(()),
                    Ok(status) => Err(ConversationError::transport(format!(
                        "{program} exited with {status}"
                    ))),
                    Err(err) => Err(ConversationError::transport(err.to_string())),
                },
                _ = cancel => {
                    if let Err(err) = child.kill().await {
                        warn!(target: TARGET, %err, "failed to stop speech command");
                    }
                    debug!(target: TARGET, "local speech cancelled");
                    return;
                }
            };

            if done_tx.send(outcome).is_err() {
                debug!(target: TARGET, "speech completion receiver dropped");
            }
        });

        Ok(done_rx)
    }

    async fn stop(&self) {
        if self.slot.cancel() {
            debug!(target: TARGET, "stopping local speech");
        }
    }

    fn label(&self) -> &'static str {
        "local"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn reports_completion_when_command_exits() {
        let output = CommandSpeechOutput::new("true".into(), Vec::new());
        let done = output.speak("hello").await.expect("spawn");
        let outcome = timeout(Duration::from_secs(2), done)
            .await
            .expect("completion timed out")
            .expect("completion delivered");
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn reports_error_on_failing_command() {
        let output = CommandSpeechOutput::new("false".into(), Vec::new());
        let done = output.speak("hello").await.expect("spawn");
        let outcome = timeout(Duration::from_secs(2), done)
            .await
            .expect("completion timed out")
            .expect("completion delivered");
        assert!(matches!(outcome, Err(ConversationError::TransportError(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let output = CommandSpeechOutput::new("voicetriage-no-such-tts".into(), Vec::new());
        let err = output.speak("hello").await.expect_err("spawn fails");
        assert!(matches!(err, ConversationError::AdapterUnavailable { .. }));
    }

    #[tokio::test]
    async fn stop_halts_playback_and_is_safe_when_idle() {
        let output = CommandSpeechOutput::new("sleep".into(), Vec::new());
        output.stop().await;

        let done = output.speak("5").await.expect("spawn");
        output.stop().await;
        let outcome = timeout(Duration::from_secs(2), done)
            .await
            .expect("cancellation should resolve promptly");
        assert!(outcome.is_err(), "cancelled speech reports no completion");
    }
}
