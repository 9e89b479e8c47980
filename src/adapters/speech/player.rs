use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::conversation::error::ConversationError;

use super::PlaybackSlot;

/// Plays an encoded audio clip to completion.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, audio: Bytes) -> Result<(), ConversationError>;

    async fn stop(&self);
}

/// Pipes the clip into an external player reading from stdin (`ffplay -`, `mpv -`).
pub struct CommandAudioPlayer {
    program: String,
    args: Vec<String>,
    slot: PlaybackSlot,
}

impl CommandAudioPlayer {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            slot: PlaybackSlot::default(),
        }
    }
}

#[async_trait]
impl AudioPlayer for CommandAudioPlayer {
    async fn play(&self, audio: Bytes) -> Result<(), ConversationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ConversationError::unavailable("audio playback", format!("{}: {err}", self.program))
                }
                _ => ConversationError::transport(format!("failed to start {}: {err}", self.program)),
            })?;

        let cancel = self.slot.arm();

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(&audio).await {
                warn!(target: "speech_output", %err, "player closed its input early");
            }
        }

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(ConversationError::transport(format!(
                    "{} exited with {status}",
                    self.program
                ))),
                Err(err) => Err(ConversationError::transport(err.to_string())),
            },
            _ = cancel => {
                if let Err(err) = child.kill().await {
                    warn!(target: "speech_output", %err, "failed to stop audio player");
                }
                debug!(target: "speech_output", "audio playback cancelled");
                Err(ConversationError::transport("playback cancelled"))
            }
        }
    }

    async fn stop(&self) {
        self.slot.cancel();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_clip_through_stdin() {
        let player = CommandAudioPlayer::new("cat".into(), Vec::new());
        player
            .play(Bytes::from_static(b"ID3fake-mp3"))
            .await
            .expect("cat consumes stdin and exits cleanly");
    }

    #[tokio::test]
    async fn missing_player_is_unavailable() {
        let player = CommandAudioPlayer::new("voicetriage-no-such-player".into(), Vec::new());
        let err = player
            .play(Bytes::from_static(b"x"))
            .await
            .expect_err("spawn fails");
        assert!(matches!(err, ConversationError::AdapterUnavailable { .. }));
    }
}
