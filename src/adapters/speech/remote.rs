use std::io::Read;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::conversation::error::ConversationError;
use crate::conversation::traits::{SpeechOutput, SpeechOutputCompletion};

use super::player::AudioPlayer;
use super::PlaybackSlot;

const TARGET: &str = "speech_output";
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CLIP_BYTES: u64 = 16 * 1024 * 1024;

/// Voice and model for remote synthesis. Shared with callers so either can be
/// changed at any time; the next `speak` call picks up the new values.
#[derive(Debug, Clone)]
pub struct VoiceSelection {
    inner: Arc<RwLock<(String, String)>>,
}

impl VoiceSelection {
    pub fn new(voice: String, model: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new((voice, model))),
        }
    }

    pub fn set_voice<S: Into<String>>(&self, voice: S) {
        if let Ok(mut guard) = self.inner.write() {
            guard.0 = voice.into();
        }
    }

    pub fn set_model<S: Into<String>>(&self, model: S) {
        if let Ok(mut guard) = self.inner.write() {
            guard.1 = model.into();
        }
    }

    /// Current `(voice, model)` pair.
    pub fn current(&self) -> Result<(String, String)> {
        self.inner
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow!("voice selection lock poisoned"))
    }
}

/// OpenAI-compatible `/audio/speech` synthesis played through an [`AudioPlayer`].
pub struct RemoteSpeechOutput {
    base_url: String,
    api_key_env: String,
    selection: VoiceSelection,
    player: Arc<dyn AudioPlayer>,
    agent: ureq::Agent,
    slot: PlaybackSlot,
}

impl RemoteSpeechOutput {
    pub fn new(
        base_url: String,
        api_key_env: String,
        selection: VoiceSelection,
        player: Arc<dyn AudioPlayer>,
    ) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(anyhow!("remote speech engine requires a base_url"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(SYNTHESIS_TIMEOUT)
            .build();
        Ok(Self {
            base_url,
            api_key_env,
            selection,
            player,
            agent,
            slot: PlaybackSlot::default(),
        })
    }

    pub fn voice_selection(&self) -> VoiceSelection {
        self.selection.clone()
    }

    fn api_key(&self) -> Result<String, ConversationError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ConversationError::credential(
                    "speech synthesis",
                    format!("{} is not set", self.api_key_env),
                )
            })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechOutput for RemoteSpeechOutput {
    async fn speak(&self, text: &str) -> Result<SpeechOutputCompletion, ConversationError> {
        let api_key = self.api_key()?;
        let (voice, model) = self
            .selection
            .current()
            .map_err(|err| ConversationError::unavailable("speech synthesis", err.to_string()))?;

        let body = json!({
            "model": model,
            "voice": voice,
            "input": text,
            "response_format": "mp3",
        })
        .to_string();

        let (done_tx, done_rx) = oneshot::channel();
        let mut cancel = self.slot.arm();
        let agent = self.agent.clone();
        let url = self.endpoint();
        let player = Arc::clone(&self.player);

        info!(target: TARGET, %voice, %model, chars = text.len(), "requesting remote synthesis");

        tokio::spawn(async move {
            let synthesis =
                tokio::task::spawn_blocking(move || synthesize(agent, url, api_key, body));

            let clip = tokio::select! {
                joined = synthesis => match joined {
                    Ok(Ok(clip)) => clip,
                    Ok(Err(err)) => {
                        let _ = done_tx.send(Err(err));
                        return;
                    }
                    Err(err) => {
                        let _ = done_tx.send(Err(ConversationError::transport(err.to_string())));
                        return;
                    }
                },
                _ = &mut cancel => {
                    debug!(target: TARGET, "remote speech cancelled before playback");
                    return;
                }
            };

            let outcome = tokio::select! {
                played = player.play(clip) => played,
                _ = &mut cancel => {
                    player.stop().await;
                    debug!(target: TARGET, "remote speech cancelled during playback");
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
        self.slot.cancel();
        self.player.stop().await;
    }

    fn label(&self) -> &'static str {
        "remote"
    }
}

fn synthesize(
    agent: ureq::Agent,
    url: String,
    api_key: String,
    body: String,
) -> Result<Bytes, ConversationError> {
    let response = agent
        .post(&url)
        .set("Authorization", &format!("Bearer {api_key}"))
        .set("Content-Type", "application/json")
        .send_string(&body)
        .map_err(|err| match err {
            ureq::Error::Status(401, _) | ureq::Error::Status(403, _) => {
                ConversationError::credential("speech synthesis", "API key rejected")
            }
            ureq::Error::Status(code, _) => {
                ConversationError::transport(format!("speech synthesis returned HTTP {code}"))
            }
            other => ConversationError::transport(other.to_string()),
        })?;

    let mut clip = Vec::new();
    response
        .into_reader()
        .take(MAX_CLIP_BYTES)
        .read_to_end(&mut clip)
        .map_err(|err| ConversationError::transport(format!("failed to read audio: {err}")))?;

    if clip.is_empty() {
        return Err(ConversationError::transport("speech synthesis returned no audio"));
    }
    Ok(Bytes::from(clip))
}
