use std::io::{BufRead, BufReader};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::conversation::config::ChatConfig;
use crate::conversation::error::ConversationError;
use crate::conversation::traits::{ChatCompletion, ChatStream};
use crate::conversation::types::{ChatChunk, ChatRequest};

const TARGET: &str = "chat_completion";
const CHAT_STREAM_CAPACITY: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI-compatible `/chat/completions` client streaming server-sent events.
pub struct HttpChatCompletion {
    config: ChatConfig,
    agent: ureq::Agent,
}

impl HttpChatCompletion {
    pub fn new(config: ChatConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(config.timeout())
            .build();
        Self { config, agent }
    }

    pub(crate) fn payload(&self, request: &ChatRequest) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "stream": true,
            "messages": request.wire_messages(),
        })
    }

    fn api_key(&self) -> Result<String, ConversationError> {
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ConversationError::credential(
                    "chat completion",
                    format!("{} is not set", self.config.api_key_env),
                )
            })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

impl ChatCompletion for HttpChatCompletion {
    fn stream(&self, request: ChatRequest) -> ChatStream {
        let (tx, rx) = mpsc::channel(CHAT_STREAM_CAPACITY);

        let api_key = match self.api_key() {
            Ok(key) => key,
            Err(err) => {
                warn!(target: TARGET, %err, "chat completion skipped");
                if tx.try_send(ChatChunk::Failed(err)).is_err() {
                    debug!(target: TARGET, "chat stream receiver already gone");
                }
                return rx;
            }
        };

        let body = self.payload(&request).to_string();
        let agent = self.agent.clone();
        let url = self.endpoint();
        tokio::task::spawn_blocking(move || run_stream(agent, url, api_key, body, tx));

        rx
    }
}

fn run_stream(
    agent: ureq::Agent,
    url: String,
    api_key: String,
    body: String,
    tx: mpsc::Sender<ChatChunk>,
) {
    let response = match agent
        .post(&url)
        .set("Authorization", &format!("Bearer {api_key}"))
        .set("Content-Type", "application/json")
        .set("Accept", "text/event-stream")
        .send_string(&body)
    {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let detail = response.into_string().unwrap_or_default();
            let err = if code == 401 || code == 403 {
                ConversationError::credential("chat completion", format!("rejected with HTTP {code}"))
            } else {
                ConversationError::transport(format!("HTTP {code}: {}", detail.trim()))
            };
            deliver(&tx, ChatChunk::Failed(err));
            return;
        }
        Err(err) => {
            deliver(&tx, ChatChunk::Failed(ConversationError::transport(err.to_string())));
            return;
        }
    };

    let reader = BufReader::new(response.into_reader());
    for line in reader.lines() {
        if tx.is_closed() {
            debug!(target: TARGET, "chat stream cancelled by receiver");
            return;
        }

        let line = match line {
            Ok(line) => line,
            Err(err) => {
                deliver(&tx, ChatChunk::Failed(ConversationError::transport(err.to_string())));
                return;
            }
        };

        match parse_sse_line(&line) {
            Ok(SseEvent::Delta(text)) => {
                if tx.blocking_send(ChatChunk::Delta(text)).is_err() {
                    debug!(target: TARGET, "chat stream cancelled mid-delta");
                    return;
                }
            }
            Ok(SseEvent::Done) => {
                deliver(&tx, ChatChunk::Done);
                return;
            }
            Ok(SseEvent::Skip) => {}
            Err(ConversationError::MalformedChunk(detail)) => {
                warn!(target: TARGET, %detail, "skipping malformed chat chunk");
            }
            Err(err) => {
                deliver(&tx, ChatChunk::Failed(err));
                return;
            }
        }
    }

    warn!(target: TARGET, "chat stream ended without a [DONE] marker");
    deliver(
        &tx,
        ChatChunk::Failed(ConversationError::transport("stream ended before [DONE]")),
    );
}

fn deliver(tx: &mpsc::Sender<ChatChunk>, chunk: ChatChunk) {
    if tx.blocking_send(chunk).is_err() {
        debug!(target: TARGET, "chat stream receiver dropped");
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

pub(crate) fn parse_sse_line(line: &str) -> Result<SseEvent, ConversationError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };

    let data = data.trim();
    if data.is_empty() {
        return Ok(SseEvent::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|err| ConversationError::MalformedChunk(format!("{err}: {data}")))?;

    if let Some(error) = chunk.error {
        return Err(ConversationError::transport(error.message));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();

    if text.is_empty() {
        Ok(SseEvent::Skip)
    } else {
        Ok(SseEvent::Delta(text))
    }
}
