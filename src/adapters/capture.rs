use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::conversation::error::ConversationError;
use crate::conversation::traits::{CaptureStream, SpeechCapture};
use crate::conversation::types::{CaptureEvent, CaptureRequest};

const TARGET: &str = "speech_capture";

/// Capture source that treats each line typed on stdin as one final
/// transcript. Useful on machines without a recognizer and in demos.
pub struct ConsoleCapture {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
    active: Mutex<Option<JoinHandle<()>>>,
    _reader: JoinHandle<()>,
}

impl ConsoleCapture {
    pub fn from_stdin() -> Self {
        let (line_tx, line_rx) = mpsc::channel(16);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(target: TARGET, %err, "failed to read console input");
                        break;
                    }
                }
            }
        });
        Self::with_source(line_rx, reader)
    }

    pub fn with_source(lines: mpsc::Receiver<String>, reader: JoinHandle<()>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(lines)),
            active: Mutex::new(None),
            _reader: reader,
        }
    }
}

#[async_trait]
impl SpeechCapture for ConsoleCapture {
    async fn start(&self, request: CaptureRequest) -> Result<CaptureStream, ConversationError> {
        let (tx, rx) = mpsc::channel(4);
        let lines = Arc::clone(&self.lines);

        let task = tokio::spawn(async move {
            let mut lines = lines.lock().await;
            let next = tokio::time::timeout(request.max_duration, lines.recv()).await;
            match next {
                Ok(Some(line)) => {
                    let _ = tx.send(Ok(CaptureEvent::final_result(line))).await;
                }
                Ok(None) => {
                    let _ = tx
                        .send(Err(ConversationError::unavailable(
                            "speech capture",
                            "console input closed",
                        )))
                        .await;
                }
                Err(_) => {
                    debug!(target: TARGET, "no console input before max duration");
                }
            }
        });

        let mut active = self.active.lock().await;
        if let Some(previous) = active.replace(task) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn stop(&self) {
        if let Some(task) = self.active.lock().await.take() {
            task.abort();
        }
    }
}
