use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::conversation::types::{ConversationEvent, ConversationSnapshot};

#[derive(Debug)]
pub enum ConversationCommand {
    StartListening,
    SubmitText(String),
    Stop,
    SetSystemPrompt(String),
    Snapshot(oneshot::Sender<ConversationSnapshot>),
    Shutdown,
}

/// Client side of one conversation session. All mutations are forwarded to
/// the session worker, which applies them in order.
pub struct ConversationHandle {
    command_tx: mpsc::Sender<ConversationCommand>,
    events_tx: broadcast::Sender<ConversationEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ConversationHandle {
    pub(super) fn new(
        command_tx: mpsc::Sender<ConversationCommand>,
        events_tx: broadcast::Sender<ConversationEvent>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            command_tx,
            events_tx,
            worker: Some(worker),
        }
    }

    pub async fn start_listening(&self) -> Result<(), mpsc::error::SendError<ConversationCommand>> {
        self.send(ConversationCommand::StartListening).await
    }

    pub async fn submit_text<S: Into<String>>(
        &self,
        text: S,
    ) -> Result<(), mpsc::error::SendError<ConversationCommand>> {
        self.send(ConversationCommand::SubmitText(text.into()))
            .await
    }

    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<ConversationCommand>> {
        self.send(ConversationCommand::Stop).await
    }

    /// Takes effect when the next turn begins.
    pub async fn set_system_prompt<S: Into<String>>(
        &self,
        prompt: S,
    ) -> Result<(), mpsc::error::SendError<ConversationCommand>> {
        self.send(ConversationCommand::SetSystemPrompt(prompt.into()))
            .await
    }

    pub async fn snapshot(&self) -> Result<ConversationSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ConversationCommand::Snapshot(reply_tx))
            .await
            .map_err(|_| anyhow!("conversation worker is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("conversation worker dropped snapshot request"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events_tx.subscribe()
    }

    /// Stops the active turn, releases adapters and waits for the worker.
    pub async fn shutdown(mut self) {
        if let Err(err) = self.command_tx.send(ConversationCommand::Shutdown).await {
            warn!(
                target: "conversation_worker",
                %err,
                "conversation worker already stopped"
            );
        }
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(
                    target: "conversation_worker",
                    %err,
                    "conversation worker ended abnormally"
                );
            }
        }
    }

    async fn send(
        &self,
        command: ConversationCommand,
    ) -> Result<(), mpsc::error::SendError<ConversationCommand>> {
        match self.command_tx.send(command).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    target: "conversation_worker",
                    %err,
                    "failed to enqueue conversation command"
                );
                Err(err)
            }
        }
    }
}

impl Drop for ConversationHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
