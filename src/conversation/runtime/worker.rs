use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant as TokioInstant};
use tracing::{debug, info, warn};

use crate::conversation::error::ConversationError;
use crate::conversation::gate::{AudioGate, GateHolder};
use crate::conversation::runtime::handle::ConversationCommand;
use crate::conversation::session::SessionContext;
use crate::conversation::store::MessageStore;
use crate::conversation::traits::{
    CaptureStream, ChatCompletion, ChatStream, SpeechCapture, SpeechOutput,
    SpeechOutputCompletion,
};
use crate::conversation::types::{
    CaptureEvent, CaptureRequest, ChatChunk, ChatRequest, ConversationEvent,
    ConversationSnapshot, ConversationState, OutputModality,
};
use crate::telemetry::events::{
    record_adapter_failure, record_state_transition, record_triage_complete,
    record_turn_completed,
};

const TARGET: &str = "conversation_worker";

/// Single owner of the conversation state.
///
/// Every adapter subscription lives in an `Option` for the duration of one
/// phase and is dropped on the way out, so events from a previous phase can
/// not reach the handlers. Handlers still check the current state before
/// acting on anything.
pub(crate) struct ConversationWorker {
    command_rx: mpsc::Receiver<ConversationCommand>,
    events_tx: broadcast::Sender<ConversationEvent>,
    capture: Arc<dyn SpeechCapture>,
    output: Arc<dyn SpeechOutput>,
    chat: Arc<dyn ChatCompletion>,
    gate: AudioGate,
    session: SessionContext,
    store: MessageStore,
    state: ConversationState,
    capture_request: CaptureRequest,
    relisten_guard_delay: Duration,
    capture_rx: Option<CaptureStream>,
    chat_rx: Option<ChatStream>,
    output_rx: Option<SpeechOutputCompletion>,
    relisten_at: Option<TokioInstant>,
    capture_unavailable: bool,
    turn_started: Option<Instant>,
    completed_turns: usize,
}

impl ConversationWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        command_rx: mpsc::Receiver<ConversationCommand>,
        events_tx: broadcast::Sender<ConversationEvent>,
        capture: Arc<dyn SpeechCapture>,
        output: Arc<dyn SpeechOutput>,
        chat: Arc<dyn ChatCompletion>,
        gate: AudioGate,
        session: SessionContext,
        capture_request: CaptureRequest,
        relisten_guard_delay: Duration,
    ) -> Self {
        Self {
            command_rx,
            events_tx,
            capture,
            output,
            chat,
            gate,
            session,
            store: MessageStore::default(),
            state: ConversationState::Idle,
            capture_request,
            relisten_guard_delay,
            capture_rx: None,
            chat_rx: None,
            output_rx: None,
            relisten_at: None,
            capture_unavailable: false,
            turn_started: None,
            completed_turns: 0,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(ConversationCommand::Shutdown) | None => {
                            self.stop_turn("shutdown").await;
                            break;
                        }
                        Some(command) => {
                            self.handle_command(command).await;
                        }
                    }
                }

                event = next_item(&mut self.capture_rx) => {
                    self.handle_capture(event).await;
                }

                chunk = next_item(&mut self.chat_rx) => {
                    self.handle_chat(chunk).await;
                }

                outcome = next_completion(&mut self.output_rx) => {
                    self.handle_output(outcome).await;
                }

                _ = wait_until(self.relisten_at) => {
                    self.handle_relisten().await;
                }
            }
        }

        debug!(target: TARGET, "conversation worker exited");
    }

    async fn handle_command(&mut self, command: ConversationCommand) {
        match command {
            ConversationCommand::StartListening => self.start_listening().await,
            ConversationCommand::SubmitText(text) => self.submit_text(text).await,
            ConversationCommand::Stop => self.stop_turn("stop requested").await,
            ConversationCommand::SetSystemPrompt(prompt) => {
                self.session.queue_system_prompt(prompt);
                if self.state == ConversationState::Idle {
                    self.session.begin_turn();
                }
            }
            ConversationCommand::Snapshot(reply) => {
                if reply.send(self.snapshot()).is_err() {
                    debug!(target: TARGET, "snapshot requester went away");
                }
            }
            ConversationCommand::Shutdown => self.stop_turn("shutdown").await,
        }
    }

    async fn start_listening(&mut self) {
        match self.state {
            ConversationState::Listening => {
                debug!(target: TARGET, "already listening");
                return;
            }
            ConversationState::Processing | ConversationState::Speaking => {
                warn!(
                    target: TARGET,
                    state = self.state.as_str(),
                    "start_listening ignored while a turn is in flight"
                );
                return;
            }
            ConversationState::Idle => {}
        }

        if self.session.triage_complete() {
            info!(target: TARGET, "triage complete, not re-entering listening");
            return;
        }

        if self.capture_unavailable {
            warn!(
                target: TARGET,
                "speech capture unavailable, start_listening ignored"
            );
            return;
        }

        self.session.fix_modality(OutputModality::Voice);

        if let Err(err) = self.gate.acquire(GateHolder::Listening).await {
            self.fail_turn(err, "audio gate refused listening").await;
            return;
        }

        if self.begin_capture().await {
            self.transition(ConversationState::Listening, "start_listening");
        }
    }

    async fn submit_text(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            warn!(target: TARGET, "ignoring empty text submission");
            return;
        }

        match self.state {
            ConversationState::Processing | ConversationState::Speaking => {
                warn!(
                    target: TARGET,
                    state = self.state.as_str(),
                    "text submission ignored while a turn is in flight"
                );
                return;
            }
            ConversationState::Listening => {
                self.relisten_at = None;
                if self.capture_rx.take().is_some() {
                    self.capture.stop().await;
                }
                if let Some(id) = self.store.discard_user_partial() {
                    self.emit(ConversationEvent::MessageRemoved(id));
                }
                self.release_gate().await;
            }
            ConversationState::Idle => {}
        }

        self.session.fix_modality(OutputModality::Text);
        let message = self.store.finalize_user(&text);
        self.emit(ConversationEvent::MessageUpserted(message));
        self.request_reply("text submission");
    }

    async fn begin_capture(&mut self) -> bool {
        match self.capture.start(self.capture_request.clone()).await {
            Ok(stream) => {
                self.capture_rx = Some(stream);
                true
            }
            Err(err) => {
                if matches!(err, ConversationError::AdapterUnavailable { .. }) {
                    let already_reported = self.capture_unavailable;
                    self.capture_unavailable = true;
                    if already_reported {
                        self.release_gate().await;
                        self.transition(ConversationState::Idle, "capture unavailable");
                        return false;
                    }
                }
                self.fail_turn(err, "capture failed to start").await;
                false
            }
        }
    }

    async fn handle_capture(&mut self, event: Option<Result<CaptureEvent, ConversationError>>) {
        if self.state != ConversationState::Listening {
            debug!(
                target: TARGET,
                state = self.state.as_str(),
                "discarding stale capture event"
            );
            self.capture_rx = None;
            return;
        }

        match event {
            Some(Ok(event)) if event.is_final => {
                self.emit(ConversationEvent::RawTranscript(event.text.clone()));
                self.complete_utterance(event.text).await;
            }
            Some(Ok(event)) => {
                self.emit(ConversationEvent::RawTranscript(event.text.clone()));
                if event.text.trim().is_empty() && !self.store.has_pending_user() {
                    return;
                }
                let message = self.store.upsert_user_partial(&event.text);
                self.emit(ConversationEvent::MessageUpserted(message));
            }
            Some(Err(err)) => {
                if matches!(err, ConversationError::AdapterUnavailable { .. }) {
                    self.capture_unavailable = true;
                }
                self.fail_turn(err, "capture failed").await;
            }
            None => {
                self.capture_rx = None;
                let pending = self
                    .store
                    .pending_user_text()
                    .filter(|text| !text.trim().is_empty())
                    .map(str::to_string);
                match pending {
                    Some(text) => {
                        info!(
                            target: TARGET,
                            "capture ended without a final result, promoting partial transcript"
                        );
                        self.complete_utterance(text).await;
                    }
                    None => {
                        if let Some(id) = self.store.discard_user_partial() {
                            self.emit(ConversationEvent::MessageRemoved(id));
                        }
                        self.release_gate().await;
                        self.transition(ConversationState::Idle, "capture ended");
                    }
                }
            }
        }
    }

    async fn complete_utterance(&mut self, text: String) {
        if self.capture_rx.take().is_some() {
            self.capture.stop().await;
        }

        let text = text.trim();
        if text.is_empty() {
            if let Some(id) = self.store.discard_user_partial() {
                self.emit(ConversationEvent::MessageRemoved(id));
            }
            self.release_gate().await;
            self.transition(ConversationState::Idle, "empty utterance");
            return;
        }

        let message = self.store.finalize_user(text);
        self.emit(ConversationEvent::MessageUpserted(message));
        self.release_gate().await;
        self.request_reply("final transcript");
    }

    fn request_reply(&mut self, reason: &str) {
        self.session.begin_turn();
        self.turn_started = Some(Instant::now());
        self.transition(ConversationState::Processing, reason);

        let request = ChatRequest {
            system_prompt: self.session.system_prompt().to_string(),
            messages: self.store.upstream_history(),
        };
        debug!(
            target: TARGET,
            messages = request.messages.len(),
            "requesting chat completion"
        );
        self.chat_rx = Some(self.chat.stream(request));
    }

    async fn handle_chat(&mut self, chunk: Option<ChatChunk>) {
        if self.state != ConversationState::Processing {
            debug!(
                target: TARGET,
                state = self.state.as_str(),
                "discarding stale chat chunk"
            );
            self.chat_rx = None;
            return;
        }

        match chunk {
            Some(ChatChunk::Delta(delta)) => {
                if delta.is_empty() {
                    return;
                }
                let message = self.store.append_assistant_delta(&delta);
                self.emit(ConversationEvent::MessageUpserted(message));
            }
            Some(ChatChunk::Done) => {
                self.chat_rx = None;
                self.complete_reply().await;
            }
            Some(ChatChunk::Failed(err)) => {
                self.chat_rx = None;
                self.fail_turn(err, "chat stream failed").await;
            }
            None => {
                self.chat_rx = None;
                self.fail_turn(
                    ConversationError::transport("chat stream closed before completion"),
                    "chat stream closed",
                )
                .await;
            }
        }
    }

    async fn complete_reply(&mut self) {
        let latency = self
            .turn_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.completed_turns = self.completed_turns.saturating_add(1);

        let Some(raw) = self.store.pending_assistant_text().map(str::to_string) else {
            info!(target: TARGET, "chat stream finished without content");
            record_turn_completed(latency, 0, false, self.session.triage_complete());
            self.transition(ConversationState::Idle, "empty reply");
            return;
        };

        let (cleaned, newly_complete) = self.session.scan_completion(&raw);
        if cleaned.is_empty() {
            if let Some(id) = self.store.discard_assistant_partial() {
                self.emit(ConversationEvent::MessageRemoved(id));
            }
        } else if let Some(message) = self.store.finalize_assistant(cleaned.clone()) {
            self.emit(ConversationEvent::MessageUpserted(message));
        }

        if newly_complete {
            record_triage_complete(self.completed_turns);
            self.emit(ConversationEvent::TriageCompleted);
        }

        let speak = !cleaned.is_empty() && self.session.output_modality() == OutputModality::Voice;
        record_turn_completed(
            latency,
            cleaned.chars().count(),
            speak,
            self.session.triage_complete(),
        );

        if !speak {
            self.transition(ConversationState::Idle, "reply finalized");
            return;
        }

        self.begin_speaking(cleaned).await;
    }

    async fn begin_speaking(&mut self, text: String) {
        if let Err(err) = self.gate.acquire(GateHolder::Speaking).await {
            self.fail_turn(err, "audio gate refused speaking").await;
            return;
        }

        self.transition(ConversationState::Speaking, "reply ready");
        match self.output.speak(&text).await {
            Ok(completion) => {
                self.output_rx = Some(completion);
            }
            Err(err) => {
                self.fail_turn(err, "speech output failed to start").await;
            }
        }
    }

    async fn handle_output(
        &mut self,
        outcome: Result<Result<(), ConversationError>, oneshot::error::RecvError>,
    ) {
        self.output_rx = None;
        if self.state != ConversationState::Speaking {
            debug!(
                target: TARGET,
                state = self.state.as_str(),
                "discarding stale speech output result"
            );
            return;
        }

        match outcome {
            Ok(Ok(())) if self.session.triage_complete() => {
                self.release_gate().await;
                self.transition(ConversationState::Idle, "triage complete");
            }
            Ok(Ok(())) => {
                if let Err(err) = self.gate.acquire(GateHolder::Listening).await {
                    self.fail_turn(err, "audio gate refused re-listen").await;
                    return;
                }
                self.transition(ConversationState::Listening, "reply spoken");
                self.relisten_at = Some(TokioInstant::now() + self.relisten_guard_delay);
            }
            Ok(Err(err)) => {
                self.fail_turn(err, "speech output failed").await;
            }
            Err(_) => {
                self.fail_turn(
                    ConversationError::transport("speech output ended without a result"),
                    "speech output dropped",
                )
                .await;
            }
        }
    }

    async fn handle_relisten(&mut self) {
        self.relisten_at = None;
        if self.state != ConversationState::Listening || self.capture_rx.is_some() {
            return;
        }
        self.begin_capture().await;
    }

    /// Aborts the current turn: cancels adapters, drops partial messages,
    /// releases the gate and leaves one visible error notice.
    async fn fail_turn(&mut self, err: ConversationError, reason: &str) {
        warn!(target: TARGET, %err, reason, "conversation turn failed");
        record_adapter_failure(err.kind(), &err.to_string());

        self.relisten_at = None;
        self.chat_rx = None;
        if self.capture_rx.take().is_some() {
            self.capture.stop().await;
        }
        if self.output_rx.take().is_some() {
            self.output.stop().await;
        }
        self.discard_partials();
        self.release_gate().await;
        self.turn_started = None;

        let message = self.store.push_error(err.user_message());
        self.emit(ConversationEvent::MessageUpserted(message));
        self.transition(ConversationState::Idle, reason);
    }

    async fn stop_turn(&mut self, reason: &str) {
        self.relisten_at = None;
        self.chat_rx = None;
        self.capture_rx = None;
        self.output_rx = None;
        self.capture.stop().await;
        self.output.stop().await;
        self.discard_partials();
        self.release_gate().await;
        self.turn_started = None;
        self.transition(ConversationState::Idle, reason);
    }

    fn discard_partials(&mut self) {
        if let Some(id) = self.store.discard_user_partial() {
            self.emit(ConversationEvent::MessageRemoved(id));
        }
        if let Some(id) = self.store.discard_assistant_partial() {
            self.emit(ConversationEvent::MessageRemoved(id));
        }
    }

    async fn release_gate(&mut self) {
        if let Err(err) = self.gate.release().await {
            warn!(target: TARGET, %err, "audio gate release failed");
        }
    }

    fn transition(&mut self, to: ConversationState, reason: &str) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        record_state_transition(from.as_str(), to.as_str(), reason);
        self.emit(ConversationEvent::StateChanged(to));
    }

    fn emit(&self, event: ConversationEvent) {
        if self.events_tx.send(event).is_err() {
            debug!(target: TARGET, "no conversation event subscribers");
        }
    }

    fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            state: self.state,
            messages: self.store.messages().to_vec(),
            output_modality: self.session.output_modality(),
            triage_complete: self.session.triage_complete(),
            system_prompt: self.session.system_prompt().to_string(),
            audio_holder: self.gate.holder(),
        }
    }
}

async fn next_item<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn next_completion(
    rx: &mut Option<SpeechOutputCompletion>,
) -> Result<Result<(), ConversationError>, oneshot::error::RecvError> {
    match rx {
        Some(rx) => rx.await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<TokioInstant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
