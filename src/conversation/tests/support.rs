use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, timeout};

use crate::conversation::*;

pub(super) const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Default)]
pub(super) struct ManualCapture {
    senders: Mutex<Vec<mpsc::Sender<Result<CaptureEvent, ConversationError>>>>,
    requests: Mutex<Vec<CaptureRequest>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    pub(super) unavailable: AtomicBool,
}

impl ManualCapture {
    pub(super) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(super) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub(super) fn last_request(&self) -> Option<CaptureRequest> {
        self.requests.lock().expect("requests lock").last().cloned()
    }

    fn latest(&self) -> mpsc::Sender<Result<CaptureEvent, ConversationError>> {
        self.senders
            .lock()
            .expect("senders lock")
            .last()
            .cloned()
            .expect("capture was started")
    }

    pub(super) async fn partial(&self, text: &str) {
        self.latest()
            .send(Ok(CaptureEvent::partial(text)))
            .await
            .expect("capture stream open");
    }

    pub(super) async fn final_result(&self, text: &str) {
        self.latest()
            .send(Ok(CaptureEvent::final_result(text)))
            .await
            .expect("capture stream open");
    }

    pub(super) async fn fail(&self, err: ConversationError) {
        self.latest()
            .send(Err(err))
            .await
            .expect("capture stream open");
    }

    /// Delivery to a stream the worker may already have dropped.
    pub(super) fn try_partial(&self, text: &str) -> bool {
        self.latest().try_send(Ok(CaptureEvent::partial(text))).is_ok()
    }

    /// Drops every sender so the active stream ends.
    pub(super) fn close(&self) {
        self.senders.lock().expect("senders lock").clear();
    }
}

#[async_trait]
impl SpeechCapture for ManualCapture {
    async fn start(&self, request: CaptureRequest) -> Result<CaptureStream, ConversationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConversationError::unavailable(
                "speech recognition",
                "recognizer not supported",
            ));
        }
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().expect("senders lock").push(tx);
        self.requests.lock().expect("requests lock").push(request);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(super) struct ManualChat {
    requests: Mutex<Vec<ChatRequest>>,
    senders: Mutex<Vec<mpsc::Sender<ChatChunk>>>,
}

impl ManualChat {
    pub(super) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn sender(&self, index: usize) -> mpsc::Sender<ChatChunk> {
        self.senders.lock().expect("senders lock")[index].clone()
    }

    fn latest(&self) -> mpsc::Sender<ChatChunk> {
        self.senders
            .lock()
            .expect("senders lock")
            .last()
            .cloned()
            .expect("chat stream was requested")
    }

    pub(super) async fn send(&self, chunk: ChatChunk) {
        self.latest()
            .send(chunk)
            .await
            .expect("chat stream open");
    }

    pub(super) async fn send_to(&self, index: usize, chunk: ChatChunk) {
        self.sender(index)
            .send(chunk)
            .await
            .expect("chat stream open");
    }

    pub(super) async fn reply(&self, deltas: &[&str]) {
        for delta in deltas {
            self.send(ChatChunk::Delta(delta.to_string())).await;
        }
        self.send(ChatChunk::Done).await;
    }

    pub(super) fn close_all(&self) {
        self.senders.lock().expect("senders lock").clear();
    }

    pub(super) fn latest_closed(&self) -> bool {
        self.latest().is_closed()
    }
}

impl ChatCompletion for ManualChat {
    fn stream(&self, request: ChatRequest) -> ChatStream {
        let (tx, rx) = mpsc::channel(64);
        self.requests.lock().expect("requests lock").push(request);
        self.senders.lock().expect("senders lock").push(tx);
        rx
    }
}

#[derive(Default)]
pub(super) struct ManualOutput {
    spoken: Mutex<Vec<String>>,
    completions: Mutex<Vec<oneshot::Sender<Result<(), ConversationError>>>>,
    stops: AtomicUsize,
}

impl ManualOutput {
    pub(super) fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("spoken lock").clone()
    }

    pub(super) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn take_completion(&self) -> oneshot::Sender<Result<(), ConversationError>> {
        self.completions
            .lock()
            .expect("completions lock")
            .pop()
            .expect("speech was started")
    }

    pub(super) fn complete(&self) {
        let _ = self.take_completion().send(Ok(()));
    }

    pub(super) fn fail(&self, err: ConversationError) {
        let _ = self.take_completion().send(Err(err));
    }
}

#[async_trait]
impl SpeechOutput for ManualOutput {
    async fn speak(&self, text: &str) -> Result<SpeechOutputCompletion, ConversationError> {
        let (tx, rx) = oneshot::channel();
        self.spoken
            .lock()
            .expect("spoken lock")
            .push(text.to_string());
        self.completions.lock().expect("completions lock").push(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn label(&self) -> &'static str {
        "manual"
    }
}

#[derive(Default)]
pub(super) struct RecordingSession {
    active: AtomicBool,
    activations: AtomicUsize,
    pub(super) refuse: AtomicBool,
}

impl RecordingSession {
    pub(super) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(super) fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSession for RecordingSession {
    async fn activate(&self) -> Result<(), ConversationError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConversationError::contention("device busy"));
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), ConversationError> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub(super) struct Harness {
    pub(super) orchestrator: ConversationOrchestrator,
    pub(super) handle: ConversationHandle,
    pub(super) events: broadcast::Receiver<ConversationEvent>,
    pub(super) capture: Arc<ManualCapture>,
    pub(super) chat: Arc<ManualChat>,
    pub(super) output: Arc<ManualOutput>,
    pub(super) audio: Arc<RecordingSession>,
}

pub(super) fn test_config() -> ConversationConfig {
    ConversationConfig {
        system_prompt: "You are a triage nurse.".into(),
        relisten_guard_delay_ms: 20,
        ..ConversationConfig::default()
    }
}

pub(super) fn harness() -> Harness {
    harness_with(test_config())
}

pub(super) fn harness_with(config: ConversationConfig) -> Harness {
    let capture = Arc::new(ManualCapture::default());
    let chat = Arc::new(ManualChat::default());
    let output = Arc::new(ManualOutput::default());
    let audio = Arc::new(RecordingSession::default());

    let orchestrator = ConversationOrchestrator::with_components(
        config,
        ConversationComponents {
            capture: capture.clone(),
            output: output.clone(),
            chat: chat.clone(),
            audio_session: audio.clone(),
        },
    );
    let (handle, events) = orchestrator.start_session();

    Harness {
        orchestrator,
        handle,
        events,
        capture,
        chat,
        output,
        audio,
    }
}

/// Next state change, skipping other events.
pub(super) async fn next_state(
    events: &mut broadcast::Receiver<ConversationEvent>,
) -> ConversationState {
    loop {
        let event = timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("timed out waiting for state change")
            .expect("event channel open");
        if let ConversationEvent::StateChanged(state) = event {
            return state;
        }
    }
}

/// Collects events until the next state change, inclusive.
pub(super) async fn events_until_state(
    events: &mut broadcast::Receiver<ConversationEvent>,
) -> Vec<ConversationEvent> {
    let mut collected = Vec::new();
    loop {
        let event = timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("timed out waiting for state change")
            .expect("event channel open");
        let is_state = matches!(event, ConversationEvent::StateChanged(_));
        collected.push(event);
        if is_state {
            return collected;
        }
    }
}

pub(super) async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}
