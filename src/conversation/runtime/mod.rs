mod handle;
mod worker;

pub use handle::{ConversationCommand, ConversationHandle};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::conversation::config::ConversationConfig;
use crate::conversation::engine::ConversationComponents;
use crate::conversation::gate::AudioGate;
use crate::conversation::session::SessionContext;
use crate::conversation::types::ConversationEvent;

use self::worker::ConversationWorker;

pub(crate) fn spawn_conversation(
    config: &ConversationConfig,
    components: &ConversationComponents,
) -> (ConversationHandle, broadcast::Receiver<ConversationEvent>) {
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
    let (events_tx, events_rx) = broadcast::channel(config.event_capacity.max(1));

    let session = SessionContext::new(
        config.system_prompt.clone(),
        config.completion_marker.clone(),
        config.output_modality,
    );

    let worker = ConversationWorker::new(
        command_rx,
        events_tx.clone(),
        Arc::clone(&components.capture),
        Arc::clone(&components.output),
        Arc::clone(&components.chat),
        AudioGate::new(Arc::clone(&components.audio_session)),
        session,
        config.capture.request(),
        config.relisten_guard_delay(),
    );

    let worker_handle = worker.spawn();
    let handle = ConversationHandle::new(command_tx, events_tx, worker_handle);

    (handle, events_rx)
}
