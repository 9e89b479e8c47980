use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::conversation";
pub(crate) const EVENT_TRANSITION: &str = "conversation_transition";
pub(crate) const EVENT_TURN: &str = "conversation_turn";
pub(crate) const EVENT_TRIAGE: &str = "triage_complete";
pub(crate) const EVENT_ADAPTER_FAILURE: &str = "adapter_failure";

#[derive(Debug, Serialize)]
pub struct StateTransitionEvent<'a> {
    pub from: &'static str,
    pub to: &'static str,
    pub reason: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TurnCompletedEvent {
    pub latency_ms: u64,
    pub reply_chars: usize,
    pub spoken: bool,
    pub triage_complete: bool,
}

#[derive(Debug, Serialize)]
pub struct AdapterFailureEvent<'a> {
    pub kind: &'static str,
    pub detail: &'a str,
}

pub fn record_state_transition(from: &'static str, to: &'static str, reason: &str) {
    let event = StateTransitionEvent { from, to, reason };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_TRANSITION,
            from = event.from,
            to = event.to,
            reason = event.reason,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_TRANSITION,
            %err,
            "failed to encode state transition event"
        ),
    }
}

pub fn record_turn_completed(
    latency: Duration,
    reply_chars: usize,
    spoken: bool,
    triage_complete: bool,
) {
    let event = TurnCompletedEvent {
        latency_ms: duration_to_ms(latency),
        reply_chars,
        spoken,
        triage_complete,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_TURN,
            latency_ms = event.latency_ms,
            reply_chars = event.reply_chars,
            spoken = event.spoken,
            triage_complete = event.triage_complete,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_TURN,
            %err,
            "failed to encode turn event"
        ),
    }
}

pub fn record_triage_complete(turns: usize) {
    info!(target: TARGET, event = EVENT_TRIAGE, turns, "triage marked complete");
}

pub fn record_adapter_failure(kind: &'static str, detail: &str) {
    let event = AdapterFailureEvent { kind, detail };

    match serde_json::to_string(&event) {
        Ok(payload) => warn!(
            target: TARGET,
            event = EVENT_ADAPTER_FAILURE,
            kind = event.kind,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_ADAPTER_FAILURE,
            %err,
            "failed to encode adapter failure event"
        ),
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
