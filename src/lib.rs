//! Voice Triage Core Library
//!
//! This crate coordinates a turn-based voice conversation: speech capture,
//! streamed chat completions, speech output and the session state machine that
//! ties them together.

pub mod adapters;
pub mod conversation;
pub mod dirs_compat;
pub mod telemetry;
