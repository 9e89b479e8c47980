use std::time::Duration;

pub(crate) const TRIAGE_COMPLETE_MARKER: &str = "[TRIAGE_COMPLETE]";
pub(crate) const RELISTEN_GUARD_DELAY: Duration = Duration::from_millis(300);
pub(crate) const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 300;
pub(crate) const DEFAULT_SYSTEM_PROMPT: &str = "You are a calm, concise medical triage assistant. \
Ask one short question at a time. When you have enough information to recommend a next step, \
give the recommendation and end your reply with [TRIAGE_COMPLETE].";
