use tracing::info;

use crate::conversation::types::OutputModality;

/// Per-session flags owned by the conversation worker.
#[derive(Debug)]
pub(crate) struct SessionContext {
    output_modality: OutputModality,
    triage_complete: bool,
    system_prompt: String,
    pending_system_prompt: Option<String>,
    completion_marker: String,
}

impl SessionContext {
    pub(crate) fn new(
        system_prompt: String,
        completion_marker: String,
        output_modality: OutputModality,
    ) -> Self {
        Self {
            output_modality,
            triage_complete: false,
            system_prompt,
            pending_system_prompt: None,
            completion_marker,
        }
    }

    pub(crate) fn output_modality(&self) -> OutputModality {
        self.output_modality
    }

    pub(crate) fn triage_complete(&self) -> bool {
        self.triage_complete
    }

    pub(crate) fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Fixes the modality on first interaction; later calls are ignored.
    pub(crate) fn fix_modality(&mut self, modality: OutputModality) -> OutputModality {
        if self.output_modality == OutputModality::Undecided
            && modality != OutputModality::Undecided
        {
            info!(
                target: "conversation_worker",
                ?modality,
                "output modality fixed"
            );
            self.output_modality = modality;
        }
        self.output_modality
    }

    pub(crate) fn queue_system_prompt(&mut self, prompt: String) {
        self.pending_system_prompt = Some(prompt);
    }

    /// Applies a queued system prompt; called when a new turn begins.
    pub(crate) fn begin_turn(&mut self) {
        if let Some(prompt) = self.pending_system_prompt.take() {
            self.system_prompt = prompt;
        }
    }

    /// Strips the completion marker from `text`. Returns the cleaned text and
    /// whether this call flipped the triage flag.
    pub(crate) fn scan_completion(&mut self, text: &str) -> (String, bool) {
        if self.completion_marker.is_empty() || !text.contains(&self.completion_marker) {
            return (text.trim().to_string(), false);
        }

        let cleaned = text.replace(&self.completion_marker, "").trim().to_string();
        let newly_complete = !self.triage_complete;
        self.triage_complete = true;
        (cleaned, newly_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::constants::TRIAGE_COMPLETE_MARKER;

    fn context() -> SessionContext {
        SessionContext::new(
            "triage".into(),
            TRIAGE_COMPLETE_MARKER.into(),
            OutputModality::Undecided,
        )
    }

    #[test]
    fn modality_is_fixed_once() {
        let mut session = context();
        assert_eq!(session.fix_modality(OutputModality::Voice), OutputModality::Voice);
        assert_eq!(session.fix_modality(OutputModality::Text), OutputModality::Voice);
        assert_eq!(session.output_modality(), OutputModality::Voice);
    }

    #[test]
    fn marker_is_stripped_and_flag_is_monotonic() {
        let mut session = context();
        let (clean, flipped) = session.scan_completion("All set. [TRIAGE_COMPLETE]");
        assert_eq!(clean, "All set.");
        assert!(flipped);
        assert!(session.triage_complete());

        let (clean, flipped) = session.scan_completion("Anything else?");
        assert_eq!(clean, "Anything else?");
        assert!(!flipped);
        assert!(session.triage_complete());

        let (_, flipped) = session.scan_completion("[TRIAGE_COMPLETE] again");
        assert!(!flipped);
        assert!(session.triage_complete());
    }

    #[test]
    fn queued_prompt_applies_on_next_turn() {
        let mut session = context();
        session.queue_system_prompt("be brief".into());
        assert_eq!(session.system_prompt(), "triage");
        session.begin_turn();
        assert_eq!(session.system_prompt(), "be brief");
    }
}
