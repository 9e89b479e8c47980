use tracing::warn;

use crate::conversation::types::{Author, ChatMessage, ChatRole, Message};

/// Ordered conversation history.
///
/// Entries are append-only except for the in-progress user transcript and the
/// pending assistant reply, which are tracked by id and mutated in place until
/// they are finalized or abandoned.
#[derive(Debug, Default)]
pub(crate) struct MessageStore {
    next_message_id: u64,
    messages: Vec<Message>,
    pending_user: Option<u64>,
    pending_assistant: Option<u64>,
}

impl MessageStore {
    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn has_pending_user(&self) -> bool {
        self.pending_user.is_some()
    }

    pub(crate) fn pending_user_text(&self) -> Option<&str> {
        let id = self.pending_user?;
        self.find(id).map(|message| message.content.as_str())
    }

    pub(crate) fn pending_assistant_text(&self) -> Option<&str> {
        let id = self.pending_assistant?;
        self.find(id).map(|message| message.content.as_str())
    }

    pub(crate) fn upsert_user_partial(&mut self, text: &str) -> Message {
        if let Some(message) = self.pending_user.and_then(|id| self.find_mut(id)) {
            message.content = text.to_string();
            return message.clone();
        }

        let message = self.push(Author::User, text.to_string(), true);
        self.pending_user = Some(message.id);
        message
    }

    /// Replaces the in-progress transcript with the final text, or appends a
    /// finalized user message when no partial was seen.
    pub(crate) fn finalize_user(&mut self, text: &str) -> Message {
        if let Some(id) = self.pending_user.take() {
            if let Some(message) = self.find_mut(id) {
                message.content = text.to_string();
                message.is_partial = false;
                return message.clone();
            }
            warn!(
                target: "message_store",
                message_id = id,
                "pending user transcript vanished before finalization"
            );
        }

        self.push(Author::User, text.to_string(), false)
    }

    pub(crate) fn discard_user_partial(&mut self) -> Option<u64> {
        let id = self.pending_user.take()?;
        self.remove(id)
    }

    /// Applies one streamed delta to the pending assistant reply, opening it on
    /// the first delta of the turn.
    pub(crate) fn append_assistant_delta(&mut self, delta: &str) -> Message {
        if let Some(id) = self.pending_assistant {
            if let Some(message) = self.find_mut(id) {
                message.content.push_str(delta);
                return message.clone();
            }

            warn!(
                target: "message_store",
                message_id = id,
                "pending assistant message missing, reopening to keep streamed text"
            );
        }

        self.collapse_stray_assistant_partials();
        let message = self.push(Author::Assistant, delta.to_string(), true);
        self.pending_assistant = Some(message.id);
        message
    }

    /// Flips the pending assistant reply to final with its cleaned content.
    pub(crate) fn finalize_assistant(&mut self, content: String) -> Option<Message> {
        let id = self.pending_assistant.take()?;
        let message = self.find_mut(id)?;
        message.content = content;
        message.is_partial = false;
        Some(message.clone())
    }

    pub(crate) fn discard_assistant_partial(&mut self) -> Option<u64> {
        let id = self.pending_assistant.take()?;
        self.remove(id)
    }

    pub(crate) fn push_error(&mut self, text: String) -> Message {
        let mut message = self.push(Author::Assistant, text, false);
        message.is_error = true;
        if let Some(stored) = self.find_mut(message.id) {
            stored.is_error = true;
        }
        message
    }

    /// Finalized, non-empty, non-error turns in order.
    pub(crate) fn upstream_history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|message| !message.is_partial && !message.is_error)
            .filter(|message| !message.content.trim().is_empty())
            .map(|message| ChatMessage {
                role: match message.author {
                    Author::User => ChatRole::User,
                    Author::Assistant => ChatRole::Assistant,
                },
                content: message.content.clone(),
            })
            .collect()
    }

    fn push(&mut self, author: Author, content: String, is_partial: bool) -> Message {
        self.next_message_id = self.next_message_id.saturating_add(1);
        let message = Message::new(self.next_message_id, author, content, is_partial);
        self.messages.push(message.clone());
        message
    }

    fn remove(&mut self, id: u64) -> Option<u64> {
        let index = self.messages.iter().position(|message| message.id == id)?;
        self.messages.remove(index);
        Some(id)
    }

    fn find(&self, id: u64) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    fn find_mut(&mut self, id: u64) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    fn collapse_stray_assistant_partials(&mut self) {
        let before = self.messages.len();
        self.messages
            .retain(|message| !(message.author == Author::Assistant && message.is_partial));
        let dropped = before - self.messages.len();
        if dropped > 0 {
            warn!(
                target: "message_store",
                dropped,
                "dropped untracked partial assistant messages"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial_count(store: &MessageStore, author: Author) -> usize {
        store
            .messages()
            .iter()
            .filter(|message| message.author == author && message.is_partial)
            .count()
    }

    #[test]
    fn partial_transcripts_collapse_into_one_final_message() {
        let mut store = MessageStore::default();
        let first = store.upsert_user_partial("hel");
        let second = store.upsert_user_partial("hello");
        assert_eq!(first.id, second.id);
        assert_eq!(partial_count(&store, Author::User), 1);

        let finalized = store.finalize_user("hello there");
        assert_eq!(finalized.id, first.id);
        assert!(!finalized.is_partial);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].content, "hello there");
        assert!(!store.has_pending_user());
    }

    #[test]
    fn final_without_partial_appends_message() {
        let mut store = MessageStore::default();
        let message = store.finalize_user("hi");
        assert!(!message.is_partial);
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn deltas_concatenate_into_single_pending_reply() {
        let mut store = MessageStore::default();
        let deltas = ["Hi", " there", ",", " how can I help?"];
        let mut ids = Vec::new();
        for delta in deltas {
            ids.push(store.append_assistant_delta(delta).id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(partial_count(&store, Author::Assistant), 1);
        assert_eq!(
            store.pending_assistant_text(),
            Some("Hi there, how can I help?")
        );

        let finalized = store
            .finalize_assistant("Hi there, how can I help?".into())
            .expect("pending reply");
        assert!(!finalized.is_partial);
        assert_eq!(partial_count(&store, Author::Assistant), 0);
        assert!(store.finalize_assistant("again".into()).is_none());
    }

    #[test]
    fn discarded_reply_leaves_no_trace() {
        let mut store = MessageStore::default();
        store.finalize_user("my head hurts");
        let pending = store.append_assistant_delta("How long");
        assert_eq!(store.discard_assistant_partial(), Some(pending.id));
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].author, Author::User);
        assert_eq!(store.discard_assistant_partial(), None);
    }

    #[test]
    fn missing_pending_reply_is_reopened() {
        let mut store = MessageStore::default();
        let pending = store.append_assistant_delta("Hi");
        store.remove(pending.id);

        let reopened = store.append_assistant_delta(" there");
        assert_ne!(reopened.id, pending.id);
        assert_eq!(reopened.content, " there");
        assert_eq!(partial_count(&store, Author::Assistant), 1);
    }

    #[test]
    fn stray_partial_replies_are_collapsed_on_new_turn() {
        let mut store = MessageStore::default();
        store.append_assistant_delta("orphan");
        store.pending_assistant = None;

        store.append_assistant_delta("fresh");
        assert_eq!(partial_count(&store, Author::Assistant), 1);
        assert_eq!(store.pending_assistant_text(), Some("fresh"));
    }

    #[test]
    fn upstream_history_skips_partial_empty_and_error_messages() {
        let mut store = MessageStore::default();
        store.finalize_user("I feel dizzy");
        store.append_assistant_delta("When did");
        store
            .finalize_assistant("When did it start?".into())
            .expect("pending reply");
        store.push_error("I'm having trouble connecting right now.".into());
        store.finalize_user("   ");
        store.upsert_user_partial("this morn");

        let history = store.upstream_history();
        assert_eq!(
            history,
            vec![
                ChatMessage {
                    role: ChatRole::User,
                    content: "I feel dizzy".into(),
                },
                ChatMessage {
                    role: ChatRole::Assistant,
                    content: "When did it start?".into(),
                },
            ]
        );
    }

    #[test]
    fn error_messages_are_flagged() {
        let mut store = MessageStore::default();
        let message = store.push_error("busy".into());
        assert!(message.is_error);
        assert!(store.messages()[0].is_error);
        assert_eq!(message.author, Author::Assistant);
    }
}
