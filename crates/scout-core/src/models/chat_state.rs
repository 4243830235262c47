use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::conversation::Conversation;
use super::message::Message;
use super::sync_state::SyncState;

/// The complete optimistic view of loaded conversations.
///
/// All mutation helpers are pure: they take `&self` and return a new state
/// with the touched conversation's message vector rebuilt, so concurrent
/// generations for different conversations can never corrupt each other's
/// arrays. Helpers targeting a conversation that is not loaded (off-screen,
/// evicted) are no-ops rather than errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatState {
    pub conversations: HashMap<String, Conversation>,
}

/// A state transition applied by the host store: either a full replacement
/// value or a pure `previous -> next` function.
pub enum StatePatch {
    Replace(ChatState),
    Update(Box<dyn FnOnce(&ChatState) -> ChatState + Send>),
}

impl StatePatch {
    /// Convenience constructor for the common closure form.
    pub fn update(f: impl FnOnce(&ChatState) -> ChatState + Send + 'static) -> Self {
        StatePatch::Update(Box::new(f))
    }
}

/// Apply a patch against the previous state, producing the next state.
pub fn apply(previous: &ChatState, patch: StatePatch) -> ChatState {
    match patch {
        StatePatch::Replace(next) => next,
        StatePatch::Update(f) => f(previous),
    }
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<&Message> {
        self.conversation(conversation_id)
            .and_then(|c| c.message(message_id))
    }

    /// Rebuild the state with one conversation replaced (or inserted).
    fn with_conversation(&self, conversation: Conversation) -> ChatState {
        let mut next = self.clone();
        next.conversations
            .insert(conversation.id.clone(), conversation);
        next
    }

    /// Rebuild the state with one conversation transformed in place. Returns
    /// an unchanged clone when the conversation is not loaded.
    fn map_conversation(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut Conversation),
    ) -> ChatState {
        match self.conversations.get(conversation_id) {
            Some(existing) => {
                let mut conversation = existing.clone();
                f(&mut conversation);
                conversation.updated_at = chrono::Utc::now();
                self.with_conversation(conversation)
            }
            None => self.clone(),
        }
    }

    /// Append a message, creating the conversation if it is not loaded yet.
    /// Appending a streaming message first stops any stale streaming entry so
    /// at most one message per conversation is ever in flight.
    pub fn push_message(&self, message: Message) -> ChatState {
        let mut conversation = self
            .conversations
            .get(&message.conversation_id)
            .cloned()
            .unwrap_or_else(|| Conversation::new(message.conversation_id.clone()));

        if message.streaming {
            for existing in conversation.messages.iter_mut() {
                existing.streaming = false;
                existing.thinking = false;
            }
        }

        conversation.messages.push(message);
        conversation.updated_at = chrono::Utc::now();
        self.with_conversation(conversation)
    }

    /// Transform one message, addressed by stable id. No-op when either the
    /// conversation or the message is missing.
    pub fn update_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        f: impl FnOnce(&mut Message),
    ) -> ChatState {
        self.map_conversation(conversation_id, |conversation| {
            if let Some(message) = conversation
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
            {
                f(message);
            }
        })
    }

    /// Clear the streaming/thinking flags on a message after a failed or
    /// abandoned generation. Accumulated content is retained.
    pub fn stop_streaming(&self, conversation_id: &str, message_id: &str) -> ChatState {
        self.update_message(conversation_id, message_id, |message| {
            message.streaming = false;
            message.thinking = false;
            message.progress = None;
            message.status = super::message::MessageStatus::Failed;
        })
    }

    /// Record a conversation-scoped error indicator.
    pub fn set_error(&self, conversation_id: &str, error: impl Into<String>) -> ChatState {
        let error = error.into();
        self.map_conversation(conversation_id, |conversation| {
            conversation.error = Some(error);
        })
    }

    /// Dismiss the conversation-scoped error indicator.
    pub fn dismiss_error(&self, conversation_id: &str) -> ChatState {
        self.map_conversation(conversation_id, |conversation| {
            conversation.error = None;
        })
    }

    /// Mark every message matching `f` as durably persisted. In-flight
    /// (streaming) messages are skipped; the chunk stream owns their
    /// lifecycle.
    pub fn mark_persisted(
        &self,
        conversation_id: &str,
        f: impl Fn(&Message) -> bool,
    ) -> ChatState {
        self.map_conversation(conversation_id, |conversation| {
            for message in conversation.messages.iter_mut() {
                if !message.persisted && !message.streaming && f(message) {
                    message.persisted = true;
                }
            }
        })
    }

    /// Advance the conversation's reconciliation state machine.
    pub fn with_sync(
        &self,
        conversation_id: &str,
        f: impl FnOnce(SyncState) -> SyncState,
    ) -> ChatState {
        self.map_conversation(conversation_id, |conversation| {
            conversation.sync = f(conversation.sync);
        })
    }

    /// Explicit user-action deletion. The reducer never calls this.
    pub fn delete_message(&self, conversation_id: &str, message_id: &str) -> ChatState {
        self.map_conversation(conversation_id, |conversation| {
            conversation.messages.retain(|m| m.id != message_id);
        })
    }

    /// Explicit user-action deletion of a whole conversation.
    pub fn delete_conversation(&self, conversation_id: &str) -> ChatState {
        let mut next = self.clone();
        next.conversations.remove(conversation_id);
        next
    }

    pub fn set_title(&self, conversation_id: &str, title: impl Into<String>) -> ChatState {
        let title = title.into();
        self.map_conversation(conversation_id, |conversation| {
            conversation.set_title(title);
        })
    }

    pub fn set_private(&self, conversation_id: &str, private: bool) -> ChatState {
        self.map_conversation(conversation_id, |conversation| {
            conversation.set_private(private);
        })
    }
}
