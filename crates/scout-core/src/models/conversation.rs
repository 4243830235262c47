use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;
use super::sync_state::SyncState;

/// A single conversation with the assistant.
///
/// Owned by the optimistic store; the same conversation may independently
/// exist in the durable source. Cloning is cheap enough for the
/// replace-whole-object update style the store uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub private: bool,
    pub messages: Vec<Message>,
    /// Conversation-scoped, dismissible error from a failed generation.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sync: SyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: "New Chat".to_string(),
            private: false,
            messages: Vec::new(),
            error: None,
            sync: SyncState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set conversation title
    pub fn set_title(&mut self, title: String) {
        self.title = title;
        self.updated_at = Utc::now();
    }

    /// Set conversation privacy
    pub fn set_private(&mut self, private: bool) {
        self.private = private;
        self.updated_at = Utc::now();
    }

    /// Look up a message by its stable local id.
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// The most recent assistant message, if any.
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::message::Role::Assistant)
    }

    /// Get the count of messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
