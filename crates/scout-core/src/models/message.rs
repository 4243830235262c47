use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Coarse lifecycle of an assistant message while a generation is running.
///
/// `Finalizing` covers the window between the backend's `complete` chunk and
/// its `persisted` confirmation: the answer is fully generated but not yet
/// durably stored, so the message still counts as streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Idle,
    Generating,
    Finalizing,
    Done,
    Failed,
}

/// A cited source attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// A reference to a context item the backend consulted while answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Backend workflow identity for one generation, attached as chunks arrive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowMeta {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl WorkflowMeta {
    /// Merge fields from a later chunk, keeping existing values unless the
    /// incoming payload carries a replacement.
    pub fn merge(&mut self, other: &WorkflowMeta) {
        if other.workflow_id.is_some() {
            self.workflow_id = other.workflow_id.clone();
        }
        if other.nonce.is_some() {
            self.nonce = other.nonce.clone();
        }
        if other.signature.is_some() {
            self.signature = other.signature.clone();
        }
    }
}

/// A single message in a conversation.
///
/// `id` is a locally generated uuid; `durable_id` is filled in once the
/// backend confirms persistence and is the preferred key when matching this
/// message against the durable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// True while a generation is still mutating this message. At most one
    /// message per conversation may be streaming at any instant.
    pub streaming: bool,
    /// False until the backend durably stored this message. Transitions
    /// false -> true exactly once and never reverts.
    pub persisted: bool,
    pub status: MessageStatus,
    /// Accumulated reasoning/thinking text, separate from the answer body.
    #[serde(default)]
    pub reasoning: String,
    /// True while reasoning chunks are arriving (transient UI indicator).
    #[serde(default)]
    pub thinking: bool,
    /// Ephemeral progress line from `progress` chunks; never part of content.
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub durable_id: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub context_refs: Vec<ContextRef>,
    #[serde(default)]
    pub workflow: WorkflowMeta,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message awaiting persistence.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            streaming: false,
            persisted: false,
            status: MessageStatus::Idle,
            reasoning: String::new(),
            thinking: false,
            progress: None,
            durable_id: None,
            sources: Vec::new(),
            context_refs: Vec::new(),
            workflow: WorkflowMeta::default(),
            created_at: Utc::now(),
        }
    }

    /// Create the in-flight assistant placeholder for a generation. The id is
    /// captured by the reducer at creation time so later chunks address the
    /// message by stable identity rather than array position.
    pub fn assistant_placeholder(conversation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: String::new(),
            streaming: true,
            persisted: false,
            status: MessageStatus::Generating,
            reasoning: String::new(),
            thinking: false,
            progress: None,
            durable_id: None,
            sources: Vec::new(),
            context_refs: Vec::new(),
            workflow: WorkflowMeta::default(),
            created_at: Utc::now(),
        }
    }
}
