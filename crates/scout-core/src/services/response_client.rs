use anyhow::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::{ContextRef, SourceRef};

/// Stream chunks emitted during response generation.
///
/// The wire discriminant is the `type` field, with the exact values the
/// backend produces. Chunks for one generation arrive in partial order: any
/// number of `progress`/`reasoning`/`content`/`metadata`, then either
/// `complete` followed by `persisted`, or a single `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    WorkflowStart {
        #[serde(default)]
        workflow_id: Option<String>,
        #[serde(default)]
        nonce: Option<String>,
    },
    Progress {
        status: String,
    },
    Reasoning {
        text: String,
    },
    Content {
        /// Incremental text. Preferred over `content` when both are present.
        #[serde(default)]
        delta: Option<String>,
        /// Full-content fallback kept for older backends that never send
        /// deltas.
        #[serde(default)]
        content: Option<String>,
    },
    Metadata {
        #[serde(default)]
        workflow_id: Option<String>,
        #[serde(default)]
        nonce: Option<String>,
        #[serde(default)]
        sources: Vec<SourceRef>,
        #[serde(default)]
        context: Vec<ContextRef>,
    },
    Complete,
    Persisted {
        /// Durable id assigned by the backing store, when it reports one.
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        workflow_id: Option<String>,
        #[serde(default)]
        nonce: Option<String>,
        #[serde(default)]
        signature: Option<String>,
        #[serde(default)]
        sources: Vec<SourceRef>,
        #[serde(default)]
        context: Vec<ContextRef>,
    },
    Error {
        message: String,
    },
}

/// Type alias for response streams
pub type ResponseStream = BoxStream<'static, Result<StreamChunk>>;

/// The backend that actually produces the chunk stream. Everything behind
/// this trait (transport, retries, the generation itself) is owned by the
/// remote service.
pub trait ResponseClient: Send + Sync + 'static {
    fn generate_response(
        &self,
        conversation_id: &str,
        content: &str,
        images: &[String],
    ) -> ResponseStream;
}
