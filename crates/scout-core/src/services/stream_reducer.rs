use tracing::debug;

use super::error::ChatError;
use super::response_client::StreamChunk;
use crate::models::{
    ContextRef, ConversationsStore, MessageStatus, SourceRef, StatePatch, WorkflowMeta,
};

/// Payload of the terminal `persisted` chunk, kept for the reconciliation
/// step that follows a confirmed write.
#[derive(Debug, Clone, Default)]
pub struct PersistedPayload {
    pub message_id: Option<String>,
    pub workflow: WorkflowMeta,
    pub sources: Vec<SourceRef>,
    pub context: Vec<ContextRef>,
}

/// Folds one generation's chunk stream into the optimistic store.
///
/// Constructed per (conversation, placeholder message) pair; the placeholder
/// id is captured at creation so every patch addresses the message by stable
/// identity, regardless of what else gets appended to the conversation while
/// the stream runs. `handle` must be called once per chunk, in stream order.
pub struct StreamReducer {
    conversation_id: String,
    message_id: String,
    content: String,
    reasoning: String,
    persisted: Option<PersistedPayload>,
    persist_confirmed: bool,
}

impl StreamReducer {
    pub fn new(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            content: String::new(),
            reasoning: String::new(),
            persisted: None,
            persist_confirmed: false,
        }
    }

    /// The id of the assistant placeholder this reducer mutates.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Content accumulated so far (mirrors the placeholder's content field).
    pub fn content(&self) -> &str {
        &self.content
    }

    /// True once the terminal `persisted` chunk has been applied.
    pub fn persist_confirmed(&self) -> bool {
        self.persist_confirmed
    }

    /// The durable-confirmation payload, if one arrived.
    pub fn persisted_payload(&self) -> Option<&PersistedPayload> {
        self.persisted.as_ref()
    }

    /// Apply one chunk to the placeholder message, synchronously.
    ///
    /// An `error` chunk raises; the enclosing task owns clearing the
    /// streaming flag and recording the conversation-level error, so the
    /// partial content accumulated here stays visible.
    pub fn handle(&mut self, chunk: StreamChunk, store: &ConversationsStore) -> Result<(), ChatError> {
        let conv_id = self.conversation_id.clone();
        let msg_id = self.message_id.clone();

        match chunk {
            StreamChunk::WorkflowStart { workflow_id, nonce } => {
                store.apply(StatePatch::update(move |prev| {
                    prev.update_message(&conv_id, &msg_id, |message| {
                        message.workflow.merge(&WorkflowMeta {
                            workflow_id,
                            nonce,
                            signature: None,
                        });
                    })
                }));
            }
            StreamChunk::Progress { status } => {
                // Ephemeral UI feedback only; never touches content.
                store.apply(StatePatch::update(move |prev| {
                    prev.update_message(&conv_id, &msg_id, |message| {
                        message.progress = Some(status);
                    })
                }));
            }
            StreamChunk::Reasoning { text } => {
                self.reasoning.push_str(&text);
                store.apply(StatePatch::update(move |prev| {
                    prev.update_message(&conv_id, &msg_id, |message| {
                        message.reasoning.push_str(&text);
                        message.thinking = true;
                    })
                }));
            }
            StreamChunk::Content { delta, content } => {
                // Prefer the explicit delta; older backends only send the
                // full content field, which we treat as the increment.
                let Some(text) = delta.or(content) else {
                    debug!(conversation_id = %conv_id, "content chunk with no text");
                    return Ok(());
                };
                self.content.push_str(&text);
                store.apply(StatePatch::update(move |prev| {
                    prev.update_message(&conv_id, &msg_id, |message| {
                        message.content.push_str(&text);
                        message.streaming = true;
                        message.status = MessageStatus::Generating;
                    })
                }));
            }
            StreamChunk::Metadata {
                workflow_id,
                nonce,
                sources,
                context,
            } => {
                // Metadata may legitimately precede completion; merge without
                // clearing content or ending the stream.
                store.apply(StatePatch::update(move |prev| {
                    prev.update_message(&conv_id, &msg_id, |message| {
                        message.workflow.merge(&WorkflowMeta {
                            workflow_id,
                            nonce,
                            signature: None,
                        });
                        if !sources.is_empty() {
                            message.sources = sources;
                        }
                        if !context.is_empty() {
                            message.context_refs = context;
                        }
                    })
                }));
            }
            StreamChunk::Complete => {
                // Generation is done but not durably stored yet. Ending the
                // stream here would flash an unconfirmed answer as final and
                // let a later refresh overwrite it, so streaming stays true.
                store.apply(StatePatch::update(move |prev| {
                    prev.update_message(&conv_id, &msg_id, |message| {
                        message.status = MessageStatus::Finalizing;
                        message.progress = None;
                    })
                }));
            }
            StreamChunk::Persisted {
                message_id,
                workflow_id,
                nonce,
                signature,
                sources,
                context,
            } => {
                let payload = PersistedPayload {
                    message_id: message_id.clone(),
                    workflow: WorkflowMeta {
                        workflow_id,
                        nonce,
                        signature,
                    },
                    sources: sources.clone(),
                    context: context.clone(),
                };
                let workflow = payload.workflow.clone();
                self.persisted = Some(payload);
                self.persist_confirmed = true;

                store.apply(StatePatch::update(move |prev| {
                    prev.update_message(&conv_id, &msg_id, |message| {
                        message.streaming = false;
                        message.persisted = true;
                        message.thinking = false;
                        message.progress = None;
                        message.status = MessageStatus::Done;
                        message.durable_id = message_id;
                        message.workflow.merge(&workflow);
                        if !sources.is_empty() {
                            message.sources = sources;
                        }
                        if !context.is_empty() {
                            message.context_refs = context;
                        }
                    })
                }));
            }
            StreamChunk::Error { message } => {
                debug!(conversation_id = %conv_id, error = %message, "backend reported failed generation");
                return Err(ChatError::Generation(message));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Role};

    fn setup() -> (ConversationsStore, StreamReducer) {
        let store = ConversationsStore::new();
        store.apply(StatePatch::update(|prev| {
            prev.push_message(Message::user("conv-1", "question"))
        }));
        let placeholder = Message::assistant_placeholder("conv-1");
        let id = placeholder.id.clone();
        store.apply(StatePatch::update(move |prev| prev.push_message(placeholder)));
        (store, StreamReducer::new("conv-1", id))
    }

    fn message(store: &ConversationsStore, reducer: &StreamReducer) -> Message {
        store
            .snapshot()
            .message("conv-1", reducer.message_id())
            .cloned()
            .expect("placeholder present")
    }

    #[test]
    fn test_content_then_complete_then_persisted() {
        let (store, mut reducer) = setup();

        reducer
            .handle(
                StreamChunk::Content {
                    delta: Some("Hi".to_string()),
                    content: None,
                },
                &store,
            )
            .unwrap();
        reducer
            .handle(
                StreamChunk::Content {
                    delta: Some(" there".to_string()),
                    content: None,
                },
                &store,
            )
            .unwrap();
        reducer.handle(StreamChunk::Complete, &store).unwrap();

        // Complete alone must not end streaming: durability is a separate
        // backend phase.
        let msg = message(&store, &reducer);
        assert_eq!(msg.content, "Hi there");
        assert!(msg.streaming);
        assert_eq!(msg.status, MessageStatus::Finalizing);
        assert!(!reducer.persist_confirmed());

        reducer
            .handle(
                StreamChunk::Persisted {
                    message_id: Some("durable-9".to_string()),
                    workflow_id: Some("wf-1".to_string()),
                    nonce: None,
                    signature: Some("sig".to_string()),
                    sources: Vec::new(),
                    context: Vec::new(),
                },
                &store,
            )
            .unwrap();

        let msg = message(&store, &reducer);
        assert_eq!(msg.content, "Hi there");
        assert!(!msg.streaming);
        assert!(msg.persisted);
        assert_eq!(msg.durable_id.as_deref(), Some("durable-9"));
        assert_eq!(msg.workflow.signature.as_deref(), Some("sig"));
        assert!(reducer.persist_confirmed());
    }

    #[test]
    fn test_error_chunk_raises_and_keeps_partial_content() {
        let (store, mut reducer) = setup();

        reducer
            .handle(
                StreamChunk::Content {
                    delta: Some("partial".to_string()),
                    content: None,
                },
                &store,
            )
            .unwrap();

        let err = reducer
            .handle(
                StreamChunk::Error {
                    message: "boom".to_string(),
                },
                &store,
            )
            .unwrap_err();

        assert!(matches!(err, ChatError::Generation(ref m) if m.contains("boom")));
        // Partial content stays visible; clearing the streaming flag is the
        // enclosing task's job.
        assert_eq!(message(&store, &reducer).content, "partial");
    }

    #[test]
    fn test_full_sequence_mutates_exactly_one_assistant_message() {
        let (store, mut reducer) = setup();

        let chunks = vec![
            StreamChunk::WorkflowStart {
                workflow_id: Some("wf-7".to_string()),
                nonce: Some("n-7".to_string()),
            },
            StreamChunk::Progress {
                status: "searching".to_string(),
            },
            StreamChunk::Progress {
                status: "reading".to_string(),
            },
            StreamChunk::Reasoning {
                text: "consider ".to_string(),
            },
            StreamChunk::Reasoning {
                text: "the sources".to_string(),
            },
            StreamChunk::Content {
                delta: Some("The answer".to_string()),
                content: None,
            },
            StreamChunk::Content {
                delta: Some(" is 42.".to_string()),
                content: None,
            },
            StreamChunk::Metadata {
                workflow_id: None,
                nonce: None,
                sources: vec![SourceRef {
                    url: "https://example.org".to_string(),
                    title: None,
                }],
                context: Vec::new(),
            },
            StreamChunk::Complete,
            StreamChunk::Persisted {
                message_id: Some("durable-1".to_string()),
                workflow_id: None,
                nonce: None,
                signature: None,
                sources: Vec::new(),
                context: Vec::new(),
            },
        ];
        for chunk in chunks {
            reducer.handle(chunk, &store).unwrap();
        }

        let conv = store.conversation("conv-1").unwrap();
        let assistants: Vec<_> = conv
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1, "never creates a second assistant message");

        let msg = assistants[0];
        assert_eq!(msg.content, "The answer is 42.");
        assert_eq!(msg.reasoning, "consider the sources");
        assert!(!msg.streaming);
        assert!(msg.persisted);
        assert!(!msg.thinking);
        assert_eq!(msg.workflow.workflow_id.as_deref(), Some("wf-7"));
        assert_eq!(msg.sources.len(), 1);
    }

    #[test]
    fn test_progress_never_touches_content() {
        let (store, mut reducer) = setup();
        reducer
            .handle(
                StreamChunk::Content {
                    delta: Some("body".to_string()),
                    content: None,
                },
                &store,
            )
            .unwrap();
        reducer
            .handle(
                StreamChunk::Progress {
                    status: "still working".to_string(),
                },
                &store,
            )
            .unwrap();

        let msg = message(&store, &reducer);
        assert_eq!(msg.content, "body");
        assert_eq!(msg.progress.as_deref(), Some("still working"));
    }

    #[test]
    fn test_metadata_before_completion_keeps_streaming() {
        let (store, mut reducer) = setup();
        reducer
            .handle(
                StreamChunk::Content {
                    delta: Some("body".to_string()),
                    content: None,
                },
                &store,
            )
            .unwrap();
        reducer
            .handle(
                StreamChunk::Metadata {
                    workflow_id: Some("wf-2".to_string()),
                    nonce: None,
                    sources: Vec::new(),
                    context: vec![ContextRef {
                        id: "ctx-1".to_string(),
                        label: None,
                    }],
                },
                &store,
            )
            .unwrap();

        let msg = message(&store, &reducer);
        assert!(msg.streaming);
        assert_eq!(msg.content, "body");
        assert_eq!(msg.workflow.workflow_id.as_deref(), Some("wf-2"));
        assert_eq!(msg.context_refs.len(), 1);
    }

    #[test]
    fn test_reasoning_sets_thinking_until_persisted() {
        let (store, mut reducer) = setup();
        reducer
            .handle(
                StreamChunk::Reasoning {
                    text: "hmm".to_string(),
                },
                &store,
            )
            .unwrap();
        assert!(message(&store, &reducer).thinking);

        reducer.handle(StreamChunk::Complete, &store).unwrap();
        reducer
            .handle(
                StreamChunk::Persisted {
                    message_id: None,
                    workflow_id: None,
                    nonce: None,
                    signature: None,
                    sources: Vec::new(),
                    context: Vec::new(),
                },
                &store,
            )
            .unwrap();
        assert!(!message(&store, &reducer).thinking);
    }

    #[test]
    fn test_content_falls_back_to_full_content_field() {
        let (store, mut reducer) = setup();
        reducer
            .handle(
                StreamChunk::Content {
                    delta: None,
                    content: Some("legacy text".to_string()),
                },
                &store,
            )
            .unwrap();

        assert_eq!(message(&store, &reducer).content, "legacy text");
        assert_eq!(reducer.content(), "legacy text");
    }
}
