//! Core engine for the Scout research-assistant chat client.
//!
//! Three mechanisms carry the weight here:
//!
//! - [`services::KeyedTaskQueue`] serializes generations per conversation
//!   while unrelated conversations proceed in parallel, isolating failures
//!   per task.
//! - [`services::StreamReducer`] folds the backend's ordered, typed chunk
//!   stream into the optimistic store without losing partial results when a
//!   stream aborts.
//! - [`services::select_messages`] reconciles the locally-mutated optimistic
//!   view with the durably-persisted view into one consistent list, resolving
//!   the race between a response finishing locally and the backing store
//!   becoming visible.
//!
//! [`services::ChatService`] composes the three behind a single
//! `send_message_with_streaming` entry point. Rendering, transport, and the
//! generation backend itself live behind the [`services::ResponseClient`] and
//! [`repositories::MessageRepository`] boundaries.

pub mod models;
pub mod repositories;
pub mod services;

pub use models::{
    ChatState, ContextRef, Conversation, ConversationsStore, DurableCache, DurableView,
    ErrorStore, Message, MessageStatus, Role, SourceRef, StatePatch, SyncState, WorkflowMeta,
};
pub use repositories::{InMemoryMessageRepository, MessageRepository, RepositoryError};
pub use services::{
    ChatError, ChatService, ErrorCollectorLayer, KeyedTaskQueue, ResponseClient, ResponseStream,
    SendMessage, StreamChunk, StreamReducer, select_messages,
};
