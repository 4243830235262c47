pub mod chat_state;
pub mod conversation;
pub mod conversations_store;
pub mod durable_cache;
pub mod error_store;
pub mod message;
pub mod sync_state;

pub use chat_state::{ChatState, StatePatch, apply};
pub use conversation::Conversation;
pub use conversations_store::ConversationsStore;
pub use durable_cache::{DurableCache, DurableView};
pub use error_store::{ErrorEntry, ErrorLevel, ErrorStore};
pub use message::{ContextRef, Message, MessageStatus, Role, SourceRef, WorkflowMeta};
pub use sync_state::SyncState;
