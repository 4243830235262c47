pub mod chat_service;
pub mod error;
pub mod error_collector_layer;
pub mod message_selector;
pub mod response_client;
pub mod stream_reducer;
pub mod task_queue;

pub use chat_service::{ChatService, SendMessage};
pub use error::ChatError;
pub use error_collector_layer::ErrorCollectorLayer;
pub use message_selector::{effective_messages, select_messages};
pub use response_client::{ResponseClient, ResponseStream, StreamChunk};
pub use stream_reducer::{PersistedPayload, StreamReducer};
pub use task_queue::KeyedTaskQueue;
