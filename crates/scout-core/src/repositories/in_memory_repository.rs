use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::error::RepositoryResult;
use super::message_repository::{BoxFuture, MessageRepository};
use crate::models::Message;

/// In-memory repository for messages.
/// Useful for testing and development; the optional lag simulates a backing
/// store whose reads trail its writes, which is exactly the race the
/// reconciliation path exists for.
#[derive(Clone)]
pub struct InMemoryMessageRepository {
    messages: Arc<Mutex<HashMap<String, Vec<Message>>>>,
    read_lag: Option<Duration>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(HashMap::new())),
            read_lag: None,
        }
    }

    /// Delay every read by `lag`, imitating a slow durable source.
    pub fn with_read_lag(lag: Duration) -> Self {
        Self {
            messages: Arc::new(Mutex::new(HashMap::new())),
            read_lag: Some(lag),
        }
    }

    /// Store a message as durably confirmed.
    pub fn insert(&self, message: Message) {
        let mut store = self.messages.lock();
        store
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
    }

    pub fn clear(&self, conversation_id: &str) {
        self.messages.lock().remove(conversation_id);
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn get_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, RepositoryResult<Vec<Message>>> {
        let messages = self.messages.clone();
        let read_lag = self.read_lag;
        let conversation_id = conversation_id.to_string();

        Box::pin(async move {
            if let Some(lag) = read_lag {
                tokio::time::sleep(lag).await;
            }

            let store = messages.lock();
            Ok(store.get(&conversation_id).cloned().unwrap_or_default())
        })
    }
}
