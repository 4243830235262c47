use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::message::Message;

/// Durable-side view of one conversation: the messages the backing store has
/// confirmed, plus whether a refresh is currently in flight.
#[derive(Debug, Clone, Default)]
pub struct DurableView {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Client-side cache of the durable message source.
///
/// Updated only by resolved fetches; the optimistic store never writes here.
/// The selector reads both sides and picks one whole list.
pub struct DurableCache {
    inner: RwLock<HashMap<String, DurableView>>,
}

impl DurableCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Mark a refresh as in flight without discarding the previous view.
    pub fn begin_refresh(&self, conversation_id: &str) {
        let mut inner = self.inner.write();
        inner.entry(conversation_id.to_string()).or_default().loading = true;
    }

    /// Store the messages a fetch resolved with and clear the loading flag.
    pub fn resolve(&self, conversation_id: &str, messages: Vec<Message>) {
        let mut inner = self.inner.write();
        let view = inner.entry(conversation_id.to_string()).or_default();
        view.messages = messages;
        view.loading = false;
        view.refreshed_at = Some(Utc::now());
    }

    /// Clear the loading flag without new data (failed or exhausted refresh).
    pub fn finish(&self, conversation_id: &str) {
        let mut inner = self.inner.write();
        if let Some(view) = inner.get_mut(conversation_id) {
            view.loading = false;
        }
    }

    /// Snapshot of one conversation's durable view.
    pub fn view(&self, conversation_id: &str) -> DurableView {
        self.inner
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for DurableCache {
    fn default() -> Self {
        Self::new()
    }
}
