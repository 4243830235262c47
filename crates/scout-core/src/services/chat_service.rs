use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tracing::{debug, warn};

use super::error::ChatError;
use super::message_selector::{durable_contains, effective_messages};
use super::response_client::ResponseClient;
use super::stream_reducer::StreamReducer;
use super::task_queue::KeyedTaskQueue;
use crate::models::{
    ConversationsStore, DurableCache, Message, MessageStatus, StatePatch, SyncState,
};
use crate::repositories::MessageRepository;

/// How often a confirmed write is re-fetched from the durable source before
/// giving up and leaving optimistic state authoritative.
const MAX_REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_BACKOFF: Duration = Duration::from_millis(150);

/// One send request. `repository` is the durable source used for the
/// post-persistence reconciliation fetch; sending without one is a
/// precondition violation.
pub struct SendMessage {
    pub repository: Option<Arc<dyn MessageRepository>>,
    pub chat_id: String,
    pub content: String,
    pub images: Vec<String>,
}

/// Composes the whole send pipeline: per-conversation serialization through
/// the task queue, stream folding through the reducer, and dual-source
/// reconciliation once the backend confirms persistence.
pub struct ChatService {
    client: Arc<dyn ResponseClient>,
    store: Arc<ConversationsStore>,
    durable: Arc<DurableCache>,
    queue: KeyedTaskQueue,
}

impl ChatService {
    pub fn new(
        client: Arc<dyn ResponseClient>,
        store: Arc<ConversationsStore>,
        durable: Arc<DurableCache>,
    ) -> Self {
        Self {
            client,
            store,
            durable,
            queue: KeyedTaskQueue::new(),
        }
    }

    pub fn store(&self) -> &Arc<ConversationsStore> {
        &self.store
    }

    pub fn durable(&self) -> &Arc<DurableCache> {
        &self.durable
    }

    /// The message list to render for one conversation, reconciling the
    /// optimistic and durable views.
    pub fn messages_for_display(&self, conversation_id: &str, prefer_durable: bool) -> Vec<Message> {
        effective_messages(
            &self.store.snapshot(),
            &self.durable,
            conversation_id,
            prefer_durable,
        )
    }

    /// Send a message and stream the response into the optimistic store.
    ///
    /// Serialized per `chat_id`: a second send for the same conversation
    /// queues behind the first; sends for other conversations proceed in
    /// parallel. The returned future rejects on transport or generation
    /// failure, but a failure never affects other queued sends.
    pub async fn send_message_with_streaming(&self, request: SendMessage) -> Result<()> {
        // Precondition: mutating without a repository is an error, reported
        // before anything is queued or written.
        let Some(repository) = request.repository else {
            return Err(ChatError::RepositoryNotConfigured.into());
        };

        let client = self.client.clone();
        let store = self.store.clone();
        let durable = self.durable.clone();
        let chat_id = request.chat_id;
        let content = request.content;
        let images = request.images;

        self.queue
            .enqueue(&chat_id.clone(), async move {
                run_generation(client, store, durable, repository, chat_id, content, images).await
            })
            .await
    }

    /// Informational read-side refresh of the durable view. Degrades to a
    /// logged no-op when no repository is configured.
    pub async fn refresh_messages(
        &self,
        repository: Option<Arc<dyn MessageRepository>>,
        conversation_id: &str,
    ) {
        let Some(repository) = repository else {
            debug!(conversation_id, "no repository configured; skipping refresh");
            return;
        };

        self.durable.begin_refresh(conversation_id);
        match repository.get_messages(conversation_id).await {
            Ok(messages) => self.durable.resolve(conversation_id, messages),
            Err(err) => {
                warn!(conversation_id, error = %err, "durable refresh failed");
                self.durable.finish(conversation_id);
            }
        }
    }

    /// Dismiss the conversation-scoped error indicator.
    pub fn dismiss_error(&self, conversation_id: &str) {
        let conversation_id = conversation_id.to_string();
        self.store.apply(StatePatch::update(move |prev| {
            prev.dismiss_error(&conversation_id)
        }));
    }

    /// Explicit user-action message deletion; never performed by the reducer.
    pub fn delete_message(&self, conversation_id: &str, message_id: &str) {
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();
        self.store.apply(StatePatch::update(move |prev| {
            prev.delete_message(&conversation_id, &message_id)
        }));
    }
}

/// The body of one queued generation task.
async fn run_generation(
    client: Arc<dyn ResponseClient>,
    store: Arc<ConversationsStore>,
    durable: Arc<DurableCache>,
    repository: Arc<dyn MessageRepository>,
    chat_id: String,
    content: String,
    images: Vec<String>,
) -> Result<()> {
    let user = Message::user(&chat_id, &content);
    let placeholder = Message::assistant_placeholder(&chat_id);
    let placeholder_id = placeholder.id.clone();

    {
        let chat_id = chat_id.clone();
        store.apply(StatePatch::update(move |prev| {
            prev.push_message(user)
                .push_message(placeholder)
                .with_sync(&chat_id, SyncState::on_send)
        }));
    }

    let mut stream = client.generate_response(&chat_id, &content, &images);
    let mut reducer = StreamReducer::new(chat_id.clone(), placeholder_id.clone());

    let outcome: Result<(), ChatError> = async {
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => reducer.handle(chunk, &store)?,
                Err(err) => return Err(ChatError::Transport(err.to_string())),
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = outcome {
        warn!(chat_id = %chat_id, error = %err, "generation failed; keeping partial content");
        let message = err.to_string();
        let chat_id_for_patch = chat_id.clone();
        let placeholder_id = placeholder_id.clone();
        store.apply(StatePatch::update(move |prev| {
            prev.stop_streaming(&chat_id_for_patch, &placeholder_id)
                .set_error(&chat_id_for_patch, message)
        }));
        return Err(err.into());
    }

    if reducer.persist_confirmed() {
        {
            let chat_id = chat_id.clone();
            store.apply(StatePatch::update(move |prev| {
                prev.with_sync(&chat_id, SyncState::on_persist_confirmed)
            }));
        }
        reconcile_persisted(&store, &durable, &repository, &chat_id, &placeholder_id).await;
    } else {
        // Stream ended cleanly without complete/persisted or error: treat as
        // abandoned. Partial content stays; nothing was reported as failed.
        warn!(chat_id = %chat_id, "stream ended without terminal chunk");
        let chat_id = chat_id.clone();
        store.apply(StatePatch::update(move |prev| {
            prev.update_message(&chat_id, &placeholder_id, |message| {
                message.streaming = false;
                message.thinking = false;
                message.progress = None;
                message.status = MessageStatus::Idle;
            })
        }));
    }

    Ok(())
}

/// After a persistence confirmation, poll the durable source until the
/// confirmed write becomes visible, with bounded retries and backoff.
/// Exhausting the retries is logged, not fatal: optimistic state remains the
/// visible truth and a later refresh can still converge.
async fn reconcile_persisted(
    store: &ConversationsStore,
    durable: &DurableCache,
    repository: &Arc<dyn MessageRepository>,
    chat_id: &str,
    placeholder_id: &str,
) {
    durable.begin_refresh(chat_id);
    let mut backoff = REFRESH_BACKOFF;

    for attempt in 1..=MAX_REFRESH_ATTEMPTS {
        if attempt > 1 {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        match repository.get_messages(chat_id).await {
            Ok(messages) => {
                let snapshot = store.snapshot();
                let matched = snapshot
                    .message(chat_id, placeholder_id)
                    .map(|local| durable_contains(&messages, local))
                    .unwrap_or(false);

                // Local messages the durable list already shows are now
                // confirmed; without this the selector would treat the user
                // message as an unconfirmed local write forever and display
                // could never hand over to the durable list.
                {
                    let chat_id = chat_id.to_string();
                    let confirmed = messages.clone();
                    store.apply(StatePatch::update(move |prev| {
                        prev.mark_persisted(&chat_id, |local| durable_contains(&confirmed, local))
                            .with_sync(&chat_id, |sync| sync.on_durable_fetch_resolved(matched))
                    }));
                }
                durable.resolve(chat_id, messages);

                if matched {
                    debug!(chat_id, attempt, "durable view caught up");
                    return;
                }
                debug!(chat_id, attempt, "durable view still behind optimistic state");
            }
            Err(err) => {
                warn!(chat_id, attempt, error = %err, "durable refresh attempt failed");
            }
        }
    }

    warn!(
        chat_id,
        attempts = MAX_REFRESH_ATTEMPTS,
        "durable view did not catch up; keeping optimistic state"
    );
    durable.finish(chat_id);
}
