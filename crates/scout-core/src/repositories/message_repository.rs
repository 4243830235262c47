use std::future::Future;
use std::pin::Pin;

use super::error::RepositoryResult;
use crate::models::Message;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Repository trait for the durable message source.
///
/// The backing store is remote and refreshes on its own cadence; this trait
/// is the only way the core observes it. Implementations must be cheap to
/// clone behind an `Arc` and safe to call for conversations the store has
/// never seen (empty list, not an error).
pub trait MessageRepository: Send + Sync + 'static {
    /// Fetch the confirmed messages of one conversation.
    fn get_messages(&self, conversation_id: &str)
    -> BoxFuture<'static, RepositoryResult<Vec<Message>>>;
}
