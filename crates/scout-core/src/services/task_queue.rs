use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

type TailFuture = Shared<BoxFuture<'static, ()>>;

struct TailEntry {
    seq: u64,
    done: TailFuture,
}

/// Serializes async operations by key.
///
/// Operations sharing a key run strictly sequentially in submission order;
/// operations on different keys run concurrently with no ordering between
/// them. Each key maps to the tail of its chain: enqueuing chains the new
/// operation onto the previous tail while ignoring the tail's outcome, so a
/// failed operation rejects only its own caller and never stalls or drops
/// later work for that key.
///
/// Operations are spawned onto the runtime, so dropping the returned future
/// abandons the result but never cancels the work: an in-flight generation
/// keeps running to completion in the background. A settled chain with no
/// pending continuation evicts its map entry, keeping the key set bounded
/// over long sessions touching many conversations.
pub struct KeyedTaskQueue {
    tails: Arc<Mutex<HashMap<String, TailEntry>>>,
    next_seq: AtomicU64,
}

impl KeyedTaskQueue {
    pub fn new() -> Self {
        Self {
            tails: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Number of keys with an unsettled chain.
    pub fn active_keys(&self) -> usize {
        self.tails.lock().len()
    }

    /// Queue `operation` behind any pending work for `key`.
    ///
    /// The returned future resolves or rejects from this operation only.
    pub fn enqueue<T, F>(
        &self,
        key: &str,
        operation: F,
    ) -> impl Future<Output = Result<T>> + Send + use<T, F>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let key = key.to_string();
        let tails = self.tails.clone();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let (result_tx, result_rx) = oneshot::channel::<Result<T>>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let done: TailFuture = done_rx.map(|_| ()).boxed().shared();

        // Replace the tail before spawning so a second enqueue racing with
        // this one chains onto us, not onto our predecessor.
        let previous = {
            let mut map = tails.lock();
            map.insert(key.clone(), TailEntry { seq, done })
                .map(|entry| entry.done)
        };

        tokio::spawn(async move {
            if let Some(previous) = previous {
                // Predecessor outcome is deliberately ignored: its failure
                // already rejected its own caller.
                previous.await;
            }

            let result = operation.await;
            let _ = result_tx.send(result);
            let _ = done_tx.send(());

            let mut map = tails.lock();
            if map.get(&key).is_some_and(|entry| entry.seq == seq) {
                map.remove(&key);
                debug!(key = %key, "task chain settled, key evicted");
            }
        });

        async move {
            result_rx
                .await
                .unwrap_or_else(|_| Err(anyhow!("queued task aborted before completing")))
        }
    }
}

impl Default for KeyedTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, event: &str) {
        log.lock().push(event.to_string());
    }

    #[tokio::test]
    async fn test_same_key_runs_in_submission_order_without_overlap() {
        let queue = KeyedTaskQueue::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let log = log.clone();
            queue.enqueue("chat-a", async move {
                record(&log, "first-start");
                sleep(Duration::from_millis(50)).await;
                record(&log, "first-end");
                Ok(())
            })
        };
        let second = {
            let log = log.clone();
            queue.enqueue("chat-a", async move {
                record(&log, "second-start");
                record(&log, "second-end");
                Ok(())
            })
        };

        let (r1, r2) = tokio::join!(first, second);
        r1.unwrap();
        r2.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["first-start", "first-end", "second-start", "second-end"],
            "first task's completion side-effect observed before the second starts"
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_stall_later_work_for_same_key() {
        let queue = KeyedTaskQueue::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let failing = queue.enqueue("chat-a", async move {
            Err::<(), _>(anyhow!("task exploded"))
        });
        let second = {
            let log = log.clone();
            queue.enqueue("chat-a", async move {
                record(&log, "second-ran");
                Ok(42)
            })
        };

        let (r1, r2) = tokio::join!(failing, second);
        assert!(r1.is_err(), "only the failing task's future rejects");
        assert_eq!(r2.unwrap(), 42);
        assert_eq!(*log.lock(), vec!["second-ran"]);
    }

    #[tokio::test]
    async fn test_different_keys_overlap() {
        let queue = KeyedTaskQueue::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let task = |key: &str| {
            let log = log.clone();
            let key = key.to_string();
            queue.enqueue(&key.clone(), async move {
                record(&log, &format!("{key}-started"));
                sleep(Duration::from_millis(50)).await;
                record(&log, &format!("{key}-finished"));
                Ok(())
            })
        };

        let (ra, rb) = tokio::join!(task("chat-a"), task("chat-b"));
        ra.unwrap();
        rb.unwrap();

        let events = log.lock().clone();
        assert!(
            events[0].ends_with("-started") && events[1].ends_with("-started"),
            "both keys report started before either finishes: {events:?}"
        );
    }

    #[tokio::test]
    async fn test_dropped_caller_future_does_not_cancel_work() {
        let queue = KeyedTaskQueue::new();
        let completed = Arc::new(Mutex::new(false));

        let fut = {
            let completed = completed.clone();
            queue.enqueue("chat-a", async move {
                sleep(Duration::from_millis(20)).await;
                *completed.lock() = true;
                Ok(())
            })
        };
        drop(fut);

        sleep(Duration::from_millis(100)).await;
        assert!(*completed.lock(), "abandoned task still ran to completion");
    }

    #[tokio::test]
    async fn test_settled_keys_are_evicted() {
        let queue = KeyedTaskQueue::new();

        queue.enqueue("chat-a", async { Ok(()) }).await.unwrap();
        queue.enqueue("chat-b", async { Ok(()) }).await.unwrap();

        // Eviction runs just after the result is delivered; give the spawned
        // continuation a moment.
        for _ in 0..50 {
            if queue.active_keys() == 0 {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.active_keys(), 0);
    }
}
