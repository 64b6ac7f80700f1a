//! Persistence worker loop: one task per partition, FIFO within it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::job::PersistJob;
use super::queue::{EnqueueResult, PersistQueue};
use crate::conversation::ConversationStore;

const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Spawn one worker per receiver. Workers exit when every sender is dropped
/// and their channel drains, which is how graceful shutdown completes
/// in-flight writes. Client disconnects never cancel a worker.
pub fn spawn_workers(
    store: ConversationStore,
    queue: Arc<PersistQueue>,
    receivers: Vec<mpsc::Receiver<PersistJob>>,
    max_attempts: u32,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(partition, rx)| {
            let store = store.clone();
            // Weak handle: workers must not keep the queue senders alive,
            // or shutdown could never close the channels they drain.
            let queue = Arc::downgrade(&queue);
            tokio::spawn(async move {
                run_worker(partition, store, queue, rx, max_attempts).await;
            })
        })
        .collect()
}

async fn run_worker(
    partition: usize,
    store: ConversationStore,
    queue: Weak<PersistQueue>,
    mut rx: mpsc::Receiver<PersistJob>,
    max_attempts: u32,
) {
    tracing::info!(partition, "persist worker started");
    while let Some(mut job) = rx.recv().await {
        if let Some(queue) = queue.upgrade() {
            queue.mark_drained();
        }
        let was_create = job.turn.conversation_id.is_none();

        match store.append_turn(&job.turn).await {
            Ok(conversation_id) => {
                if was_create {
                    if let Some(queue) = queue.upgrade() {
                        queue.memoize_created(job.turn.user_id, conversation_id);
                    }
                }
                tracing::debug!(partition, conversation_id, "turn persisted");
            }
            Err(e) => {
                job.attempts += 1;
                if job.attempts >= max_attempts {
                    // The turn is lost but no ledger state is touched.
                    tracing::error!(
                        partition,
                        user_id = job.turn.user_id,
                        attempts = job.attempts,
                        error = %e,
                        "persist job dropped after repeated failures"
                    );
                    continue;
                }
                tracing::warn!(
                    partition,
                    attempts = job.attempts,
                    error = %e,
                    "persist job failed, re-enqueueing"
                );
                tokio::time::sleep(RETRY_DELAY * job.attempts).await;
                match queue.upgrade() {
                    Some(queue) if queue.enqueue(job) == EnqueueResult::Queued => {}
                    _ => tracing::error!(partition, "re-enqueue failed, persist job lost"),
                }
            }
        }
    }
    tracing::info!(partition, "persist worker stopped");
}
