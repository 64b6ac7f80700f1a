//! Partitioned bounded queue in front of the persistence workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::job::PersistJob;
use crate::core_types::{ConversationId, UserId};

/// Non-blocking enqueue result. `Dropped` tells the caller to fall back to
/// an inline write on the request task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued,
    Dropped,
}

pub struct PersistQueue {
    senders: Vec<mpsc::Sender<PersistJob>>,
    /// user_id → conversation id allocated by a create-style job, so the
    /// follow-up turns of a brand-new conversation route to the partition
    /// its first write landed on.
    created: DashMap<UserId, ConversationId>,
    depth: AtomicI64,
}

impl PersistQueue {
    /// Build the queue and hand back one receiver per worker partition.
    pub fn new(workers: usize, capacity: usize) -> (Arc<Self>, Vec<mpsc::Receiver<PersistJob>>) {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut receivers = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            receivers.push(rx);
        }
        (
            Arc::new(Self {
                senders,
                created: DashMap::new(),
                depth: AtomicI64::new(0),
            }),
            receivers,
        )
    }

    /// Route a job to its partition without blocking.
    pub fn enqueue(&self, job: PersistJob) -> EnqueueResult {
        let partition = self.partition_for(&job);
        match self.senders[partition].try_send(job) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                EnqueueResult::Queued
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    partition,
                    user_id = job.turn.user_id,
                    "persist queue full, dropping to inline path"
                );
                EnqueueResult::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::error!(
                    partition,
                    user_id = job.turn.user_id,
                    "persist queue closed, dropping to inline path"
                );
                EnqueueResult::Dropped
            }
        }
    }

    /// Partition mapping: known conversations hash by conversation id,
    /// create-style jobs by user id (stable for the follow-up turns via the
    /// memoized allocation).
    pub fn partition_for(&self, job: &PersistJob) -> usize {
        let key = match job.turn.conversation_id {
            Some(id) => id,
            None => match self.created.get(&job.turn.user_id) {
                Some(entry) => *entry.value(),
                None => job.turn.user_id,
            },
        };
        (key.unsigned_abs() as usize) % self.senders.len()
    }

    /// Record the conversation id a create-style job produced.
    pub fn memoize_created(&self, user_id: UserId, conversation_id: ConversationId) {
        self.created.insert(user_id, conversation_id);
    }

    /// Called by workers when a job leaves the channel.
    pub(crate) fn mark_drained(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Jobs currently queued across all partitions.
    pub fn depth(&self) -> i64 {
        self.depth.load(Ordering::Relaxed).max(0)
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::AppendTurn;

    fn turn(conversation_id: Option<i64>, user_id: i64) -> AppendTurn {
        AppendTurn {
            conversation_id,
            user_id,
            agent_id: None,
            project_id: None,
            model_code: "spark-lite".into(),
            user_text: "hi".into(),
            user_tokens: 1,
            assistant_text: "hello".into(),
            assistant_tokens: 2,
        }
    }

    #[tokio::test]
    async fn same_conversation_routes_to_same_partition() {
        let (queue, _rx) = PersistQueue::new(3, 16);
        let a = queue.partition_for(&PersistJob::new(turn(Some(42), 1)));
        let b = queue.partition_for(&PersistJob::new(turn(Some(42), 7)));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn create_jobs_route_by_user_until_memoized() {
        let (queue, _rx) = PersistQueue::new(3, 16);
        let by_user = queue.partition_for(&PersistJob::new(turn(None, 5)));
        assert_eq!(by_user, 5 % 3);

        queue.memoize_created(5, 9);
        let memoized = queue.partition_for(&PersistJob::new(turn(None, 5)));
        assert_eq!(memoized, 9 % 3);
    }

    #[tokio::test]
    async fn full_partition_reports_dropped() {
        let (queue, mut rx) = PersistQueue::new(1, 1);
        assert_eq!(
            queue.enqueue(PersistJob::new(turn(Some(1), 1))),
            EnqueueResult::Queued
        );
        assert_eq!(
            queue.enqueue(PersistJob::new(turn(Some(1), 1))),
            EnqueueResult::Dropped
        );
        assert_eq!(queue.depth(), 1);

        let job = rx[0].recv().await.unwrap();
        assert_eq!(job.turn.conversation_id, Some(1));
    }

    #[tokio::test]
    async fn fifo_within_partition() {
        let (queue, mut rx) = PersistQueue::new(1, 8);
        for tokens in 1..=3 {
            let mut t = turn(Some(1), 1);
            t.user_tokens = tokens;
            queue.enqueue(PersistJob::new(t));
        }
        for expected in 1..=3 {
            let job = rx[0].recv().await.unwrap();
            assert_eq!(job.turn.user_tokens, expected);
        }
    }
}
