//! Deferred conversation persistence.
//!
//! Chat-stream completion never blocks on the database: the orchestrator
//! enqueues a job and moves on. Workers drain partitioned bounded channels;
//! jobs for one conversation always land on the same partition, which is the
//! only in-process place per-conversation write order is protected.

mod job;
mod queue;
mod worker;

pub use job::PersistJob;
pub use queue::{EnqueueResult, PersistQueue};
pub use worker::spawn_workers;
