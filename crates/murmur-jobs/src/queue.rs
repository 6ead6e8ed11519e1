//! Queue provider abstraction.

use crate::error::JobResult;
use crate::job::{JobId, QueueJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shaku::Interface;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A rejected job set aside for inspection or bulk retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The job as it was when rejected.
    pub job: QueueJob,

    /// Rejection reason given by the consumer.
    pub reason: String,

    /// Rejection time.
    pub failed_at: DateTime<Utc>,
}

/// Work distribution over named queues.
///
/// Every operation takes the caller's cancellation token. Delivery is
/// best-effort: a job is handed to at most one consumer and there is no lease,
/// so a consumer that crashes before acknowledging loses the job.
#[async_trait]
pub trait QueueProvider: Interface + Send + Sync {
    /// Places a job at the tail of `queue`, creating the queue on first use.
    ///
    /// Never blocks: a full queue fails with [`JobError::QueueFull`].
    ///
    /// [`JobError::QueueFull`]: crate::JobError::QueueFull
    async fn enqueue(&self, cancel: &CancellationToken, queue: &str, job: QueueJob) -> JobResult<()>;

    /// Waits up to `timeout` for the next job.
    ///
    /// Returns `Ok(None)` when the timeout elapses so consumers can poll in a
    /// loop.
    async fn dequeue(
        &self,
        cancel: &CancellationToken,
        queue: &str,
        timeout: Duration,
    ) -> JobResult<Option<QueueJob>>;

    /// Confirms that a dequeued job was processed.
    async fn acknowledge(&self, cancel: &CancellationToken, queue: &str, job_id: &JobId) -> JobResult<()>;

    /// Moves a dequeued job to the queue's dead-letter list.
    async fn reject(
        &self,
        cancel: &CancellationToken,
        queue: &str,
        job_id: &JobId,
        reason: &str,
    ) -> JobResult<()>;

    /// Re-enqueues the dead letters present at call time, bumping each job's
    /// attempt counter. Returns how many made it back into the queue.
    async fn retry_failed(&self, cancel: &CancellationToken, queue: &str) -> JobResult<usize>;

    /// Jobs currently waiting in `queue`. Advisory only.
    async fn pending_count(&self, cancel: &CancellationToken, queue: &str) -> JobResult<usize>;

    /// Dead letters currently held for `queue`. Advisory only.
    async fn failed_count(&self, cancel: &CancellationToken, queue: &str) -> JobResult<usize>;

    /// Snapshot of the dead letters held for `queue`.
    async fn list_failed(&self, cancel: &CancellationToken, queue: &str) -> JobResult<Vec<DeadLetter>>;

    /// Liveness check; fails once the provider is closed.
    async fn ping(&self, cancel: &CancellationToken) -> JobResult<()>;

    /// Shuts the provider down. Idempotent.
    async fn close(&self) -> JobResult<()>;
}
