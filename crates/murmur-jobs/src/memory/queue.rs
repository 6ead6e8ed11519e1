//! Channel-backed queue provider.

use crate::error::{JobError, JobResult};
use crate::job::{metadata_keys, JobId, QueueJob};
use crate::metrics::QueueMetrics;
use crate::queue::{DeadLetter, QueueProvider};
use async_trait::async_trait;
use chrono::Utc;
use murmur_config::QueueConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One named queue: a bounded channel whose receiver is shared by consumers.
#[derive(Clone)]
struct Channel {
    sender: mpsc::Sender<QueueJob>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<QueueJob>>>,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
        }
    }

    fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// Dequeued jobs of one queue awaiting acknowledge or reject, kept so a
/// rejection can dead-letter the full job. Bounded; the oldest are dropped
/// first and a later rejection of one records a detached entry.
#[derive(Default)]
struct InFlight {
    jobs: HashMap<JobId, QueueJob>,
    /// Dequeue order. May hold IDs already acknowledged or rejected.
    order: VecDeque<JobId>,
}

impl InFlight {
    fn insert(&mut self, job: QueueJob, limit: usize) -> usize {
        self.order.push_back(job.id.clone());
        self.jobs.insert(job.id.clone(), job);

        let mut evicted = 0;
        while self.jobs.len() > limit {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.jobs.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        if self.order.len() > limit.saturating_mul(2) {
            let jobs = &self.jobs;
            self.order.retain(|id| jobs.contains_key(id));
        }
        evicted
    }

    fn remove(&mut self, id: &JobId) -> Option<QueueJob> {
        self.jobs.remove(id)
    }
}

#[derive(Default)]
struct Registry {
    queues: HashMap<String, Channel>,
    dead_letters: HashMap<String, Vec<DeadLetter>>,
    in_flight: HashMap<String, InFlight>,
    closed: bool,
}

impl Registry {
    fn channel(&mut self, queue: &str, capacity: usize) -> JobResult<Channel> {
        if self.closed {
            return Err(JobError::QueueClosed);
        }
        let channel = self
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                debug!(queue = %queue, capacity, "Created queue");
                Channel::new(capacity)
            });
        Ok(channel.clone())
    }
}

/// Queue provider backed by bounded tokio channels.
///
/// A single mutex guards the registry (queue map, dead letters, in-flight
/// jobs, closed flag). Job hand-off itself goes through the channels, so the
/// lock is only held for map lookups and never across an await.
pub struct InMemoryQueueProvider {
    capacity: usize,
    in_flight_limit: usize,
    registry: Mutex<Registry>,
    shutdown: CancellationToken,
}

impl InMemoryQueueProvider {
    /// Creates a provider whose queues each hold up to `capacity` jobs.
    ///
    /// Up to `capacity` unacknowledged jobs per queue are also remembered for
    /// [`QueueProvider::reject`]; see [`InMemoryQueueProvider::with_in_flight_limit`].
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_flight_limit: capacity.max(1),
            registry: Mutex::new(Registry::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Sets how many dequeued but unacknowledged jobs each queue remembers.
    /// Rejecting a job that was dropped from this window dead-letters its ID
    /// without the payload.
    #[must_use]
    pub fn with_in_flight_limit(mut self, limit: usize) -> Self {
        self.in_flight_limit = limit.max(1);
        self
    }

    /// Creates a provider from configuration.
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Capacity of each queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true once [`QueueProvider::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    fn channel(&self, queue: &str) -> JobResult<Channel> {
        self.registry.lock().channel(queue, self.capacity)
    }

    fn report_sizes(&self, queue: &str) {
        let registry = self.registry.lock();
        let pending = registry.queues.get(queue).map_or(0, Channel::pending);
        let dead = registry.dead_letters.get(queue).map_or(0, Vec::len);
        drop(registry);
        QueueMetrics::update_sizes(queue, pending, dead);
    }
}

impl Default for InMemoryQueueProvider {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryQueueProvider {
    async fn enqueue(&self, cancel: &CancellationToken, queue: &str, mut job: QueueJob) -> JobResult<()> {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let channel = self.channel(queue)?;
        job.stamp(metadata_keys::ENQUEUED_AT);
        let kind = job.kind.clone();

        match channel.sender.try_send(job) {
            Ok(()) => {
                debug!(queue = %queue, kind = %kind, "Enqueued job");
                QueueMetrics::job_enqueued(queue, &kind);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                QueueMetrics::queue_full(queue);
                Err(JobError::QueueFull(queue.to_string()))
            }
            Err(TrySendError::Closed(_)) => Err(JobError::QueueClosed),
        }
    }

    async fn dequeue(
        &self,
        cancel: &CancellationToken,
        queue: &str,
        timeout: Duration,
    ) -> JobResult<Option<QueueJob>> {
        let channel = self.channel(queue)?;

        let received = async {
            let mut receiver = channel.receiver.lock().await;
            receiver.recv().await
        };

        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(JobError::Cancelled),
            () = self.shutdown.cancelled() => return Err(JobError::QueueClosed),
            result = tokio::time::timeout(timeout, received) => match result {
                Err(_) => return Ok(None),
                Ok(None) => return Err(JobError::QueueClosed),
                Ok(Some(job)) => job,
            },
        };

        let mut job = job;
        job.stamp(metadata_keys::DEQUEUED_AT);

        let evicted = self
            .registry
            .lock()
            .in_flight
            .entry(queue.to_string())
            .or_default()
            .insert(job.clone(), self.in_flight_limit);
        if evicted > 0 {
            debug!(queue = %queue, evicted, "Forgot oldest unacknowledged jobs");
        }

        debug!(queue = %queue, job_id = %job.id, "Dequeued job");
        QueueMetrics::job_dequeued(queue, &job.kind);

        Ok(Some(job))
    }

    async fn acknowledge(&self, _cancel: &CancellationToken, queue: &str, job_id: &JobId) -> JobResult<()> {
        // The channel already handed the job off; only the in-flight copy remains.
        if let Some(in_flight) = self.registry.lock().in_flight.get_mut(queue) {
            in_flight.remove(job_id);
        }
        QueueMetrics::job_acknowledged(queue);
        Ok(())
    }

    async fn reject(
        &self,
        _cancel: &CancellationToken,
        queue: &str,
        job_id: &JobId,
        reason: &str,
    ) -> JobResult<()> {
        let kind = {
            let mut registry = self.registry.lock();
            let job = registry
                .in_flight
                .get_mut(queue)
                .and_then(|in_flight| in_flight.remove(job_id))
                .unwrap_or_else(|| QueueJob::detached(job_id.clone()));
            let kind = job.kind.clone();

            registry
                .dead_letters
                .entry(queue.to_string())
                .or_default()
                .push(DeadLetter {
                    job,
                    reason: reason.to_string(),
                    failed_at: Utc::now(),
                });
            kind
        };

        warn!(queue = %queue, job_id = %job_id, reason = %reason, "Job dead-lettered");
        QueueMetrics::job_rejected(queue, &kind);
        self.report_sizes(queue);
        Ok(())
    }

    async fn retry_failed(&self, cancel: &CancellationToken, queue: &str) -> JobResult<usize> {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let (entries, channel) = {
            let mut registry = self.registry.lock();
            let channel = registry.channel(queue, self.capacity)?;
            let entries = registry
                .dead_letters
                .get_mut(queue)
                .map(std::mem::take)
                .unwrap_or_default();
            (entries, channel)
        };

        let total = entries.len();
        let mut retried = 0;

        for entry in entries {
            let mut job = entry.job;
            job.attempts += 1;
            job.metadata
                .insert(metadata_keys::LAST_FAILURE.to_string(), entry.reason);
            job.stamp(metadata_keys::ENQUEUED_AT);

            match channel.sender.try_send(job) {
                Ok(()) => retried += 1,
                Err(TrySendError::Full(job) | TrySendError::Closed(job)) => {
                    warn!(queue = %queue, job_id = %job.id, "Dropped dead letter that no longer fits its queue");
                }
            }
        }

        info!(queue = %queue, retried, dropped = total - retried, "Retried dead letters");
        QueueMetrics::jobs_retried(queue, retried);
        self.report_sizes(queue);

        Ok(retried)
    }

    async fn pending_count(&self, _cancel: &CancellationToken, queue: &str) -> JobResult<usize> {
        Ok(self
            .registry
            .lock()
            .queues
            .get(queue)
            .map_or(0, Channel::pending))
    }

    async fn failed_count(&self, _cancel: &CancellationToken, queue: &str) -> JobResult<usize> {
        Ok(self
            .registry
            .lock()
            .dead_letters
            .get(queue)
            .map_or(0, Vec::len))
    }

    async fn list_failed(&self, _cancel: &CancellationToken, queue: &str) -> JobResult<Vec<DeadLetter>> {
        Ok(self
            .registry
            .lock()
            .dead_letters
            .get(queue)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self, cancel: &CancellationToken) -> JobResult<()> {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        if self.is_closed() {
            return Err(JobError::QueueClosed);
        }
        Ok(())
    }

    async fn close(&self) -> JobResult<()> {
        let queues = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return Ok(());
            }
            registry.closed = true;
            registry.in_flight.clear();
            std::mem::take(&mut registry.queues)
        };

        // Wake consumers blocked in dequeue so they release the receivers.
        self.shutdown.cancel();

        let mut drained = 0usize;
        for (name, channel) in queues {
            let Channel { sender, receiver } = channel;
            drop(sender);
            if let Ok(mut receiver) = receiver.try_lock() {
                receiver.close();
                while receiver.try_recv().is_ok() {
                    drained += 1;
                }
            }
            debug!(queue = %name, "Closed queue");
        }

        info!(drained, "In-memory queue provider closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(n: u32) -> QueueJob {
        QueueJob::new("test", json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_enqueue_stamps_metadata() {
        let provider = InMemoryQueueProvider::new(4);
        let cancel = CancellationToken::new();

        provider.enqueue(&cancel, "q", job(1)).await.unwrap();
        let dequeued = provider
            .dequeue(&cancel, "q", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        assert!(dequeued.metadata(metadata_keys::ENQUEUED_AT).is_some());
        assert!(dequeued.metadata(metadata_keys::DEQUEUED_AT).is_some());
    }

    #[tokio::test]
    async fn test_reject_unknown_id_records_detached_entry() {
        let provider = InMemoryQueueProvider::new(4);
        let cancel = CancellationToken::new();
        let id = JobId::from("never-dequeued");

        provider.reject(&cancel, "q", &id, "gone").await.unwrap();

        let failed = provider.list_failed(&cancel, "q").await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job.id, id);
        assert_eq!(failed[0].job.payload, serde_json::Value::Null);
        assert_eq!(failed[0].reason, "gone");
    }

    #[tokio::test]
    async fn test_acknowledge_clears_in_flight() {
        let provider = InMemoryQueueProvider::new(4);
        let cancel = CancellationToken::new();

        provider.enqueue(&cancel, "q", job(1)).await.unwrap();
        let dequeued = provider
            .dequeue(&cancel, "q", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        provider.acknowledge(&cancel, "q", &dequeued.id).await.unwrap();

        assert_eq!(provider.registry.lock().in_flight["q"].jobs.len(), 0);
    }

    #[tokio::test]
    async fn test_unacknowledged_jobs_are_bounded() {
        let provider = InMemoryQueueProvider::new(8);
        let cancel = CancellationToken::new();
        let mut last = None;

        for n in 0..1000 {
            provider.enqueue(&cancel, "q", job(n)).await.unwrap();
            last = provider
                .dequeue(&cancel, "q", Duration::from_millis(10))
                .await
                .unwrap();
        }

        {
            let registry = provider.registry.lock();
            let in_flight = &registry.in_flight["q"];
            assert_eq!(in_flight.jobs.len(), 8);
            assert!(in_flight.order.len() <= 16);
        }

        // The newest job is still rejected with its payload.
        let last = last.unwrap();
        provider.reject(&cancel, "q", &last.id, "boom").await.unwrap();
        let failed = provider.list_failed(&cancel, "q").await.unwrap();
        assert_eq!(failed[0].job.payload, json!({ "n": 999 }));
    }

    #[tokio::test]
    async fn test_in_flight_evicts_oldest_first() {
        let provider = InMemoryQueueProvider::new(8).with_in_flight_limit(2);
        let cancel = CancellationToken::new();
        let mut ids = Vec::new();

        for n in 0..3 {
            provider.enqueue(&cancel, "q", job(n)).await.unwrap();
            let dequeued = provider
                .dequeue(&cancel, "q", Duration::from_millis(10))
                .await
                .unwrap()
                .unwrap();
            ids.push(dequeued.id);
        }

        provider.reject(&cancel, "q", &ids[0], "late").await.unwrap();
        provider.reject(&cancel, "q", &ids[2], "boom").await.unwrap();

        let failed = provider.list_failed(&cancel, "q").await.unwrap();
        assert_eq!(failed[0].job.payload, serde_json::Value::Null);
        assert_eq!(failed[1].job.payload, json!({ "n": 2 }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let provider = InMemoryQueueProvider::new(4);
        provider.close().await.unwrap();
        provider.close().await.unwrap();
        assert!(provider.is_closed());
    }

    #[tokio::test]
    async fn test_counts_for_unknown_queue() {
        let provider = InMemoryQueueProvider::new(4);
        let cancel = CancellationToken::new();
        assert_eq!(provider.pending_count(&cancel, "nothing").await.unwrap(), 0);
        assert_eq!(provider.failed_count(&cancel, "nothing").await.unwrap(), 0);
    }
}
