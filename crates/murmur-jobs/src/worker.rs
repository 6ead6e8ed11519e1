//! Consumer pool draining a named queue.

use crate::error::{JobError, JobResult};
use crate::job::QueueJob;
use crate::metrics::WorkerMetrics;
use crate::queue::QueueProvider;
use futures::future::BoxFuture;
use murmur_config::QueueConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Queue job handler function type.
pub type QueueHandler =
    Arc<dyn Fn(QueueJob, CancellationToken) -> BoxFuture<'static, JobResult<()>> + Send + Sync>;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent consumers.
    pub concurrency: usize,

    /// How long one dequeue call blocks before polling again.
    pub poll_timeout: Duration,

    /// Handler execution timeout.
    pub job_timeout: Duration,

    /// Upper bound on waiting for in-flight handlers at shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_timeout: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&QueueConfig> for WorkerPoolConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            poll_timeout: config.default_dequeue_timeout(),
            ..Self::default()
        }
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured concurrency.
    pub concurrency: usize,

    /// Jobs acknowledged.
    pub jobs_processed: u64,

    /// Jobs rejected.
    pub jobs_failed: u64,
}

/// Consumer tasks polling one queue and dispatching by job kind.
///
/// Successful handlers are acknowledged; failures, timeouts and jobs with no
/// registered handler are rejected into the dead-letter list.
pub struct QueueWorkerPool {
    /// Unique pool ID.
    id: String,

    /// Queue being drained.
    queue: String,

    provider: Arc<dyn QueueProvider>,

    config: WorkerPoolConfig,

    /// Handlers by job kind.
    handlers: Arc<RwLock<HashMap<String, QueueHandler>>>,

    cancel: CancellationToken,

    tracker: TaskTracker,

    /// Running flag.
    running: AtomicBool,

    /// Jobs processed counter.
    jobs_processed: Arc<AtomicU64>,

    /// Jobs failed counter.
    jobs_failed: Arc<AtomicU64>,
}

impl QueueWorkerPool {
    /// Create a new worker pool for `queue`.
    pub fn new(provider: Arc<dyn QueueProvider>, queue: impl Into<String>, config: WorkerPoolConfig) -> Self {
        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            queue: queue.into(),
            provider,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            running: AtomicBool::new(false),
            jobs_processed: Arc::new(AtomicU64::new(0)),
            jobs_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a handler for jobs of `kind`.
    pub fn register<F, Fut>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(QueueJob, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        let kind = kind.into();
        let handler: QueueHandler = Arc::new(move |job, token| Box::pin(handler(job, token)));
        self.handlers.write().insert(kind.clone(), handler);
        info!(queue = %self.queue, kind = %kind, "Registered queue handler");
    }

    /// Spawn the consumer tasks.
    pub fn start(&self) -> JobResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Internal("Worker pool already running".to_string()));
        }

        info!(
            pool_id = %self.id,
            queue = %self.queue,
            concurrency = self.config.concurrency,
            "Starting worker pool"
        );

        for index in 0..self.config.concurrency.max(1) {
            let consumer = Consumer {
                queue: self.queue.clone(),
                provider: self.provider.clone(),
                handlers: self.handlers.clone(),
                cancel: self.cancel.clone(),
                poll_timeout: self.config.poll_timeout,
                job_timeout: self.config.job_timeout,
                jobs_processed: self.jobs_processed.clone(),
                jobs_failed: self.jobs_failed.clone(),
            };
            self.tracker
                .spawn(consumer.run().instrument(tracing::info_span!("consumer", pool_id = %self.id, index)));
        }

        Ok(())
    }

    /// Stop consuming and wait for in-flight handlers.
    pub async fn shutdown(&self) {
        info!(pool_id = %self.id, "Stopping worker pool...");
        self.cancel.cancel();
        self.tracker.close();

        if timeout(self.config.shutdown_timeout, self.tracker.wait()).await.is_err() {
            warn!(pool_id = %self.id, "Queue handlers still running after shutdown timeout");
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            pool_id = %self.id,
            processed = self.jobs_processed.load(Ordering::Relaxed),
            failed = self.jobs_failed.load(Ordering::Relaxed),
            "Worker pool stopped"
        );
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            concurrency: self.config.concurrency,
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

struct Consumer {
    queue: String,
    provider: Arc<dyn QueueProvider>,
    handlers: Arc<RwLock<HashMap<String, QueueHandler>>>,
    cancel: CancellationToken,
    poll_timeout: Duration,
    job_timeout: Duration,
    jobs_processed: Arc<AtomicU64>,
    jobs_failed: Arc<AtomicU64>,
}

impl Consumer {
    async fn run(self) {
        loop {
            match self.provider.dequeue(&self.cancel, &self.queue, self.poll_timeout).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => {}
                Err(JobError::Cancelled | JobError::QueueClosed) => break,
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Failed to dequeue job");
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(self.poll_timeout) => {}
                    }
                }
            }
        }
        debug!(queue = %self.queue, "Consumer stopped");
    }

    async fn process(&self, job: QueueJob) {
        let job_id = job.id.clone();
        let kind = job.kind.clone();
        let started = Instant::now();

        let handler = self.handlers.read().get(&kind).cloned();
        let outcome = match handler {
            Some(handler) => match timeout(self.job_timeout, handler(job, self.cancel.child_token())).await {
                Ok(result) => result,
                Err(_) => Err(JobError::Timeout(
                    u64::try_from(self.job_timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            },
            None => Err(JobError::Configuration(format!("No handler for job kind: {kind}"))),
        };

        // Settlement must go through even while the pool is stopping.
        let settle = CancellationToken::new();

        match outcome {
            Ok(()) => {
                debug!(job_id = %job_id, kind = %kind, "Job completed successfully");
                if let Err(e) = self.provider.acknowledge(&settle, &self.queue, &job_id).await {
                    error!(job_id = %job_id, error = %e, "Failed to acknowledge job");
                }
                self.jobs_processed.fetch_add(1, Ordering::Relaxed);
                WorkerMetrics::job_processed(&self.queue, &kind, "acknowledged", started.elapsed());
            }
            Err(e) => {
                warn!(job_id = %job_id, kind = %kind, error = %e, "Job execution failed");
                if let Err(e) = self.provider.reject(&settle, &self.queue, &job_id, &e.to_string()).await {
                    error!(job_id = %job_id, error = %e, "Failed to reject job");
                }
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                WorkerMetrics::job_processed(&self.queue, &kind, "rejected", started.elapsed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_from_queue_config() {
        let queue = QueueConfig {
            default_dequeue_timeout_ms: 250,
            ..QueueConfig::default()
        };
        let config = WorkerPoolConfig::from(&queue);
        assert_eq!(config.poll_timeout, Duration::from_millis(250));
        assert_eq!(config.concurrency, 4);
    }
}
