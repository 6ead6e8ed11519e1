//! Bounded background pool for cache population.
//!
//! Feed reads hand their cache writes to this pool instead of spawning a task
//! per request. Tasks run detached from the submitting request: they carry
//! no cancellation and finish even if the caller went away. When the pool is
//! saturated new tasks are dropped, which only costs a later cache miss.

use crate::metrics::PopulatorMetrics;
use futures::future::BoxFuture;
use murmur_config::CacheConfig;
use murmur_core::MurmurResult;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

struct PopulationTask {
    label: &'static str,
    work: BoxFuture<'static, MurmurResult<()>>,
}

/// Populator statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulatorStats {
    pub workers: usize,
    pub capacity: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Tasks refused because the pool was full or shut down.
    pub dropped: u64,
    /// Tasks queued or running.
    pub pending: usize,
}

#[derive(Default)]
struct Shared {
    pending: AtomicUsize,
    idle: Notify,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed set of workers draining a bounded task queue.
pub struct CachePopulator {
    sender: Mutex<Option<mpsc::Sender<PopulationTask>>>,
    shared: Arc<Shared>,
    tracker: TaskTracker,
    workers: usize,
    capacity: usize,
}

impl CachePopulator {
    /// Spawns `workers` workers. Must be called inside a Tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel::<PopulationTask>(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(Shared::default());
        let tracker = TaskTracker::new();

        for index in 0..workers {
            let receiver = receiver.clone();
            let shared = shared.clone();
            tracker.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(task) = next else { break };
                    run_task(task, &shared).await;
                }
                debug!(worker = index, "Cache populator worker stopped");
            });
        }

        info!(workers, capacity, "Started cache populator");

        Self {
            sender: Mutex::new(Some(sender)),
            shared,
            tracker,
            workers,
            capacity,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.populator_workers, config.populator_queue_capacity)
    }

    /// Queues `work` without waiting. Returns `false` when it was dropped.
    pub fn submit<F>(&self, label: &'static str, work: F) -> bool
    where
        F: Future<Output = MurmurResult<()>> + Send + 'static,
    {
        let Some(sender) = self.sender.lock().clone() else {
            debug!(task = label, "Cache populator is shut down, dropping task");
            self.record_drop(label);
            return false;
        };

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let task = PopulationTask {
            label,
            work: Box::pin(work),
        };

        match sender.try_send(task) {
            Ok(()) => {
                self.shared.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.shared.finish_one();
                if matches!(e, mpsc::error::TrySendError::Full(_)) {
                    warn!(task = label, capacity = self.capacity, "Cache populator saturated, dropping task");
                }
                self.record_drop(label);
                false
            }
        }
    }

    fn record_drop(&self, label: &'static str) {
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        PopulatorMetrics::task_dropped(label);
    }

    /// Resolves once no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.shared.idle.notified();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Stops accepting tasks, lets queued ones finish and waits for the
    /// workers, bounded by `timeout`. Idempotent.
    pub async fn shutdown(&self, timeout: Duration) {
        if self.sender.lock().take().is_none() {
            return;
        }
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                pending = self.shared.pending.load(Ordering::SeqCst),
                "Cache population still running after shutdown timeout"
            );
        }
        info!(
            completed = self.shared.completed.load(Ordering::Relaxed),
            dropped = self.shared.dropped.load(Ordering::Relaxed),
            "Cache populator stopped"
        );
    }

    pub fn stats(&self) -> PopulatorStats {
        PopulatorStats {
            workers: self.workers,
            capacity: self.capacity,
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            pending: self.shared.pending.load(Ordering::SeqCst),
        }
    }
}

async fn run_task(task: PopulationTask, shared: &Shared) {
    let started = Instant::now();
    let result = task.work.await;
    let succeeded = result.is_ok();

    match result {
        Ok(()) => {
            shared.completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(task = task.label, error = %e, "Background cache population failed");
            shared.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    PopulatorMetrics::task_finished(task.label, succeeded, started.elapsed());
    shared.finish_one();
}
