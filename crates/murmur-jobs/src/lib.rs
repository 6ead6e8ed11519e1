//! Murmur Jobs - In-process queue and interval scheduler
//!
//! Two independent primitives:
//! - [`QueueProvider`]: enqueue/dequeue/acknowledge/reject over named,
//!   bounded queues with a dead-letter list per queue. The default backend is
//!   [`InMemoryQueueProvider`], best-effort and lost on restart.
//! - [`Scheduler`]: named recurring jobs on independent intervals with
//!   per-attempt timeout, retry with delay and optional run-on-start.
//!
//! Both take a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! wherever they may block.
//!
//! # Example
//!
//! ```rust,ignore
//! use murmur_jobs::{ScheduledJob, Scheduler};
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new(config.scheduler.clone());
//! scheduler.register_job(
//!     ScheduledJob::new("status_cleanup", Duration::from_secs(3600), move |token| {
//!         let repo = repo.clone();
//!         async move { repo.delete_expired(chrono::Utc::now()).await?; Ok(()) }
//!     })
//!     .retry(2, Duration::from_secs(5))
//!     .run_on_start(true),
//! )?;
//! scheduler.start()?;
//! ```

pub mod error;
pub mod job;
pub mod memory;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod worker;

pub use error::{JobError, JobResult};
pub use job::{metadata_keys, JobId, QueueJob};
pub use memory::InMemoryQueueProvider;
pub use metrics::{register_metrics, QueueMetrics, SchedulerMetrics, WorkerMetrics};
pub use queue::{DeadLetter, QueueProvider};
pub use retry::{RetryPolicy, RetryStrategy};
pub use scheduler::{JobHandler, JobState, ScheduledJob, ScheduledJobInfo, Scheduler, SchedulerStats};
pub use worker::{QueueHandler, QueueWorkerPool, WorkerPoolConfig, WorkerPoolStats};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::queue::QueueProvider;
    pub use crate::scheduler::{ScheduledJob, Scheduler};
    pub use crate::{JobError, JobId, JobResult, QueueJob};
    pub use tokio_util::sync::CancellationToken;
}
