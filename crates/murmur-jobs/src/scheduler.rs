//! Interval scheduler for recurring in-process jobs.
//!
//! Every registered job gets its own task and timer, so a slow job never
//! delays another job's tick. A run makes up to `1 + retries` attempts, each
//! bounded by the job's timeout; exhausting them is logged and the job simply
//! waits for its next tick.

use crate::error::{JobError, JobResult};
use crate::metrics::SchedulerMetrics;
use crate::retry::{duration_ms, RetryPolicy};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use murmur_config::SchedulerConfig;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Scheduled job handler. Receives a token cancelled on scheduler shutdown.
pub type JobHandler =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, JobResult<()>> + Send + Sync>;

/// Scheduled job definition.
#[derive(Clone)]
pub struct ScheduledJob {
    /// Unique name for this scheduled job.
    pub name: String,

    /// Period between runs.
    pub interval: Duration,

    /// Per-attempt timeout; the scheduler default applies when unset.
    pub timeout: Option<Duration>,

    /// Retry policy; the scheduler default applies when unset.
    pub retry: Option<RetryPolicy>,

    /// Run once as soon as the scheduler starts.
    pub run_on_start: bool,

    handler: JobHandler,
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("run_on_start", &self.run_on_start)
            .finish_non_exhaustive()
    }
}

impl ScheduledJob {
    /// Create a new scheduled job.
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, handler: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(move |token| Box::pin(handler(token)));

        Self {
            name: name.into(),
            interval,
            timeout: None,
            retry: None,
            run_on_start: false,
            handler,
        }
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retry `count` times with a fixed `delay` between attempts.
    #[must_use]
    pub fn retry(mut self, count: u32, delay: Duration) -> Self {
        self.retry = Some(RetryPolicy::fixed(count, delay));
        self
    }

    /// Set a custom retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set whether the job runs immediately on scheduler start.
    #[must_use]
    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}

/// Per-job execution state.
///
/// `Succeeded` and `Failed` are idle states that carry the outcome of the
/// latest run; the job goes back to `Running` on its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Registered, never run.
    Idle,
    /// An attempt or retry delay is in progress.
    Running,
    /// The latest run succeeded.
    Succeeded,
    /// The latest run exhausted its attempts.
    Failed,
}

/// Information about a scheduled job.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJobInfo {
    /// Job name.
    pub name: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub run_on_start: bool,
    pub state: JobState,
    /// Completed runs (a run includes its retries).
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_duration: Option<Duration>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct RunState {
    state: JobState,
    run_count: u64,
    success_count: u64,
    failure_count: u64,
    last_run_at: Option<DateTime<Utc>>,
    last_duration: Option<Duration>,
    last_error: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            last_run_at: None,
            last_duration: None,
            last_error: None,
        }
    }
}

/// A job with scheduler defaults resolved.
struct RegisteredJob {
    name: String,
    interval: Duration,
    timeout: Duration,
    retry: RetryPolicy,
    run_on_start: bool,
    handler: JobHandler,
    run_state: Mutex<RunState>,
    /// Serializes ticks with manual triggers of the same job.
    run_lock: tokio::sync::Mutex<()>,
}

impl RegisteredJob {
    fn info(&self) -> ScheduledJobInfo {
        let run = self.run_state.lock();
        ScheduledJobInfo {
            name: self.name.clone(),
            interval: self.interval,
            timeout: self.timeout,
            max_attempts: self.retry.max_attempts(),
            run_on_start: self.run_on_start,
            state: run.state,
            run_count: run.run_count,
            success_count: run.success_count,
            failure_count: run.failure_count,
            last_run_at: run.last_run_at,
            last_duration: run.last_duration,
            last_error: run.last_error.clone(),
        }
    }

    fn mark_running(&self) {
        let mut run = self.run_state.lock();
        run.state = JobState::Running;
        run.last_run_at = Some(Utc::now());
    }

    fn mark_finished(&self, outcome: &JobResult<()>, duration: Duration) {
        let mut run = self.run_state.lock();
        run.run_count += 1;
        run.last_duration = Some(duration);
        match outcome {
            Ok(()) => {
                run.state = JobState::Succeeded;
                run.success_count += 1;
                run.last_error = None;
            }
            // Interrupted runs are neither successes nor failures.
            Err(JobError::Cancelled) => run.state = JobState::Idle,
            Err(e) => {
                run.state = JobState::Failed;
                run.failure_count += 1;
                run.last_error = Some(e.to_string());
            }
        }
    }

    /// Runs the job once, retrying per policy. Never panics the caller on
    /// handler failure; the outcome is recorded and returned.
    async fn execute(&self, cancel: &CancellationToken) -> JobResult<()> {
        let _guard = self.run_lock.lock().await;
        let max_attempts = self.retry.max_attempts();
        let started = Instant::now();

        self.mark_running();
        debug!(job_name = %self.name, "Running scheduled job");

        let mut outcome = Err(JobError::Cancelled);

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                outcome = Err(JobError::Cancelled);
                break;
            }

            outcome = match tokio::time::timeout(self.timeout, (self.handler)(cancel.child_token())).await {
                Ok(result) => result,
                Err(_) => Err(JobError::Timeout(duration_ms(self.timeout))),
            };

            let Err(e) = &outcome else {
                break;
            };

            if attempt == max_attempts {
                break;
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                job_name = %self.name,
                attempt,
                max_attempts,
                retry_in_ms = duration_ms(delay),
                error = %e,
                "Scheduled job attempt failed"
            );
            SchedulerMetrics::job_retried(&self.name, attempt);

            tokio::select! {
                () = cancel.cancelled() => {
                    outcome = Err(JobError::Cancelled);
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        let duration = started.elapsed();
        self.mark_finished(&outcome, duration);
        if !matches!(outcome, Err(JobError::Cancelled)) {
            SchedulerMetrics::run_completed(&self.name, outcome.is_ok(), duration);
        }

        match &outcome {
            Ok(()) => info!(
                job_name = %self.name,
                duration_ms = duration_ms(duration),
                "Scheduled job completed"
            ),
            Err(JobError::Cancelled) => info!(job_name = %self.name, "Scheduled job interrupted by shutdown"),
            Err(e) => error!(
                job_name = %self.name,
                attempts = max_attempts,
                error = %e,
                "Scheduled job failed after exhausting retries"
            ),
        }

        outcome
    }
}

/// Scheduler statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    /// Scheduler ID.
    pub id: String,

    /// Is the scheduler running.
    pub running: bool,

    /// Number of registered jobs.
    pub scheduled_jobs: usize,

    /// Runs completed across all jobs.
    pub jobs_executed: u64,
}

/// Interval scheduler with one task per job.
pub struct Scheduler {
    /// Unique scheduler ID.
    id: String,

    /// Scheduler configuration.
    config: SchedulerConfig,

    /// Registered jobs.
    jobs: RwLock<HashMap<String, Arc<RegisteredJob>>>,

    /// Cancelled on shutdown; every job attempt gets a child token.
    cancel: CancellationToken,

    /// Tracks job loop tasks.
    tracker: TaskTracker,

    /// Running flag. Only changed while `jobs` is write-locked.
    running: AtomicBool,

    /// Set once shutdown began.
    stopped: AtomicBool,

    /// Runs completed counter.
    jobs_executed: Arc<AtomicU64>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            id: format!("scheduler-{}", Uuid::new_v4()),
            config,
            jobs: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            jobs_executed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get scheduler ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register a job.
    ///
    /// Allowed before and after [`Scheduler::start`]; a job registered on a
    /// running scheduler starts its loop immediately.
    pub fn register_job(&self, job: ScheduledJob) -> JobResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(JobError::Scheduler("Scheduler is shut down".to_string()));
        }
        if job.name.is_empty() {
            return Err(JobError::Configuration("Job name must not be empty".to_string()));
        }
        if job.interval.is_zero() {
            return Err(JobError::Configuration(format!(
                "Interval of job {} must be greater than zero",
                job.name
            )));
        }

        let registered = Arc::new(RegisteredJob {
            timeout: job.timeout.unwrap_or_else(|| self.config.default_timeout()),
            retry: job.retry.unwrap_or_else(|| {
                RetryPolicy::fixed(self.config.default_retry_count, self.config.default_retry_delay())
            }),
            name: job.name,
            interval: job.interval,
            run_on_start: job.run_on_start,
            handler: job.handler,
            run_state: Mutex::new(RunState::default()),
            run_lock: tokio::sync::Mutex::new(()),
        });

        let mut jobs = self.jobs.write();
        if jobs.contains_key(&registered.name) {
            return Err(JobError::AlreadyRegistered(registered.name.clone()));
        }
        jobs.insert(registered.name.clone(), registered.clone());
        SchedulerMetrics::update_job_count(jobs.len());

        info!(
            job_name = %registered.name,
            interval_ms = duration_ms(registered.interval),
            run_on_start = registered.run_on_start,
            "Registered scheduled job"
        );

        if self.running.load(Ordering::SeqCst) {
            self.spawn_job(registered);
        }

        Ok(())
    }

    /// Start the scheduler: spawn one loop per registered job.
    pub fn start(&self) -> JobResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(JobError::Scheduler("Scheduler is shut down".to_string()));
        }

        let jobs = self.jobs.write();
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Scheduler("Scheduler already running".to_string()));
        }

        info!(scheduler_id = %self.id, jobs = jobs.len(), "Starting scheduler");

        for job in jobs.values() {
            self.spawn_job(job.clone());
        }

        Ok(())
    }

    fn spawn_job(&self, job: Arc<RegisteredJob>) {
        let cancel = self.cancel.clone();
        let executed = self.jobs_executed.clone();

        self.tracker.spawn(async move {
            // Ticks are anchored at start time, not at the end of the first run.
            let mut ticker = interval_at(Instant::now() + job.interval, job.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            if job.run_on_start {
                let _ = job.execute(&cancel).await;
                executed.fetch_add(1, Ordering::Relaxed);
            }

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = job.execute(&cancel).await;
                        executed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            debug!(job_name = %job.name, "Scheduled job loop stopped");
        });
    }

    /// Runs a job now, outside its schedule, with the same timeout and retry
    /// rules. Waits for any in-progress run of the same job first.
    pub async fn trigger_job(&self, name: &str) -> JobResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(JobError::Scheduler("Scheduler is shut down".to_string()));
        }

        let job = self
            .jobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| JobError::NotFound(format!("Scheduled job not found: {name}")))?;

        info!(job_name = %name, "Manually triggering scheduled job");
        let outcome = job.execute(&self.cancel).await;
        self.jobs_executed.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Stops all job loops, cancels in-flight attempts and waits for them to
    /// return, bounded by `shutdown_timeout_secs`. Idempotent.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(scheduler_id = %self.id, "Stopping scheduler...");
        self.cancel.cancel();
        self.tracker.close();

        if tokio::time::timeout(self.config.shutdown_timeout(), self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                scheduler_id = %self.id,
                timeout_secs = self.config.shutdown_timeout_secs,
                "Scheduled jobs still running after shutdown timeout"
            );
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            scheduler_id = %self.id,
            jobs_executed = self.jobs_executed.load(Ordering::Relaxed),
            "Scheduler stopped"
        );
    }

    /// Check if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            id: self.id.clone(),
            running: self.is_running(),
            scheduled_jobs: self.jobs.read().len(),
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
        }
    }

    /// List all registered jobs, sorted by name.
    pub fn list_jobs(&self) -> Vec<ScheduledJobInfo> {
        let mut jobs: Vec<_> = self.jobs.read().values().map(|job| job.info()).collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    /// Information about one job.
    pub fn job_info(&self, name: &str) -> Option<ScheduledJobInfo> {
        self.jobs.read().get(name).map(|job| job.info())
    }
}
