//! Prometheus metrics for queue and scheduler monitoring.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the queue and scheduler.
pub mod names {
    /// Total jobs enqueued.
    pub const QUEUE_ENQUEUED_TOTAL: &str = "murmur_queue_enqueued_total";
    /// Total jobs dequeued.
    pub const QUEUE_DEQUEUED_TOTAL: &str = "murmur_queue_dequeued_total";
    /// Total jobs acknowledged.
    pub const QUEUE_ACKNOWLEDGED_TOTAL: &str = "murmur_queue_acknowledged_total";
    /// Total jobs rejected into the dead-letter list.
    pub const QUEUE_REJECTED_TOTAL: &str = "murmur_queue_rejected_total";
    /// Total dead letters moved back into their queue.
    pub const QUEUE_RETRIED_TOTAL: &str = "murmur_queue_retried_total";
    /// Total enqueue attempts refused because the queue was full.
    pub const QUEUE_FULL_TOTAL: &str = "murmur_queue_full_total";
    /// Current pending jobs.
    pub const QUEUE_PENDING: &str = "murmur_queue_pending";
    /// Current dead-letter list size.
    pub const QUEUE_DEAD_LETTER: &str = "murmur_queue_dead_letter";

    /// Total handler executions by queue consumers.
    pub const WORKER_PROCESSED_TOTAL: &str = "murmur_worker_processed_total";
    /// Queue handler execution duration in seconds.
    pub const WORKER_DURATION_SECONDS: &str = "murmur_worker_duration_seconds";

    /// Total scheduled job runs (one per tick, retries included in the run).
    pub const SCHEDULER_RUNS_TOTAL: &str = "murmur_scheduler_runs_total";
    /// Total scheduled runs that succeeded.
    pub const SCHEDULER_SUCCESS_TOTAL: &str = "murmur_scheduler_success_total";
    /// Total scheduled runs that exhausted their retries.
    pub const SCHEDULER_FAILURE_TOTAL: &str = "murmur_scheduler_failure_total";
    /// Total retry attempts.
    pub const SCHEDULER_RETRIES_TOTAL: &str = "murmur_scheduler_retries_total";
    /// Scheduled run duration in seconds.
    pub const SCHEDULER_RUN_DURATION_SECONDS: &str = "murmur_scheduler_run_duration_seconds";
    /// Registered jobs.
    pub const SCHEDULER_JOBS: &str = "murmur_scheduler_jobs";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Queue counters
    describe_counter!(names::QUEUE_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(names::QUEUE_DEQUEUED_TOTAL, "Total number of jobs dequeued");
    describe_counter!(names::QUEUE_ACKNOWLEDGED_TOTAL, "Total number of jobs acknowledged");
    describe_counter!(names::QUEUE_REJECTED_TOTAL, "Total number of jobs dead-lettered");
    describe_counter!(names::QUEUE_RETRIED_TOTAL, "Total number of dead letters re-enqueued");
    describe_counter!(names::QUEUE_FULL_TOTAL, "Total number of enqueues refused by a full queue");

    // Queue gauges
    describe_gauge!(names::QUEUE_PENDING, "Current number of pending jobs");
    describe_gauge!(names::QUEUE_DEAD_LETTER, "Current size of the dead-letter list");

    // Consumers
    describe_counter!(names::WORKER_PROCESSED_TOTAL, "Total number of jobs handled by consumers");
    describe_histogram!(names::WORKER_DURATION_SECONDS, "Queue handler duration in seconds");

    // Scheduler
    describe_counter!(names::SCHEDULER_RUNS_TOTAL, "Total number of scheduled job runs");
    describe_counter!(names::SCHEDULER_SUCCESS_TOTAL, "Total number of successful scheduled runs");
    describe_counter!(
        names::SCHEDULER_FAILURE_TOTAL,
        "Total number of scheduled runs that exhausted their retries"
    );
    describe_counter!(names::SCHEDULER_RETRIES_TOTAL, "Total number of scheduled job retries");
    describe_histogram!(
        names::SCHEDULER_RUN_DURATION_SECONDS,
        "Scheduled run duration in seconds, retries included"
    );
    describe_gauge!(names::SCHEDULER_JOBS, "Number of registered scheduled jobs");
}

/// Queue metrics recorder.
#[derive(Clone)]
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued(queue: &str, kind: &str) {
        counter!(
            names::QUEUE_ENQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record a job dequeued.
    pub fn job_dequeued(queue: &str, kind: &str) {
        counter!(
            names::QUEUE_DEQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record a job acknowledged.
    pub fn job_acknowledged(queue: &str) {
        counter!(names::QUEUE_ACKNOWLEDGED_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Record a job dead-lettered.
    pub fn job_rejected(queue: &str, kind: &str) {
        counter!(
            names::QUEUE_REJECTED_TOTAL,
            "queue" => queue.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record dead letters re-enqueued.
    pub fn jobs_retried(queue: &str, count: usize) {
        counter!(names::QUEUE_RETRIED_TOTAL, "queue" => queue.to_string()).increment(count as u64);
    }

    /// Record an enqueue refused by a full queue.
    pub fn queue_full(queue: &str) {
        counter!(names::QUEUE_FULL_TOTAL, "queue" => queue.to_string()).increment(1);
    }

    /// Update queue size gauges.
    pub fn update_sizes(queue: &str, pending: usize, dead_letters: usize) {
        gauge!(names::QUEUE_PENDING, "queue" => queue.to_string()).set(pending as f64);
        gauge!(names::QUEUE_DEAD_LETTER, "queue" => queue.to_string()).set(dead_letters as f64);
    }
}

/// Queue consumer metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Record a handled job.
    pub fn job_processed(queue: &str, kind: &str, status: &'static str, duration: Duration) {
        counter!(
            names::WORKER_PROCESSED_TOTAL,
            "queue" => queue.to_string(),
            "kind" => kind.to_string(),
            "status" => status
        )
        .increment(1);

        histogram!(
            names::WORKER_DURATION_SECONDS,
            "queue" => queue.to_string(),
            "status" => status
        )
        .record(duration.as_secs_f64());
    }
}

/// Scheduler metrics recorder.
#[derive(Clone)]
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Record a completed run.
    pub fn run_completed(job_name: &str, succeeded: bool, duration: Duration) {
        let status = if succeeded { "succeeded" } else { "failed" };

        counter!(names::SCHEDULER_RUNS_TOTAL, "job_name" => job_name.to_string()).increment(1);
        if succeeded {
            counter!(names::SCHEDULER_SUCCESS_TOTAL, "job_name" => job_name.to_string()).increment(1);
        } else {
            counter!(names::SCHEDULER_FAILURE_TOTAL, "job_name" => job_name.to_string()).increment(1);
        }

        histogram!(
            names::SCHEDULER_RUN_DURATION_SECONDS,
            "job_name" => job_name.to_string(),
            "status" => status
        )
        .record(duration.as_secs_f64());
    }

    /// Record a retry attempt.
    pub fn job_retried(job_name: &str, attempt: u32) {
        counter!(
            names::SCHEDULER_RETRIES_TOTAL,
            "job_name" => job_name.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Update the registered job gauge.
    pub fn update_job_count(count: usize) {
        gauge!(names::SCHEDULER_JOBS).set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // Without a recorder installed these are no-ops
        register_metrics();
    }

    #[test]
    fn test_recorders_without_exporter() {
        QueueMetrics::job_enqueued("deliveries", "push");
        QueueMetrics::update_sizes("deliveries", 3, 1);
        WorkerMetrics::job_processed("deliveries", "push", "acknowledged", Duration::from_millis(5));
        SchedulerMetrics::run_completed("status_cleanup", false, Duration::from_millis(300));
        SchedulerMetrics::job_retried("status_cleanup", 1);
    }
}
