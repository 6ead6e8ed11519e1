use murmur_jobs::prelude::*;
use murmur_jobs::{InMemoryQueueProvider, QueueWorkerPool, WorkerPoolConfig};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn pool_config() -> WorkerPoolConfig {
    WorkerPoolConfig {
        concurrency: 2,
        poll_timeout: Duration::from_millis(20),
        job_timeout: Duration::from_millis(200),
        shutdown_timeout: Duration::from_secs(2),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn successful_jobs_are_acknowledged() {
    let provider = Arc::new(InMemoryQueueProvider::new(16));
    let cancel = CancellationToken::new();
    let handled = Arc::new(AtomicUsize::new(0));

    let pool = QueueWorkerPool::new(provider.clone(), "notifications", pool_config());
    let counter = handled.clone();
    pool.register("push", move |_job, _token| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    assert_ok!(pool.start());

    for n in 0..5 {
        assert_ok!(provider.enqueue(&cancel, "notifications", QueueJob::new("push", json!({ "n": n }))).await);
    }

    wait_until(|| pool.stats().jobs_processed == 5).await;
    pool.shutdown().await;

    assert_eq!(handled.load(Ordering::SeqCst), 5);
    assert_eq!(pool.stats().jobs_failed, 0);
    assert_eq!(provider.failed_count(&cancel, "notifications").await.unwrap(), 0);
    assert!(!pool.is_running());
}

#[tokio::test]
async fn failures_and_unknown_kinds_are_dead_lettered() {
    let provider = Arc::new(InMemoryQueueProvider::new(16));
    let cancel = CancellationToken::new();

    let pool = QueueWorkerPool::new(provider.clone(), "mail", pool_config());
    pool.register("welcome", |_job, _token| async {
        Err(JobError::ExecutionFailed("smtp unavailable".into()))
    });
    pool.register("digest", |_job, _token| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    });
    assert_ok!(pool.start());

    for kind in ["welcome", "digest", "unknown"] {
        assert_ok!(provider.enqueue(&cancel, "mail", QueueJob::new(kind, json!({}))).await);
    }

    wait_until(|| pool.stats().jobs_failed == 3).await;
    pool.shutdown().await;

    let mut reasons: Vec<_> = provider
        .list_failed(&cancel, "mail")
        .await
        .unwrap()
        .into_iter()
        .map(|dead| (dead.job.kind, dead.reason))
        .collect();
    reasons.sort();

    assert_eq!(reasons.len(), 3);
    assert_eq!(reasons[0].0, "digest");
    assert!(reasons[0].1.contains("timed out"));
    assert_eq!(reasons[1].0, "unknown");
    assert!(reasons[1].1.contains("No handler"));
    assert_eq!(reasons[2].0, "welcome");
    assert!(reasons[2].1.contains("smtp unavailable"));
}

#[tokio::test]
async fn shutdown_stops_consumers_and_leaves_later_jobs_pending() {
    let provider = Arc::new(InMemoryQueueProvider::new(16));
    let cancel = CancellationToken::new();

    let pool = QueueWorkerPool::new(provider.clone(), "q", pool_config());
    pool.register("noop", |_job, _token| async { Ok(()) });
    assert_ok!(pool.start());
    assert!(pool.start().is_err());

    pool.shutdown().await;

    assert_ok!(provider.enqueue(&cancel, "q", QueueJob::new("noop", json!(null))).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.pending_count(&cancel, "q").await.unwrap(), 1);
}
