use murmur_jobs::prelude::*;
use murmur_jobs::{metadata_keys, InMemoryQueueProvider};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const SHORT: Duration = Duration::from_millis(20);

fn job(n: u32) -> QueueJob {
    QueueJob::new("delivery", json!({ "n": n }))
}

#[tokio::test]
async fn single_producer_single_consumer_is_fifo() {
    let provider = InMemoryQueueProvider::new(10);
    let cancel = CancellationToken::new();

    for n in 1..=3 {
        assert_ok!(provider.enqueue(&cancel, "deliveries", job(n)).await);
    }

    let mut order = Vec::new();
    while let Some(job) = provider.dequeue(&cancel, "deliveries", SHORT).await.unwrap() {
        order.push(job.payload["n"].as_u64().unwrap());
    }

    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test]
async fn full_queue_fails_without_blocking() {
    let provider = InMemoryQueueProvider::new(2);
    let cancel = CancellationToken::new();

    assert_ok!(provider.enqueue(&cancel, "q", job(1)).await);
    assert_ok!(provider.enqueue(&cancel, "q", job(2)).await);

    let result = tokio::time::timeout(Duration::from_secs(1), provider.enqueue(&cancel, "q", job(3)))
        .await
        .expect("enqueue must not block on a full queue");
    assert!(matches!(result, Err(JobError::QueueFull(name)) if name == "q"));
    assert_eq!(provider.pending_count(&cancel, "q").await.unwrap(), 2);
}

#[tokio::test]
async fn queues_are_independent() {
    let provider = InMemoryQueueProvider::new(1);
    let cancel = CancellationToken::new();

    assert_ok!(provider.enqueue(&cancel, "a", job(1)).await);
    assert_ok!(provider.enqueue(&cancel, "b", job(2)).await);
    assert_eq!(provider.pending_count(&cancel, "a").await.unwrap(), 1);
    assert_eq!(provider.pending_count(&cancel, "b").await.unwrap(), 1);
}

#[tokio::test]
async fn dequeue_times_out_with_none() {
    let provider = InMemoryQueueProvider::new(4);
    let cancel = CancellationToken::new();

    let result = provider.dequeue(&cancel, "empty", SHORT).await;
    assert!(matches!(result, Ok(None)));
}

#[tokio::test]
async fn cancelled_caller_gets_cancelled_error() {
    let provider = InMemoryQueueProvider::new(4);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        provider.enqueue(&cancel, "q", job(1)).await,
        Err(JobError::Cancelled)
    ));
    assert!(matches!(
        provider.dequeue(&cancel, "q", Duration::from_secs(5)).await,
        Err(JobError::Cancelled)
    ));
    assert_eq!(provider.pending_count(&CancellationToken::new(), "q").await.unwrap(), 0);
}

#[tokio::test]
async fn cancellation_unblocks_waiting_dequeue() {
    let provider = Arc::new(InMemoryQueueProvider::new(4));
    let cancel = CancellationToken::new();

    let waiter = {
        let provider = provider.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { provider.dequeue(&cancel, "q", Duration::from_secs(30)).await })
    };

    tokio::time::sleep(SHORT).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(JobError::Cancelled)));
}

#[tokio::test]
async fn close_unblocks_waiting_consumer() {
    let provider = Arc::new(InMemoryQueueProvider::new(4));

    let waiter = {
        let provider = provider.clone();
        tokio::spawn(async move {
            provider
                .dequeue(&CancellationToken::new(), "q", Duration::from_secs(30))
                .await
        })
    };

    tokio::time::sleep(SHORT).await;
    assert_ok!(provider.close().await);

    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("blocked dequeue must return after close")
        .unwrap();
    assert!(matches!(result, Err(JobError::QueueClosed)));
}

#[tokio::test]
async fn closed_provider_refuses_work() {
    let provider = InMemoryQueueProvider::new(4);
    let cancel = CancellationToken::new();
    assert_ok!(provider.enqueue(&cancel, "q", job(1)).await);
    assert_ok!(provider.ping(&cancel).await);

    assert_ok!(provider.close().await);

    assert!(matches!(provider.enqueue(&cancel, "q", job(2)).await, Err(JobError::QueueClosed)));
    assert!(matches!(provider.dequeue(&cancel, "q", SHORT).await, Err(JobError::QueueClosed)));
    assert!(matches!(provider.ping(&cancel).await, Err(JobError::QueueClosed)));
    assert_eq!(provider.pending_count(&cancel, "q").await.unwrap(), 0);
    assert_ok!(provider.close().await);
}

#[tokio::test]
async fn reject_keeps_full_job_and_retry_bumps_attempts() {
    let provider = InMemoryQueueProvider::new(4);
    let cancel = CancellationToken::new();

    assert_ok!(provider.enqueue(&cancel, "q", job(7)).await);
    let dequeued = provider.dequeue(&cancel, "q", SHORT).await.unwrap().unwrap();
    assert_ok!(provider.reject(&cancel, "q", &dequeued.id, "smtp refused").await);

    assert_eq!(provider.failed_count(&cancel, "q").await.unwrap(), 1);
    let failed = provider.list_failed(&cancel, "q").await.unwrap();
    assert_eq!(failed[0].job.payload, json!({ "n": 7 }));

    assert_eq!(provider.retry_failed(&cancel, "q").await.unwrap(), 1);
    assert_eq!(provider.failed_count(&cancel, "q").await.unwrap(), 0);

    let retried = provider.dequeue(&cancel, "q", SHORT).await.unwrap().unwrap();
    assert_eq!(retried.id, dequeued.id);
    assert_eq!(retried.attempts, dequeued.attempts + 1);
    assert_eq!(retried.payload, json!({ "n": 7 }));
    assert_eq!(retried.metadata(metadata_keys::LAST_FAILURE), Some("smtp refused"));
}

#[tokio::test]
async fn retry_failed_leaves_later_dead_letters_alone() {
    let provider = InMemoryQueueProvider::new(4);
    let cancel = CancellationToken::new();

    assert_ok!(provider.enqueue(&cancel, "q", job(1)).await);
    assert_ok!(provider.enqueue(&cancel, "q", job(2)).await);

    let first = provider.dequeue(&cancel, "q", SHORT).await.unwrap().unwrap();
    assert_ok!(provider.reject(&cancel, "q", &first.id, "first failure").await);
    assert_eq!(provider.retry_failed(&cancel, "q").await.unwrap(), 1);

    let second = provider.dequeue(&cancel, "q", SHORT).await.unwrap().unwrap();
    assert_eq!(second.payload, json!({ "n": 2 }));
    assert_ok!(provider.reject(&cancel, "q", &second.id, "second failure").await);

    // The first job is live again; the second waits in the dead-letter list untouched.
    assert_eq!(provider.pending_count(&cancel, "q").await.unwrap(), 1);
    let failed = provider.list_failed(&cancel, "q").await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job.id, second.id);
    assert_eq!(failed[0].job.attempts, second.attempts);

    assert_eq!(provider.retry_failed(&cancel, "q").await.unwrap(), 1);
    assert_eq!(provider.failed_count(&cancel, "q").await.unwrap(), 0);

    let requeued_first = provider.dequeue(&cancel, "q", SHORT).await.unwrap().unwrap();
    assert_eq!(requeued_first.id, first.id);
    assert_eq!(requeued_first.attempts, first.attempts + 1);

    let requeued_second = provider.dequeue(&cancel, "q", SHORT).await.unwrap().unwrap();
    assert_eq!(requeued_second.id, second.id);
    assert_eq!(requeued_second.attempts, second.attempts + 1);
}

#[tokio::test]
async fn retry_failed_drops_entries_that_do_not_fit() {
    let provider = InMemoryQueueProvider::new(2);
    let cancel = CancellationToken::new();

    for n in 0..2 {
        assert_ok!(provider.enqueue(&cancel, "q", job(n)).await);
    }
    for _ in 0..2 {
        let job = provider.dequeue(&cancel, "q", SHORT).await.unwrap().unwrap();
        assert_ok!(provider.reject(&cancel, "q", &job.id, "failed").await);
    }
    assert_ok!(provider.reject(&cancel, "q", &JobId::from("ghost"), "unknown").await);

    // Leave room for exactly one.
    assert_ok!(provider.enqueue(&cancel, "q", job(9)).await);

    let retried = provider.retry_failed(&cancel, "q").await.unwrap();
    assert_eq!(retried, 1);
    assert_eq!(provider.failed_count(&cancel, "q").await.unwrap(), 0);
    assert_eq!(provider.pending_count(&cancel, "q").await.unwrap(), 2);
}

#[tokio::test]
async fn retry_failed_with_nothing_dead_lettered() {
    let provider = InMemoryQueueProvider::new(2);
    let cancel = CancellationToken::new();
    assert_eq!(provider.retry_failed(&cancel, "q").await.unwrap(), 0);
}

#[tokio::test]
async fn multiple_consumers_receive_each_job_once() {
    let provider = Arc::new(InMemoryQueueProvider::new(100));
    let cancel = CancellationToken::new();

    for n in 0..50 {
        assert_ok!(provider.enqueue(&cancel, "q", job(n)).await);
    }

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let provider = provider.clone();
        let cancel = cancel.clone();
        consumers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(Some(job)) = provider.dequeue(&cancel, "q", SHORT).await {
                seen.push(job.payload["n"].as_u64().unwrap());
            }
            seen
        }));
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    all.sort_unstable();

    assert_eq!(all, (0..50).collect::<Vec<_>>());
}

#[tokio::test]
async fn retry_failed_on_closed_provider() {
    let provider = InMemoryQueueProvider::new(2);
    let cancel = CancellationToken::new();
    assert_ok!(provider.close().await);
    assert_err!(provider.retry_failed(&cancel, "q").await);
}
