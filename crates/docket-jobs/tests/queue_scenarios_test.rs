//! End-to-end queue scenarios against a live dispatcher.

mod common;

use common::{request, settings, TestQueue};
use docket_jobs::{JobError, JobStatus, QueueSettings};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_slot_runs_jobs_back_to_back() {
    let queue = TestQueue::start(2, 2, settings(1, 0)).await;

    let position = queue
        .manager
        .submit(request("a"), |_ctx| async { Ok(()) })
        .unwrap();
    assert_eq!(position, 1);
    let job_a = queue.job_id_of("a");

    let a = queue.wait_for_status(&job_a, JobStatus::Completed).await;
    assert_eq!(a.progress, 100);
    assert!(a.started_at.is_some());
    assert!(a.completed_at.is_some());

    queue
        .manager
        .submit(request("b"), |_ctx| async { Ok(()) })
        .unwrap();
    let job_b = queue.job_id_of("b");
    let b = queue.wait_for_status(&job_b, JobStatus::Completed).await;
    assert!(b.started_at >= a.completed_at);

    let stats = queue.manager.get_queue_stats();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.available_slots, 1);

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fails_twice_then_succeeds() {
    let queue = TestQueue::start(2, 2, settings(2, 2)).await;
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    queue
        .manager
        .submit(request("flaky"), move |ctx| {
            let counter = counter.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(ctx.attempt(), call);
                if call < 3 {
                    return Err(JobError::failed(format!("converter crashed on call {call}")));
                }
                ctx.progress(1, 1)?;
                Ok(())
            }
        })
        .unwrap();
    let job_id = queue.job_id_of("flaky");

    let snapshot = queue.wait_for_status(&job_id, JobStatus::Completed).await;
    assert_eq!(snapshot.retry_count, 2);
    assert_eq!(snapshot.retry_limit, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(snapshot
        .logs
        .iter()
        .any(|entry| entry.message.contains("Retrying (2/2)")));

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_attempt_times_out() {
    let queue = TestQueue::start(
        2,
        2,
        QueueSettings::new(2, Duration::from_secs(1), 0),
    )
    .await;

    let started = Instant::now();
    queue
        .manager
        .submit(request("slow"), |ctx| async move {
            for _ in 0..50 {
                if ctx.should_cancel() {
                    return Err(JobError::Cancelled);
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(())
        })
        .unwrap();
    let job_id = queue.job_id_of("slow");

    let snapshot = queue.wait_for_status(&job_id, JobStatus::Failed).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    assert!(snapshot.error.unwrap().contains("timed out"));
    assert_eq!(snapshot.retry_count, 0);

    queue.shutdown().await;
}
