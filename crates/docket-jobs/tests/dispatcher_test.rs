//! Worker dispatcher integration tests: pool bounds and class scan order.

use docket_jobs::{
    DispatcherConfig, JobResult, PoolKind, TaskOptions, TaskOutput, TaskStatus, WorkerDispatcher,
    WorkloadClass,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn dispatcher(io_workers: usize, cpu_workers: usize) -> WorkerDispatcher {
    let dispatcher = WorkerDispatcher::new(DispatcherConfig::with_workers(io_workers, cpu_workers));
    dispatcher.start().unwrap();
    dispatcher
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrency() {
    let dispatcher = dispatcher(2, 1);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let running = running.clone();
        let peak = peak.clone();
        let task = dispatcher
            .submit(
                move |_token| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(TaskOutput::Null)
                },
                TaskOptions::new().class(WorkloadClass::IoBound),
            )
            .unwrap();
        tasks.push(task);
    }

    for task in &tasks {
        assert_eq!(task.wait().await, TaskStatus::Completed);
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert!(dispatcher.io_active() <= 2);
    assert_eq!(dispatcher.completed_count(), 6);

    dispatcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_high_priority_class_scanned_before_io() {
    let dispatcher = dispatcher(1, 1);
    let order = Arc::new(Mutex::new(Vec::new()));
    let release = CancellationToken::new();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();

    let gate = release.clone();
    let blocker = dispatcher
        .submit(
            move |_token| async move {
                let _ = started_tx.send(());
                gate.cancelled().await;
                Ok(TaskOutput::Null)
            },
            TaskOptions::new().class(WorkloadClass::IoBound),
        )
        .unwrap();
    started_rx.recv().await.unwrap();

    let mut tasks = Vec::new();
    for (name, class, priority) in [
        ("io-urgent", WorkloadClass::IoBound, -10),
        ("high", WorkloadClass::HighPriority, 10),
        ("io-late", WorkloadClass::IoBound, 0),
    ] {
        assert_eq!(class.pool(), PoolKind::Io);
        let order = order.clone();
        let task = dispatcher
            .submit(
                move |_token| async move {
                    order.lock().push(name);
                    Ok(TaskOutput::Null)
                },
                TaskOptions::new().id(name).class(class).priority(priority),
            )
            .unwrap();
        tasks.push(task);
    }

    let stats = dispatcher.stats();
    assert_eq!(stats.queued.high_priority, 1);
    assert_eq!(stats.queued.io_bound, 2);
    assert_eq!(stats.io_active, 1);

    release.cancel();
    assert_eq!(blocker.wait().await, TaskStatus::Completed);
    for task in &tasks {
        assert_eq!(task.wait().await, TaskStatus::Completed);
    }
    assert_eq!(*order.lock(), vec!["high", "io-urgent", "io-late"]);

    dispatcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pools_are_independent() {
    let dispatcher = dispatcher(1, 1);
    let release = CancellationToken::new();

    let gate = release.clone();
    let io_task = dispatcher
        .submit(
            move |_token| async move {
                gate.cancelled().await;
                Ok(TaskOutput::Null)
            },
            TaskOptions::new().class(WorkloadClass::IoBound),
        )
        .unwrap();

    // A saturated I/O pool does not hold back CPU work.
    let cpu_task = dispatcher
        .submit(
            |_token| async { JobResult::Ok(serde_json::json!({ "pages": 12 })) },
            TaskOptions::new().class(WorkloadClass::CpuBound),
        )
        .unwrap();
    assert_eq!(cpu_task.wait().await, TaskStatus::Completed);
    assert_eq!(cpu_task.result().unwrap()["pages"], 12);
    assert!(!io_task.status().is_terminal());

    release.cancel();
    assert_eq!(io_task.wait().await, TaskStatus::Completed);
    dispatcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconfigure_grows_pool_while_running() {
    let dispatcher = dispatcher(1, 1);
    let release = CancellationToken::new();

    let gate = release.clone();
    let blocker = dispatcher
        .submit(
            move |_token| async move {
                gate.cancelled().await;
                Ok(TaskOutput::Null)
            },
            TaskOptions::new().class(WorkloadClass::IoBound),
        )
        .unwrap();
    let queued = dispatcher
        .submit(|_token| async { Ok(TaskOutput::Null) }, TaskOptions::new().class(WorkloadClass::IoBound))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queued.status(), TaskStatus::Pending);

    dispatcher.reconfigure(2, 3);
    let status = tokio::time::timeout(Duration::from_secs(2), queued.wait()).await;
    assert_eq!(status.unwrap(), TaskStatus::Completed);
    assert!(!blocker.status().is_terminal());

    let stats = dispatcher.stats();
    assert_eq!(stats.io_workers, 2);
    assert_eq!(stats.cpu_workers, 3);
    assert_eq!(stats.io_active, 1);

    release.cancel();
    assert_eq!(blocker.wait().await, TaskStatus::Completed);
    dispatcher.shutdown().await;
}
