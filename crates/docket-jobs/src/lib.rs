//! Docket Jobs - Priority Job Queue and Worker Dispatch
//!
//! An in-process engine for long-running document jobs:
//! - Worker dispatcher with bounded I/O and CPU pools
//! - Four workload classes scanned in priority order
//! - Job queue with admission control on waiting plus processing jobs
//! - Lowest-priority-value-first promotion, FIFO within a priority
//! - Retry with configurable backoff, per-attempt timeouts
//! - Progress reporting, owner-checked cancellation and per-job log trails
//! - Periodic maintenance: long-running job detection and resource reclamation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Docket Jobs                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  submit(request, work)                                       │
//! │     │                                                        │
//! │     ▼                                                        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                 JobQueueManager                         │  │
//! │  │  admission ─▶ waiting (priority, seq) ─▶ promotion      │  │
//! │  │        ▲                                     │          │  │
//! │  │        └──── retry (backoff) ◀── outcome ◀───┤          │  │
//! │  └──────────────────────────────────────────────┼──────────┘  │
//! │                                                 ▼             │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                 WorkerDispatcher                        │  │
//! │  │  ┌──────┐ ┌─────────┐ ┌──────────┐ ┌─────────────┐      │  │
//! │  │  │ High │ │ I/O     │ │ CPU      │ │ Low         │      │  │
//! │  │  └──┬───┘ └────┬────┘ └────┬─────┘ └──────┬──────┘      │  │
//! │  │     └── I/O pool ──┘       └──── CPU pool ─┘             │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use docket_jobs::prelude::*;
//!
//! let dispatcher = Arc::new(WorkerDispatcher::new(DispatcherConfig::default()));
//! dispatcher.start()?;
//!
//! let queue = JobQueueManager::new(dispatcher);
//! queue.configure(QueueSettings::new(10, Duration::from_secs(3600), 3)).await?;
//!
//! let position = queue.submit(
//!     JobRequest::new("user-42", "Alice", "/uploads/deck.pptx").priority(1),
//!     |ctx| async move {
//!         for page in 1..=20 {
//!             ctx.progress(page, 20)?;
//!         }
//!         Ok(())
//!     },
//! )?;
//! ```

pub mod config;
pub mod context;
pub mod di;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod reclamation;
pub mod retry;
pub mod task;

pub use config::{DispatcherConfig, JobsConfig, QueueConfig, ReclamationConfig, RetryConfig};
pub use context::JobContext;
pub use di::JobQueueInterface;
pub use dispatcher::{DispatcherStats, QueueDepths, WorkerDispatcher};
pub use error::{JobError, JobResult};
pub use job::{
    JobId, JobKind, JobRequest, JobStatus, JobStatusSnapshot, JobWork, LogEntry, LogLevel,
};
pub use manager::{JobQueueManager, MaintenanceReport, QueueSettings, QueueStats};
pub use metrics::{register_metrics, DispatcherMetrics, JobMetrics, ReclamationMetrics};
pub use reclamation::{ReclamationReport, ReclamationSettings, ResourcePool, ResourceReclaimer};
pub use retry::{RetryPolicy, RetryStrategy};
pub use task::{PoolKind, Task, TaskInfo, TaskOptions, TaskOutput, TaskStatus, WorkloadClass};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dispatcher::WorkerDispatcher;
    pub use crate::job::{JobKind, JobRequest, JobStatus};
    pub use crate::manager::{JobQueueManager, QueueSettings};
    pub use crate::retry::RetryPolicy;
    pub use crate::task::{TaskOptions, WorkloadClass};
    pub use crate::{DispatcherConfig, JobContext, JobError, JobId, JobResult};
}
