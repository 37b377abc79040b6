//! Resource reclamation.
//!
//! Units of work may check out external handles (pooled connections, document
//! sessions) and leak them on error paths. A [`ResourceReclaimer`] inspects
//! registered [`ResourcePool`]s and asks them to release what they can. It is
//! best-effort: failures are logged, never propagated.

use crate::config::ReclamationConfig;
use crate::error::JobResult;
use crate::metrics::ReclamationMetrics;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// External resource pool that can be reclaimed.
#[async_trait]
pub trait ResourcePool: Send + Sync {
    /// Pool name used in logs and metrics.
    fn name(&self) -> &str;

    /// Number of resources currently checked out.
    fn checked_out(&self) -> usize;

    /// Releases idle or leaked resources, returning how many were released.
    async fn reclaim(&self) -> JobResult<usize>;
}

/// Reclaimer settings.
#[derive(Debug, Clone)]
pub struct ReclamationSettings {
    /// Interval of the maintenance cycle.
    pub interval: Duration,
    /// Pools with more checkouts than this are reclaimed by `check`.
    pub checkout_threshold: usize,
    /// Processing time after which a job forces a reclamation pass.
    pub long_job_threshold: Duration,
}

impl Default for ReclamationSettings {
    fn default() -> Self {
        Self::from(&ReclamationConfig::default())
    }
}

impl From<&ReclamationConfig> for ReclamationSettings {
    fn from(config: &ReclamationConfig) -> Self {
        Self {
            interval: config.interval(),
            checkout_threshold: config.checkout_threshold,
            long_job_threshold: config.long_job_threshold(),
        }
    }
}

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclamationReport {
    /// Pools inspected.
    pub inspected: usize,
    /// Pools asked to reclaim.
    pub reclaimed_pools: usize,
    /// Resources released.
    pub released: usize,
    /// Pools whose reclamation failed.
    pub failures: usize,
}

/// Periodic and on-demand resource reclamation.
pub struct ResourceReclaimer {
    settings: ReclamationSettings,
    pools: RwLock<Vec<Arc<dyn ResourcePool>>>,
    passes: AtomicU64,
}

impl Default for ResourceReclaimer {
    fn default() -> Self {
        Self::new(ReclamationSettings::default())
    }
}

impl ResourceReclaimer {
    /// Creates a reclaimer with no pools registered.
    #[must_use]
    pub fn new(settings: ReclamationSettings) -> Self {
        Self {
            settings,
            pools: RwLock::new(Vec::new()),
            passes: AtomicU64::new(0),
        }
    }

    /// Registers a pool.
    pub fn register(&self, pool: Arc<dyn ResourcePool>) {
        info!(pool = pool.name(), "Registered resource pool for reclamation");
        self.pools.write().push(pool);
    }

    /// Returns the number of registered pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    #[must_use]
    pub fn settings(&self) -> &ReclamationSettings {
        &self.settings
    }

    /// Number of passes run so far.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Reclaims every pool whose checkout count is above the threshold.
    pub async fn check(&self, reason: &str) -> ReclamationReport {
        self.run(reason, false).await
    }

    /// Reclaims every pool regardless of its checkout count.
    pub async fn force(&self, reason: &str) -> ReclamationReport {
        self.run(reason, true).await
    }

    async fn run(&self, reason: &str, forced: bool) -> ReclamationReport {
        let pools: Vec<Arc<dyn ResourcePool>> = self.pools.read().clone();
        self.passes.fetch_add(1, Ordering::Relaxed);
        ReclamationMetrics::pass(reason, forced);

        let mut report = ReclamationReport {
            inspected: pools.len(),
            ..ReclamationReport::default()
        };

        for pool in pools {
            let checked_out = pool.checked_out();
            if !forced && checked_out <= self.settings.checkout_threshold {
                continue;
            }

            report.reclaimed_pools += 1;
            match pool.reclaim().await {
                Ok(released) => {
                    report.released += released;
                    ReclamationMetrics::reclaimed(pool.name(), released);
                    info!(
                        pool = pool.name(),
                        checked_out,
                        released,
                        reason,
                        "Reclaimed pool resources"
                    );
                }
                Err(e) => {
                    report.failures += 1;
                    ReclamationMetrics::failure(pool.name());
                    warn!(pool = pool.name(), error = %e, reason, "Resource reclamation failed");
                }
            }
        }

        debug!(
            reason,
            forced,
            inspected = report.inspected,
            released = report.released,
            "Reclamation pass finished"
        );
        report
    }
}
