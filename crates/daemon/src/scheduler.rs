//! Reconciliation scheduler that runs sync cycles on a configurable
//! interval.
//!
//! Each cycle reconciles every managed list of every kind. If a cycle is
//! still running when the next tick fires, the tick is skipped rather than
//! queued: the next cycle re-diffs from scratch anyway.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;
use tracing::{error, info, warn};

use listsync_core::directory::Directory;
use listsync_core::orchestrator::Orchestrator;

/// Tracks aggregate statistics across reconciliation cycles.
pub struct SchedulerStats {
    pub total_cycles: AtomicU64,
    pub total_errors: AtomicU64,
    pub consecutive_errors: AtomicU64,
}

impl SchedulerStats {
    fn new() -> Self {
        Self {
            total_cycles: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            consecutive_errors: AtomicU64::new(0),
        }
    }
}

/// The reconciliation scheduler.
pub struct Scheduler<D> {
    orchestrator: Arc<Orchestrator<D>>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
}

impl<D: Directory> Scheduler<D> {
    pub fn new(orchestrator: Arc<Orchestrator<D>>, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SchedulerStats::new()),
        }
    }

    /// Main scheduler loop. Returns when `shutdown` is notified.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "scheduler started"
        );

        let mut interval = time::interval(self.poll_interval);
        // The first tick fires immediately; consume it to allow the system
        // time to fully start before the first cycle.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.notified() => {
                    info!("scheduler shutting down");
                    return;
                }
            }
        }
    }

    /// Attempt to run a reconciliation cycle. If one is already running, skip.
    async fn run_cycle(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("skipping reconciliation cycle: previous cycle still running");
            return;
        }

        let cycle = self.stats.total_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        info!(cycle, "starting reconciliation cycle");

        match self.orchestrator.sync_all(false).await {
            Ok(outcomes) => {
                self.stats.consecutive_errors.store(0, Ordering::SeqCst);

                let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                let changes: usize = outcomes
                    .iter()
                    .filter_map(|o| o.result.as_ref().ok())
                    .map(|report| report.change_count())
                    .sum();
                info!(
                    cycle,
                    lists = outcomes.len(),
                    failed,
                    changes,
                    "reconciliation cycle completed"
                );
            }
            Err(e) => {
                let errors = self.stats.total_errors.fetch_add(1, Ordering::SeqCst) + 1;
                let consecutive = self
                    .stats
                    .consecutive_errors
                    .fetch_add(1, Ordering::SeqCst)
                    + 1;
                error!(
                    cycle,
                    error = %e,
                    total_errors = errors,
                    consecutive_errors = consecutive,
                    "reconciliation cycle failed"
                );
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }
}
