//! Background sync, backup, and cleanup loops.
//!
//! Each loop holds only a `Weak` reference to the manager and exits when the
//! manager is dropped or the scheduler is stopped. A failing tick is logged
//! and the loop waits for its next period.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::MemoryManager;
use crate::error::MemoryResult;

/// Periods for the three loops. `None` disables a loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulePlan {
    pub sync: Option<Duration>,
    pub backup: Option<Duration>,
    pub cleanup: Option<Duration>,
}

impl SchedulePlan {
    /// Zero periods disable their loop.
    pub fn from_periods(sync: Duration, backup: Duration, cleanup: Duration) -> Self {
        let enabled = |d: Duration| (!d.is_zero()).then_some(d);
        Self {
            sync: enabled(sync),
            backup: enabled(backup),
            cleanup: enabled(cleanup),
        }
    }
}

/// Handle to the running loops.
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(manager: Weak<MemoryManager>, plan: SchedulePlan) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        if let Some(period) = plan.sync {
            tasks.push(spawn_loop("sync", period, manager.clone(), cancel.clone(), |m| async move {
                m.sync_now().await
            }));
        }
        if let Some(period) = plan.backup {
            tasks.push(spawn_loop("backup", period, manager.clone(), cancel.clone(), |m| async move {
                m.create_backup().await.map(|_| ())
            }));
        }
        if let Some(period) = plan.cleanup {
            tasks.push(spawn_loop("cleanup", period, manager, cancel.clone(), |m| async move {
                m.cleanup_expired().map(|_| ())
            }));
        }

        info!(loops = tasks.len(), "Memory scheduler started");
        Self { cancel, tasks }
    }

    /// Number of loops started.
    pub fn loop_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Cancel every loop and wait for it to exit. A tick already in progress
    /// runs to completion.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Memory scheduler stopped");
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    manager: Weak<MemoryManager>,
    cancel: CancellationToken,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<MemoryManager>) -> Fut + Send + 'static,
    Fut: Future<Output = MemoryResult<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(manager) = manager.upgrade() else {
                        debug!(task = name, "Manager dropped, stopping loop");
                        break;
                    };
                    match tick(manager).await {
                        Ok(()) => debug!(task = name, "Scheduled tick completed"),
                        Err(e) => warn!(task = name, error = %e, "Scheduled tick failed"),
                    }
                }
            }
        }
    })
}
