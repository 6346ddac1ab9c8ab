// src/engine/reaper.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use super::{Coordinator, HELD_REASON};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Periodically stops every job HTCondor reports as held.
#[derive(Debug, Clone)]
pub struct HeldJobReaper {
    coordinator: Arc<Coordinator>,
    interval: Duration,
}

impl HeldJobReaper {
    pub fn new(coordinator: Arc<Coordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop each held job in queue order. A failed stop is logged and the
    /// sweep moves on to the next id.
    pub async fn sweep(&self) -> SweepReport {
        info!("looking for held jobs");
        let ids = match self.coordinator.held_invocation_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                error!(error = %err, "could not query held jobs");
                return SweepReport::default();
            }
        };
        info!(count = ids.len(), "found held jobs");

        let mut report = SweepReport::default();
        for id in &ids {
            report.attempted += 1;
            if let Err(err) = self.coordinator.stop_job(id, HELD_REASON).await {
                report.failed += 1;
                error!(invocation_id = %id, error = %err, "could not stop held job");
            }
        }
        report
    }

    /// Run [`sweep`](Self::sweep) every interval, starting one interval from
    /// now, until `shutdown` is cancelled. A sweep always finishes before the
    /// next tick is awaited.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let span = info_span!("reaper", interval_secs = self.interval.as_secs());
        tokio::spawn(
            async move {
                let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let report = self.sweep().await;
                    info!(attempted = report.attempted, failed = report.failed, "held job sweep done");
                }
                info!("reaper stopped");
            }
            .instrument(span),
        )
    }
}
