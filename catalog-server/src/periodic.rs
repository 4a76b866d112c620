//! Periodic background jobs with cancellation.
//!
//! A job's `run_once` is awaited to completion before the next tick is taken,
//! and ticks that elapse meanwhile are skipped rather than queued, so one job
//! never runs two passes at once. Cancelling abandons an in-flight pass and
//! hands the job back to the caller for cleanup.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait PeriodicJob: Send + 'static {
    /// Name used in log events.
    fn name(&self) -> &'static str;

    /// One pass. Failures are the job's to log; nothing propagates.
    async fn run_once(&mut self);
}

/// Spawn `job` on its own task, ticking every `period` (first tick at once).
pub fn spawn_periodic<J: PeriodicJob>(
    job: J,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<J> {
    tokio::spawn(run_periodic(job, period, cancel))
}

/// Drive `job` until `cancel` fires, then return it.
pub async fn run_periodic<J: PeriodicJob>(
    mut job: J,
    period: Duration,
    cancel: CancellationToken,
) -> J {
    let name = job.name();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(job = name, period_ms = period.as_millis() as u64, "periodic job started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(job = name, "in-flight pass abandoned on shutdown");
                        break;
                    }
                    _ = job.run_once() => {}
                }
            }
        }
    }

    tracing::info!(job = name, "periodic job stopped");
    job
}
