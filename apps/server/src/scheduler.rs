//! Periodic task runner.

use crate::config::Schedule;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawn a task that calls `job` on `schedule` until `cancel` fires.
///
/// Runs never overlap: each run is awaited before the next tick is taken, and
/// ticks missed while a run was in flight are skipped rather than replayed.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    schedule: Schedule,
    cancel: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + schedule.first_delay, schedule.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            task = name,
            first_delay_ms = duration_ms(schedule.first_delay),
            period_ms = duration_ms(schedule.period),
            "Periodic task started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            debug!(task = name, "Running periodic task");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = job() => {}
            }
        }

        info!(task = name, "Periodic task stopped");
    })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
