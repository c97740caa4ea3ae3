//! Host loop that ticks the scheduler until the deferred work is done.
//!
//! The engine's scheduler never sleeps; whoever owns it has to call
//! `tick` repeatedly. This loop does so on a fixed interval until the queue
//! is empty, the timeout passes, or the token is cancelled.

use std::time::Duration;

use refguard_core::Scheduler;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every queued task has fired.
    Idle { fired: usize, failed: usize },
    /// Tasks were still waiting when the timeout passed.
    TimedOut { remaining: usize },
    /// The token was cancelled before the queue emptied.
    Cancelled { remaining: usize },
}

impl DrainOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle { .. })
    }
}

/// Tick `scheduler` against `ctx` every `tick` until it is idle.
pub async fn drain<C>(
    scheduler: &mut Scheduler<C>,
    ctx: &mut C,
    tick: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> DrainOutcome {
    let mut fired = 0;
    let mut failed = 0;

    if scheduler.is_idle() {
        return DrainOutcome::Idle { fired, failed };
    }

    tracing::info!(
        pending = scheduler.pending(),
        tick_ms = tick.as_millis() as u64,
        timeout_secs = timeout.as_secs(),
        "Waiting for deferred tasks"
    );

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(remaining = scheduler.pending(), "Drain cancelled");
                return DrainOutcome::Cancelled { remaining: scheduler.pending() };
            }
            _ = &mut deadline => {
                tracing::warn!(remaining = scheduler.pending(), "Drain timed out");
                return DrainOutcome::TimedOut { remaining: scheduler.pending() };
            }
            _ = interval.tick() => {
                let report = scheduler.tick(ctx);
                fired += report.fired.len();
                failed += report.failed.len();
                if report.remaining == 0 {
                    tracing::info!(fired, failed, "Deferred tasks drained");
                    return DrainOutcome::Idle { fired, failed };
                }
            }
        }
    }
}
