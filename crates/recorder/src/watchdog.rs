//! Watchdog timers that run alongside a capture attempt.
//!
//! Both are cancellable countdowns ticking once per second, so a cancelled
//! attempt stops its timers within a tick.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Abort an attempt if no download signal arrives within an hour.
pub const STARTUP_TIMEOUT_TICKS: u32 = 3600;

/// Force a fresh attempt after 5h59m of continuous capture. Long single
/// captures without full-history mode become unreliable past several hours.
pub const RERECORD_TICKS: u32 = 5 * 60 * 60 + 59 * 60;

const TICK: Duration = Duration::from_secs(1);

/// Expiry signal delivered to the attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// The startup timeout elapsed without a confirmed download.
    StartupTimeout,
    /// The periodic-restart window elapsed; a rerecord is due.
    RerecordDue,
}

/// Count down `ticks` seconds, checking the cancellation token every tick.
///
/// Returns `true` when the countdown ran to completion, `false` when it was
/// cancelled.
pub async fn countdown(ticks: u32, cancel: &CancellationToken) -> bool {
    countdown_at(ticks, TICK, cancel).await
}

async fn countdown_at(ticks: u32, tick: Duration, cancel: &CancellationToken) -> bool {
    for _ in 0..ticks {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(tick) => {}
        }
    }
    !cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_ticks_completes_immediately() {
        let cancel = CancellationToken::new();
        assert!(countdown(0, &cancel).await);
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_countdown() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!countdown_at(1000, Duration::from_millis(1), &cancel).await);
    }

    #[tokio::test]
    async fn cancellation_midway_wins_over_remaining_ticks() {
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stopper.cancel();
        });
        assert!(!countdown_at(10_000, Duration::from_millis(5), &cancel).await);
    }

    #[tokio::test]
    async fn short_countdown_runs_to_completion() {
        let cancel = CancellationToken::new();
        assert!(countdown_at(3, Duration::from_millis(2), &cancel).await);
    }
}
