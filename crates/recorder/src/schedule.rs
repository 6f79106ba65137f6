//! Schedule waiter: blocks until a broadcast is imminent or already live.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The capture launches this long before the scheduled start.
const START_WINDOW_SECS: i64 = 60;

/// How the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The scheduled start is within the launch window.
    Ready,
    /// The broadcast already started; no waiting happened.
    AlreadyLive,
    /// Shutdown was requested while waiting; no session should start.
    Stopped,
}

/// True once `now` is within one minute of the scheduled start.
pub fn within_start_window(now: DateTime<Utc>, scheduled: DateTime<Utc>) -> bool {
    scheduled - TimeDelta::seconds(START_WINDOW_SECS) <= now
}

/// Wait until the broadcast is imminent, polling once per second.
///
/// Returns immediately when the broadcast already started. Observes the
/// shutdown token every iteration and returns [`WaitOutcome::Stopped`]
/// without error when it fires.
pub async fn wait_for_start(
    scheduled: DateTime<Utc>,
    already_live: bool,
    shutdown: &CancellationToken,
) -> WaitOutcome {
    if already_live {
        return WaitOutcome::AlreadyLive;
    }

    debug!("waiting for scheduled start at {scheduled}");
    loop {
        if shutdown.is_cancelled() {
            return WaitOutcome::Stopped;
        }
        if within_start_window(Utc::now(), scheduled) {
            return WaitOutcome::Ready;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return WaitOutcome::Stopped,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}
