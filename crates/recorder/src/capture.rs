//! One capture attempt: spawn yt-dlp, watch its output, supervise timers.
//!
//! The attempt is a single serial `tokio::select!` loop over a typed event
//! channel fed by the two stream readers and the watchdogs, plus the
//! process-exit signal. Terminating the attempt is one idempotent
//! operation: cancel the attempt token. The waiter task alone owns the
//! child process and turns cancellation into a graceful shutdown.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attempt::{AttemptMachine, AttemptReport, LineAction};
use crate::classifier::{ClassifiedLine, ClassifierDiagnostics, LineTag, StreamKind, classify};
use crate::command::CaptureCommand;
use crate::coordination::{Coordinator, channels};
use crate::error::{Error, Result, UnavailableReason};
use crate::metadata::MetadataGateway;
use crate::watchdog::{self, WatchdogEvent};

/// How long a terminated capture process gets to finalize its files.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// After the process exits, lines that raced with the exit signal are
/// still drained for this long.
const DRAIN_WINDOW: Duration = Duration::from_millis(250);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Everything an attempt needs from its session.
pub struct AttemptContext<'a> {
    pub gateway: &'a dyn MetadataGateway,
    pub coordinator: &'a dyn Coordinator,
    pub diagnostics: Arc<ClassifierDiagnostics>,
    pub scheduled_start: DateTime<Utc>,
    pub disable_live_from_start: bool,
    pub suppress_start_notification: bool,
}

enum AttemptEvent {
    Line(ClassifiedLine),
    Watchdog(WatchdogEvent),
}

/// Run one attempt of the external capture process to completion.
///
/// Returns the attempt's final flags; the session loop decides whether to
/// relaunch.
pub async fn run_attempt(
    cmd: &CaptureCommand,
    video_id: &str,
    ctx: &AttemptContext<'_>,
    shutdown: &CancellationToken,
) -> Result<AttemptReport> {
    // Cancelling the session cancels the attempt; cancelling the attempt
    // leaves the session token untouched.
    let cancel = shutdown.child_token();

    let mut child = process_utils::tokio_command(&cmd.binary)
        .args(cmd.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(Error::ProcessSpawn)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::setup("failed to capture process stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::setup("failed to capture process stderr"))?;

    // The local `event_tx` stays alive for the whole attempt, so `recv`
    // never yields `None` while the loop runs.
    let (event_tx, mut events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    spawn_line_reader(
        stdout,
        StreamKind::Stdout,
        event_tx.clone(),
        ctx.diagnostics.clone(),
    );
    spawn_line_reader(
        stderr,
        StreamKind::Stderr,
        event_tx.clone(),
        ctx.diagnostics.clone(),
    );

    // Waiter task: sole owner of the child. Natural exit reports the code;
    // cancellation shuts the child down gracefully first.
    let (exit_tx, mut exit_rx) = oneshot::channel::<Option<i32>>();
    let waiter_cancel = cancel.clone();
    tokio::spawn(async move {
        let exit_code = tokio::select! {
            status = child.wait() => status.ok().and_then(|s| s.code()),
            _ = waiter_cancel.cancelled() => {
                debug!("attempt cancelled, shutting down capture process");
                process_utils::shutdown_child(&mut child, SHUTDOWN_GRACE).await
            }
        };
        let _ = exit_tx.send(exit_code);
    });

    spawn_watchdog(
        watchdog::STARTUP_TIMEOUT_TICKS,
        WatchdogEvent::StartupTimeout,
        event_tx.clone(),
        cancel.clone(),
    );

    let mut driver = AttemptDriver {
        ctx,
        video_id,
        cancel: cancel.clone(),
        event_tx: event_tx.clone(),
        machine: AttemptMachine::new(),
        rerecord_armed: false,
        new_scheduled: None,
    };

    let exit_code = loop {
        tokio::select! {
            exit = &mut exit_rx => break exit.unwrap_or(None),
            event = events.recv() => {
                if let Some(event) = event {
                    driver.handle(event).await;
                }
            }
        }
    };

    // The readers run until end-of-stream; lines that raced with the exit
    // signal are still delivered within the drain window.
    while let Ok(Some(event)) = tokio::time::timeout(DRAIN_WINDOW, events.recv()).await {
        driver.handle(event).await;
    }

    // Stops the watchdogs deterministically, even on natural exit.
    cancel.cancel();

    if let Some(code) = exit_code
        && code != 0
    {
        warn!("capture process exited with code {code}");
    }
    info!("capture attempt ended");

    Ok(driver.machine.into_report(driver.new_scheduled))
}

/// Serial event handler of one attempt. All state transitions happen here,
/// one event at a time.
struct AttemptDriver<'a> {
    ctx: &'a AttemptContext<'a>,
    video_id: &'a str,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<AttemptEvent>,
    machine: AttemptMachine,
    rerecord_armed: bool,
    new_scheduled: Option<DateTime<Utc>>,
}

impl AttemptDriver<'_> {
    async fn handle(&mut self, event: AttemptEvent) {
        match event {
            AttemptEvent::Line(line) => match self.machine.on_line(&line) {
                Some(LineAction::DownloadConfirmed) => self.on_download_confirmed().await,
                Some(LineAction::ContentUnavailable(reason)) => {
                    warn!("capture blocked: {reason}");
                    if reason == UnavailableReason::MembersOnly {
                        self.publish(channels::START_STREAM, &format!("{}:1", self.video_id))
                            .await;
                    }
                    self.cancel.cancel();
                }
                None => {}
            },
            AttemptEvent::Watchdog(WatchdogEvent::StartupTimeout) => {
                if self.machine.download_confirmed() || self.machine.settled() {
                    return;
                }
                self.on_startup_timeout().await;
                if self.machine.settled() {
                    self.cancel.cancel();
                }
            }
            AttemptEvent::Watchdog(WatchdogEvent::RerecordDue) => {
                info!("periodic restart due, requesting rerecord");
                self.publish(channels::RERECORD, self.video_id).await;
                if self.machine.mark_restart_requested() {
                    self.cancel.cancel();
                }
            }
        }
    }

    async fn on_download_confirmed(&mut self) {
        info!("broadcast is live, capture confirmed");
        if !self.ctx.suppress_start_notification {
            self.publish(channels::START_STREAM, &format!("{}:0", self.video_id))
                .await;
        }
        if let Err(e) = self.ctx.coordinator.add_recording(self.video_id).await {
            warn!("failed to register recording: {e}");
        }
        if self.ctx.disable_live_from_start && !self.rerecord_armed {
            self.rerecord_armed = true;
            spawn_watchdog(
                watchdog::RERECORD_TICKS,
                WatchdogEvent::RerecordDue,
                self.event_tx.clone(),
                self.cancel.clone(),
            );
        }
    }

    /// Startup timeout fired without a confirmed download: ask the gateway
    /// what happened and settle the attempt accordingly.
    async fn on_startup_timeout(&mut self) {
        match self.ctx.gateway.lookup(self.video_id).await {
            Ok(None) => {
                warn!("waiting room for {} was removed", self.video_id);
                self.machine.mark_unrecoverable(UnavailableReason::Removed);
            }
            Ok(Some(info)) => match info.scheduled_start {
                Some(scheduled) if scheduled != self.ctx.scheduled_start => {
                    info!("scheduled start moved to {scheduled}");
                    self.new_scheduled = Some(scheduled);
                    self.machine.mark_restart_requested();
                }
                _ => {
                    warn!("waited an hour with no broadcast, giving up");
                    self.machine
                        .mark_unrecoverable(UnavailableReason::NeverStarted);
                }
            },
            // Keep capturing; the broadcast may still start and the next
            // signal will settle the attempt.
            Err(e) => warn!("schedule re-check failed: {e}"),
        }
    }

    async fn publish(&self, channel: &str, payload: &str) {
        if let Err(e) = self.ctx.coordinator.publish(channel, payload).await {
            warn!("publish on {channel} failed: {e}");
        }
    }
}

fn spawn_watchdog(
    ticks: u32,
    event: WatchdogEvent,
    tx: mpsc::Sender<AttemptEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        if watchdog::countdown(ticks, &cancel).await {
            let _ = tx.send(AttemptEvent::Watchdog(event)).await;
        }
    });
}

/// Read one pipe line by line, classify inline, forward to the attempt
/// loop. The reader runs until end-of-stream, which the waiter guarantees
/// by shutting the child down; read faults are counted, never fatal.
fn spawn_line_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    kind: StreamKind,
    tx: mpsc::Sender<AttemptEvent>,
    diagnostics: Arc<ClassifierDiagnostics>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let classified = classify(kind, &line);
                    match classified.tag {
                        // Drop [wait] chatter entirely.
                        LineTag::Noise => continue,
                        LineTag::Other => match kind {
                            StreamKind::Stdout => info!("yt-dlp: {line}"),
                            StreamKind::Stderr => warn!("yt-dlp: {line}"),
                        },
                        _ => debug!("yt-dlp ({}): {line}", kind.as_str()),
                    }
                    if tx.send(AttemptEvent::Line(classified)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => diagnostics.record_fault(kind, &e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryCoordinator;
    use crate::metadata::{LookupError, VideoInfo};
    use chrono::TimeDelta;

    enum LookupScript {
        Gone,
        Scheduled(DateTime<Utc>),
        Unreachable,
    }

    struct ScriptedGateway {
        script: LookupScript,
    }

    #[async_trait::async_trait]
    impl MetadataGateway for ScriptedGateway {
        async fn lookup(&self, _video_id: &str) -> std::result::Result<Option<VideoInfo>, LookupError> {
            match &self.script {
                LookupScript::Gone => Ok(None),
                LookupScript::Scheduled(at) => Ok(Some(VideoInfo {
                    channel_id: "UC123".to_string(),
                    channel_title: "channel".to_string(),
                    scheduled_start: Some(*at),
                    actual_start: None,
                    actual_end: None,
                })),
                LookupScript::Unreachable => Err(LookupError::Transient("gateway down".into())),
            }
        }

        async fn is_member_only(&self, _video_id: &str) -> std::result::Result<bool, LookupError> {
            Ok(false)
        }
    }

    fn context<'a>(
        gateway: &'a ScriptedGateway,
        coordinator: &'a MemoryCoordinator,
        scheduled_start: DateTime<Utc>,
    ) -> AttemptContext<'a> {
        AttemptContext {
            gateway,
            coordinator,
            diagnostics: Arc::new(ClassifierDiagnostics::default()),
            scheduled_start,
            disable_live_from_start: false,
            suppress_start_notification: false,
        }
    }

    fn driver<'a>(ctx: &'a AttemptContext<'a>) -> AttemptDriver<'a> {
        let (event_tx, _events) = mpsc::channel(8);
        AttemptDriver {
            ctx,
            video_id: "dQw4w9WgXcQ",
            cancel: CancellationToken::new(),
            event_tx,
            machine: AttemptMachine::new(),
            rerecord_armed: false,
            new_scheduled: None,
        }
    }

    #[tokio::test]
    async fn startup_timeout_with_removed_waiting_room_is_unrecoverable() {
        let scheduled = Utc::now();
        let gateway = ScriptedGateway {
            script: LookupScript::Gone,
        };
        let coordinator = MemoryCoordinator::new();
        let ctx = context(&gateway, &coordinator, scheduled);
        let mut driver = driver(&ctx);

        driver
            .handle(AttemptEvent::Watchdog(WatchdogEvent::StartupTimeout))
            .await;

        assert_eq!(
            driver.machine.unrecoverable(),
            Some(UnavailableReason::Removed)
        );
        assert!(driver.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn startup_timeout_with_moved_schedule_requests_restart() {
        let scheduled = Utc::now();
        let moved = scheduled + TimeDelta::hours(2);
        let gateway = ScriptedGateway {
            script: LookupScript::Scheduled(moved),
        };
        let coordinator = MemoryCoordinator::new();
        let ctx = context(&gateway, &coordinator, scheduled);
        let mut driver = driver(&ctx);

        driver
            .handle(AttemptEvent::Watchdog(WatchdogEvent::StartupTimeout))
            .await;

        assert!(driver.machine.restart_requested());
        assert_eq!(driver.new_scheduled, Some(moved));
        assert!(driver.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn startup_timeout_with_unchanged_schedule_gives_up() {
        let scheduled = Utc::now();
        let gateway = ScriptedGateway {
            script: LookupScript::Scheduled(scheduled),
        };
        let coordinator = MemoryCoordinator::new();
        let ctx = context(&gateway, &coordinator, scheduled);
        let mut driver = driver(&ctx);

        driver
            .handle(AttemptEvent::Watchdog(WatchdogEvent::StartupTimeout))
            .await;

        assert_eq!(
            driver.machine.unrecoverable(),
            Some(UnavailableReason::NeverStarted)
        );
        assert!(driver.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn startup_timeout_keeps_capturing_when_the_gateway_is_down() {
        let gateway = ScriptedGateway {
            script: LookupScript::Unreachable,
        };
        let coordinator = MemoryCoordinator::new();
        let ctx = context(&gateway, &coordinator, Utc::now());
        let mut driver = driver(&ctx);

        driver
            .handle(AttemptEvent::Watchdog(WatchdogEvent::StartupTimeout))
            .await;

        assert!(!driver.machine.settled());
        assert!(!driver.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn startup_timeout_is_ignored_once_the_download_started() {
        let gateway = ScriptedGateway {
            script: LookupScript::Gone,
        };
        let coordinator = MemoryCoordinator::new();
        let ctx = context(&gateway, &coordinator, Utc::now());
        let mut driver = driver(&ctx);

        let line = classify(StreamKind::Stdout, "[download] Destination: x.mp4");
        driver.handle(AttemptEvent::Line(line)).await;
        assert!(driver.machine.download_confirmed());

        driver
            .handle(AttemptEvent::Watchdog(WatchdogEvent::StartupTimeout))
            .await;

        assert!(!driver.machine.settled());
        assert!(!driver.cancel.is_cancelled());
    }
}
