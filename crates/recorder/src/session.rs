//! Recording-session supervisor for a single broadcast.
//!
//! A session owns the whole lifecycle: validate the video id, look up the
//! broadcast, wait for the scheduled start, run capture attempts until one
//! settles, classify the outcome and route the artifacts.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::{self, AttemptContext};
use crate::classifier::ClassifierDiagnostics;
use crate::command::{CaptureCommand, CaptureSettings};
use crate::coordination::{Coordinator, channels};
use crate::error::{Error, Result};
use crate::metadata::{MetadataGateway, VideoInfo};
use crate::paths;
use crate::router::{self, Destination, SessionOutcome};
use crate::schedule::{self, WaitOutcome};

const LOOKUP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Behavior toggles for one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFlags {
    /// Capture from join time instead of the broadcast's first frame.
    /// Arms the periodic-restart watchdog to cap attempt length.
    pub disable_live_from_start: bool,
    /// Skip the start-of-stream notification (the registry entry is still
    /// written).
    pub suppress_start_notification: bool,
}

/// Base directories for artifact routing. Dated subdirectories are created
/// under each, stamped by the day the session started.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    /// Final archive location.
    pub output: PathBuf,
    /// Where the capture process writes while the session runs.
    pub temp: PathBuf,
    /// Files of broadcasts that were deleted while live.
    pub unarchived: PathBuf,
    /// Files of members-only broadcasts.
    pub member_only: PathBuf,
}

/// Everything a session needs to run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub video_id: String,
    pub paths: SessionPaths,
    pub flags: SessionFlags,
    pub capture: CaptureSettings,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session ran and produced (or routed) artifacts.
    Completed(SessionOutcome),
    /// Shutdown arrived before any capture started; nothing was written.
    Skipped,
}

/// Drives one recording session from lookup to routed artifacts.
pub struct Supervisor {
    gateway: Arc<dyn MetadataGateway>,
    coordinator: Arc<dyn Coordinator>,
    shutdown: CancellationToken,
    deleted_live: Arc<AtomicBool>,
}

enum Lookup {
    Found(VideoInfo),
    Stopped,
}

impl Supervisor {
    pub fn new(
        gateway: Arc<dyn MetadataGateway>,
        coordinator: Arc<dyn Coordinator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            coordinator,
            shutdown,
            deleted_live: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag an external observer sets when the broadcast is deleted while
    /// live; routes the artifacts to the unarchived directory.
    pub fn deleted_live_flag(&self) -> Arc<AtomicBool> {
        self.deleted_live.clone()
    }

    /// Run the session to completion.
    ///
    /// `Ok(Skipped)` means shutdown preempted the session before capture.
    /// Content that turns out unrecordable (members-only, privated,
    /// removed, never started) is an error after registry cleanup.
    pub async fn run(&self, config: SessionConfig) -> Result<SessionEnd> {
        // `@` is a shell-significant character in some launchers; ids are
        // passed with it escaped and stored with `-`.
        let video_id = config.video_id.replace('@', "-");
        if video_id.chars().count() != 11 {
            return Err(Error::InvalidVideoId { id: video_id });
        }

        let info = match self.lookup_with_retry(&video_id).await? {
            Lookup::Found(info) => info,
            Lookup::Stopped => return Ok(SessionEnd::Skipped),
        };
        info!(
            "session for {video_id} on channel {} ({})",
            info.channel_id, info.channel_title
        );

        let already_live = info.actual_start.is_some();
        let mut scheduled = info
            .scheduled_start
            .or(info.actual_start)
            .ok_or_else(|| Error::NoScheduledStart {
                video_id: video_id.clone(),
            })?;

        match schedule::wait_for_start(scheduled, already_live, &self.shutdown).await {
            WaitOutcome::Stopped => return Ok(SessionEnd::Skipped),
            WaitOutcome::AlreadyLive => warn!("broadcast already started, capturing from now"),
            WaitOutcome::Ready => {}
        }

        // Dated directories are stamped once, by the session's start day,
        // so a stream crossing midnight stays in one place.
        let day = Local::now().date_naive();
        let temp_dated = paths::dated_dir(&config.paths.temp, day);
        let output_dated = paths::dated_dir(&config.paths.output, day);
        tokio::fs::create_dir_all(&temp_dated).await?;
        tokio::fs::create_dir_all(&output_dated).await?;

        info!(
            "scheduled start {scheduled}, temp {}, archive {}",
            temp_dated.display(),
            output_dated.display()
        );

        let diagnostics = Arc::new(ClassifierDiagnostics::default());
        let mut last_prefix;
        let mut unrecoverable = None;
        let mut restart_pending = false;

        loop {
            last_prefix = paths::artifact_prefix(&info.channel_id, Local::now(), &video_id);
            let cmd = CaptureCommand {
                binary: config.capture.binary.clone(),
                video_id: video_id.clone(),
                output_template: temp_dated
                    .join(format!("{last_prefix}.%(ext)s"))
                    .display()
                    .to_string(),
                live_from_start: !config.flags.disable_live_from_start,
                cookies: config.capture.cookies.clone(),
            };
            let ctx = AttemptContext {
                gateway: self.gateway.as_ref(),
                coordinator: self.coordinator.as_ref(),
                diagnostics: diagnostics.clone(),
                scheduled_start: scheduled,
                disable_live_from_start: config.flags.disable_live_from_start,
                suppress_start_notification: config.flags.suppress_start_notification,
            };

            // A failed attempt must still release the registry entry a
            // prior attempt may have written.
            let report = match capture::run_attempt(&cmd, &video_id, &ctx, &self.shutdown).await {
                Ok(report) => report,
                Err(e) => {
                    self.remove_registry_entry(&video_id).await;
                    return Err(e);
                }
            };

            if let Some(reason) = report.unrecoverable {
                unrecoverable = Some(reason);
                break;
            }
            if report.restart_requested {
                if let Some(new_scheduled) = report.new_scheduled_start {
                    scheduled = new_scheduled;
                }
                info!("restarting capture, next start {scheduled}");
                match schedule::wait_for_start(scheduled, false, &self.shutdown).await {
                    WaitOutcome::Stopped => {
                        restart_pending = true;
                        break;
                    }
                    _ => continue,
                }
            }
            // Natural exit of the capture process ends the session.
            break;
        }

        if diagnostics.fault_count() > 0 {
            warn!(
                "{} output read faults during this session",
                diagnostics.fault_count()
            );
        }

        if let Some(reason) = unrecoverable {
            self.remove_registry_entry(&video_id).await;
            return Err(Error::ContentUnavailable { video_id, reason });
        }

        let outcome = self
            .route_artifacts(
                &config,
                &video_id,
                &info,
                &temp_dated,
                &output_dated,
                &last_prefix,
                day,
                restart_pending,
            )
            .await;

        self.remove_registry_entry(&video_id).await;
        Ok(SessionEnd::Completed(outcome))
    }

    /// Classify the finished session and move its files.
    #[allow(clippy::too_many_arguments)]
    async fn route_artifacts(
        &self,
        config: &SessionConfig,
        video_id: &str,
        info: &VideoInfo,
        temp_dated: &std::path::Path,
        output_dated: &std::path::Path,
        last_prefix: &str,
        day: chrono::NaiveDate,
        restart_pending: bool,
    ) -> SessionOutcome {
        let member_only = match self.gateway.is_member_only(video_id).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!("member-only check failed, assuming public: {e}");
                false
            }
        };
        let deleted = self.deleted_live.load(Ordering::SeqCst);
        let output_differs = output_dated != temp_dated;

        let managed = paths::in_managed_env();
        // Interactive runs get a session-local error log next to the
        // artifacts; managed ones only get structured logs.
        let error_log = (!managed).then(|| temp_dated.join(format!("{last_prefix}_err.txt")));

        let outcome = match router::choose_destination(member_only, deleted, output_differs) {
            Some(dest) => {
                let dest_dir = match dest {
                    Destination::MemberOnly => paths::dated_dir(&config.paths.member_only, day),
                    Destination::Unarchived => paths::dated_dir(&config.paths.unarchived, day),
                    Destination::Archive => output_dated.to_path_buf(),
                };
                let report = router::route_files(
                    temp_dated,
                    &dest_dir,
                    &info.channel_id,
                    video_id,
                    dest.channel(),
                    self.coordinator.as_ref(),
                    error_log.as_deref(),
                )
                .await;
                info!(
                    "routed {} file(s) to {} ({} failed)",
                    report.moved.len(),
                    dest_dir.display(),
                    report.failed.len()
                );
                // Only an actual move into the archive retires the
                // instance; equal output and temp dirs leave everything
                // in place.
                if dest == Destination::Archive && managed {
                    self.request_teardown(video_id).await;
                }
                dest.outcome()
            }
            // Output and temp are the same directory; the files are
            // already archived in place.
            None => SessionOutcome::RoutedToArchive,
        };

        if restart_pending {
            // Shutdown arrived while waiting for a rescheduled start. The
            // files above were still routed; the outcome records that the
            // session ended with a restart owed.
            return SessionOutcome::ScheduleRestartExhausted;
        }
        outcome
    }

    /// After a clean archive in a managed environment, ask the
    /// orchestrator to retire this instance once the broadcast is over.
    async fn request_teardown(&self, video_id: &str) {
        match self.gateway.lookup(video_id).await {
            Ok(Some(info)) if info.is_live_ended() => {
                let host = sysinfo::System::host_name().unwrap_or_default();
                if let Err(e) = self
                    .coordinator
                    .publish(channels::REMOVE_BY_ID, &host)
                    .await
                {
                    warn!("teardown request failed: {e}");
                }
            }
            Ok(_) => info!("broadcast not ended yet, leaving instance up"),
            Err(e) => warn!("post-session lookup failed: {e}"),
        }
    }

    async fn remove_registry_entry(&self, video_id: &str) {
        if let Err(e) = self.coordinator.remove_recording(video_id).await {
            warn!("failed to remove recording registry entry: {e}");
        }
    }

    /// Look the video up, retrying transient gateway failures once per
    /// second until shutdown.
    async fn lookup_with_retry(&self, video_id: &str) -> Result<Lookup> {
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(Lookup::Stopped);
            }
            match self.gateway.lookup(video_id).await {
                Ok(Some(info)) => return Ok(Lookup::Found(info)),
                Ok(None) => {
                    return Err(Error::VideoNotFound {
                        video_id: video_id.to_string(),
                    });
                }
                Err(e) if e.is_transient() => {
                    warn!("metadata lookup failed, retrying: {e}");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Ok(Lookup::Stopped),
                        _ = tokio::time::sleep(LOOKUP_RETRY_DELAY) => {}
                    }
                }
                Err(e) => return Err(Error::auth(e.to_string())),
            }
        }
    }
}
