//! Outcome classification and artifact routing.
//!
//! After the attempt loop exits, the session's files are moved to exactly
//! one destination. Every successful move publishes one notification on the
//! destination's channel; a failed move is reported and never stops the
//! remaining files from being routed.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::coordination::{Coordinator, channels};
use crate::paths::belongs_to_session;

/// Terminal classification of a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Content became unavailable; nothing was routed.
    CannotRecord,
    RoutedToMemberOnly,
    RoutedToUnarchived,
    RoutedToArchive,
    /// The session ended while a schedule-change restart was still pending.
    ScheduleRestartExhausted,
}

/// Destination chosen for the finished artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    MemberOnly,
    Unarchived,
    Archive,
}

impl Destination {
    /// Coordination channel notified once per file moved here.
    pub fn channel(self) -> &'static str {
        match self {
            Self::MemberOnly => channels::MEMBER_ONLY,
            Self::Unarchived => channels::UNARCHIVED,
            Self::Archive => channels::END_STREAM,
        }
    }

    pub fn outcome(self) -> SessionOutcome {
        match self {
            Self::MemberOnly => SessionOutcome::RoutedToMemberOnly,
            Self::Unarchived => SessionOutcome::RoutedToUnarchived,
            Self::Archive => SessionOutcome::RoutedToArchive,
        }
    }
}

/// Pick the destination in priority order: member-only, then deleted
/// live, then the archive (only when the output directory actually differs
/// from the temp directory). `None` means the files stay where they are.
pub fn choose_destination(
    member_only: bool,
    deleted_live: bool,
    output_differs: bool,
) -> Option<Destination> {
    if member_only {
        Some(Destination::MemberOnly)
    } else if deleted_live {
        Some(Destination::Unarchived)
    } else if output_differs {
        Some(Destination::Archive)
    } else {
        None
    }
}

/// What the router did, for logging and tests.
#[derive(Debug, Default)]
pub struct RouteReport {
    pub moved: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl RouteReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Move every session file from `temp_dir` to `dest_dir`, publishing one
/// notification per moved file on `channel`.
///
/// Failures are appended to `error_log` when one is given (non-managed
/// environments) and logged otherwise; they never abort the remaining
/// moves.
pub async fn route_files(
    temp_dir: &Path,
    dest_dir: &Path,
    channel_id: &str,
    video_id: &str,
    channel: &str,
    coordinator: &dyn Coordinator,
    error_log: Option<&Path>,
) -> RouteReport {
    let mut report = RouteReport::default();

    if let Err(e) = tokio::fs::create_dir_all(dest_dir).await {
        let detail = format!("cannot create {}: {e}", dest_dir.display());
        report_failure(&mut report, dest_dir.to_path_buf(), detail, error_log).await;
        return report;
    }

    let mut entries = match tokio::fs::read_dir(temp_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            let detail = format!("cannot read {}: {e}", temp_dir.display());
            report_failure(&mut report, temp_dir.to_path_buf(), detail, error_log).await;
            return report;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !belongs_to_session(name, channel_id, video_id) {
            continue;
        }

        let src = entry.path();
        let dest = dest_dir.join(name);
        info!("moving {} to {}", src.display(), dest.display());

        match move_file(&src, &dest).await {
            Ok(()) => {
                if let Err(e) = coordinator.publish(channel, video_id).await {
                    warn!("move notification on {channel} failed: {e}");
                }
                report.moved.push(dest);
            }
            Err(e) => {
                let detail = format!("moving {} failed: {e}", src.display());
                report_failure(&mut report, src, detail, error_log).await;
            }
        }
    }

    report
}

/// `rename` with a copy+remove fallback for cross-filesystem moves.
async fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(src, dest).await?;
            tokio::fs::remove_file(src).await
        }
    }
}

async fn report_failure(
    report: &mut RouteReport,
    path: PathBuf,
    detail: String,
    error_log: Option<&Path>,
) {
    match error_log {
        Some(log_path) => {
            let line = format!("{detail}\n");
            if let Err(e) = append_to_log(log_path, &line).await {
                error!("{detail} (and writing {} failed: {e})", log_path.display());
            }
        }
        None => error!("{detail}"),
    }
    report.failed.push((path, detail));
}

async fn append_to_log(path: &Path, line: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
