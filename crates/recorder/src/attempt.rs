//! Per-attempt outcome state.
//!
//! Classifier lines and watchdog expiries can race; instead of sharing
//! mutable flags between callbacks, every event is resolved here by the one
//! serial monitoring loop. The machine latches the download confirmation and
//! enforces first-writer-wins on the terminal flags: once the attempt is
//! settled (unrecoverable or restart-requested), nothing can change it.

use chrono::{DateTime, Utc};

use crate::classifier::{ClassifiedLine, LineTag};
use crate::error::UnavailableReason;

/// What the monitoring loop should do in response to a classified line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    /// First `[download]` line of the attempt: announce the start and arm
    /// the rerecord timer.
    DownloadConfirmed,
    /// Unrecoverable content; terminate the attempt.
    ContentUnavailable(UnavailableReason),
}

/// Outcome flags of one capture attempt, resolved serially.
#[derive(Debug)]
pub struct AttemptMachine {
    download_confirmed: bool,
    unrecoverable: Option<UnavailableReason>,
    restart_requested: bool,
}

impl AttemptMachine {
    pub fn new() -> Self {
        Self {
            download_confirmed: false,
            unrecoverable: None,
            restart_requested: false,
        }
    }

    pub fn download_confirmed(&self) -> bool {
        self.download_confirmed
    }

    pub fn unrecoverable(&self) -> Option<UnavailableReason> {
        self.unrecoverable
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    /// Whether a terminal flag has been set for this attempt.
    pub fn settled(&self) -> bool {
        self.unrecoverable.is_some() || self.restart_requested
    }

    /// Resolve one classified line.
    ///
    /// Repeated `[download]` lines are no-ops (latch, not counter), and any
    /// line observed after the attempt settled produces no action.
    pub fn on_line(&mut self, line: &ClassifiedLine) -> Option<LineAction> {
        if self.settled() {
            return None;
        }

        match line.tag {
            LineTag::DownloadStarted => {
                if self.download_confirmed {
                    None
                } else {
                    self.download_confirmed = true;
                    Some(LineAction::DownloadConfirmed)
                }
            }
            LineTag::MembersOnlyBlocked => self.fail(UnavailableReason::MembersOnly),
            LineTag::Privated => self.fail(UnavailableReason::Privated),
            LineTag::Removed => self.fail(UnavailableReason::Removed),
            LineTag::Noise | LineTag::Other => None,
        }
    }

    fn fail(&mut self, reason: UnavailableReason) -> Option<LineAction> {
        self.unrecoverable = Some(reason);
        Some(LineAction::ContentUnavailable(reason))
    }

    /// Mark the attempt unrecoverable. Returns `false` when the attempt was
    /// already settled and the flag was not written.
    pub fn mark_unrecoverable(&mut self, reason: UnavailableReason) -> bool {
        if self.settled() {
            return false;
        }
        self.unrecoverable = Some(reason);
        true
    }

    /// Request a restart of the attempt. Returns `false` when the attempt
    /// was already settled and the flag was not written.
    pub fn mark_restart_requested(&mut self) -> bool {
        if self.settled() {
            return false;
        }
        self.restart_requested = true;
        true
    }

    /// Final flags, consumed when the attempt ends.
    pub fn into_report(self, new_scheduled_start: Option<DateTime<Utc>>) -> AttemptReport {
        AttemptReport {
            download_confirmed: self.download_confirmed,
            unrecoverable: self.unrecoverable,
            restart_requested: self.restart_requested,
            new_scheduled_start,
        }
    }
}

impl Default for AttemptMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Final flags of one capture attempt, returned to the session loop.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub download_confirmed: bool,
    pub unrecoverable: Option<UnavailableReason>,
    pub restart_requested: bool,
    /// Updated scheduled start, present only after a schedule change.
    pub new_scheduled_start: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{StreamKind, classify};

    fn download_line() -> ClassifiedLine {
        classify(StreamKind::Stdout, "[download] Destination: x.mp4")
    }

    #[test]
    fn download_latch_fires_exactly_once() {
        let mut machine = AttemptMachine::new();
        assert_eq!(
            machine.on_line(&download_line()),
            Some(LineAction::DownloadConfirmed)
        );
        assert_eq!(machine.on_line(&download_line()), None);
        assert!(machine.download_confirmed());
    }

    #[test]
    fn members_only_line_settles_the_attempt() {
        let mut machine = AttemptMachine::new();
        let line = classify(
            StreamKind::Stderr,
            "ERROR: This video is available to this channel's members",
        );
        assert_eq!(
            machine.on_line(&line),
            Some(LineAction::ContentUnavailable(UnavailableReason::MembersOnly))
        );
        assert_eq!(machine.unrecoverable(), Some(UnavailableReason::MembersOnly));
    }

    #[test]
    fn unrecoverable_cannot_be_overwritten() {
        let mut machine = AttemptMachine::new();
        assert!(machine.mark_unrecoverable(UnavailableReason::Privated));

        // No later line or timer may clear it or flip to restart.
        let removed = classify(StreamKind::Stderr, "ERROR: video has been removed");
        assert_eq!(machine.on_line(&removed), None);
        assert!(!machine.mark_restart_requested());
        assert!(!machine.mark_unrecoverable(UnavailableReason::Removed));

        assert_eq!(machine.unrecoverable(), Some(UnavailableReason::Privated));
        assert!(!machine.restart_requested());
    }

    #[test]
    fn restart_blocks_later_unrecoverable() {
        let mut machine = AttemptMachine::new();
        assert!(machine.mark_restart_requested());
        assert!(!machine.mark_unrecoverable(UnavailableReason::Removed));
        assert_eq!(machine.unrecoverable(), None);
    }

    #[test]
    fn download_not_latched_after_settling() {
        let mut machine = AttemptMachine::new();
        machine.mark_unrecoverable(UnavailableReason::Removed);
        assert_eq!(machine.on_line(&download_line()), None);
        assert!(!machine.download_confirmed());
    }

    #[test]
    fn report_carries_final_flags() {
        let mut machine = AttemptMachine::new();
        machine.on_line(&download_line());
        machine.mark_restart_requested();
        let report = machine.into_report(None);
        assert!(report.download_confirmed);
        assert!(report.restart_requested);
        assert_eq!(report.unrecoverable, None);
    }
}
