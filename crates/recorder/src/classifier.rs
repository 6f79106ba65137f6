//! Per-line classification of capture-process output.
//!
//! yt-dlp has no structured status API; schedule and availability changes
//! surface as diagnostic text. Classification is a pure function over one
//! line so the stream readers stay trivial and the rules stay testable.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

/// Which pipe a line was read from. The classification rules differ per
/// stream: availability failures only ever appear on stderr, the download
/// confirmation only on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Typed classification of one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    /// A `[download]` line: the broadcast is live and bytes are flowing.
    DownloadStarted,
    /// The stream is restricted to the channel's paid members.
    MembersOnlyBlocked,
    /// The video was made private mid-wait or mid-capture.
    Privated,
    /// The video was removed by the uploader or the platform.
    Removed,
    /// `[wait]` chatter, suppressed so it cannot flood the logs.
    Noise,
    /// Informational only; logged, never a state transition.
    Other,
}

/// One raw line plus its classification.
#[derive(Debug, Clone)]
pub struct ClassifiedLine {
    pub stream: StreamKind,
    pub tag: LineTag,
    pub text: String,
}

/// Classify one line of capture output.
pub fn classify(stream: StreamKind, line: &str) -> ClassifiedLine {
    ClassifiedLine {
        stream,
        tag: tag_for(stream, line),
        text: line.to_string(),
    }
}

fn tag_for(stream: StreamKind, line: &str) -> LineTag {
    let lower = line.to_lowercase();
    if lower.starts_with("[wait]") {
        return LineTag::Noise;
    }

    match stream {
        StreamKind::Stderr => {
            if line.contains("members-only content") || line.contains("channel's members") {
                LineTag::MembersOnlyBlocked
            } else if line.contains("video is private") || line.contains("Private video") {
                LineTag::Privated
            } else if line.contains("video has been removed")
                || line.contains("removed by the uploader")
            {
                LineTag::Removed
            } else {
                LineTag::Other
            }
        }
        StreamKind::Stdout => {
            if lower.starts_with("[download]") {
                LineTag::DownloadStarted
            } else {
                LineTag::Other
            }
        }
    }
}

/// Diagnostic sink for stream-reader faults.
///
/// The readers must never stop consuming output because one line could not
/// be read; faults are counted here instead of being discarded, so tests
/// can assert that none occurred.
#[derive(Debug, Default)]
pub struct ClassifierDiagnostics {
    faults: AtomicUsize,
}

impl ClassifierDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fault(&self, stream: StreamKind, err: &std::io::Error) {
        warn!("unreadable line on capture {}: {err}", stream.as_str());
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fault_count(&self) -> usize {
        self.faults.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_prefix_is_noise_on_both_streams() {
        assert_eq!(
            classify(StreamKind::Stdout, "[wait] Waiting for video...").tag,
            LineTag::Noise
        );
        assert_eq!(
            classify(StreamKind::Stderr, "[WAIT] remaining 120s").tag,
            LineTag::Noise
        );
    }

    #[test]
    fn members_only_detected_on_stderr() {
        let line = "ERROR: This video is available to this channel's members";
        assert_eq!(
            classify(StreamKind::Stderr, line).tag,
            LineTag::MembersOnlyBlocked
        );
        assert_eq!(
            classify(StreamKind::Stderr, "Join this channel to get access to members-only content").tag,
            LineTag::MembersOnlyBlocked
        );
    }

    #[test]
    fn members_only_pattern_ignored_on_stdout() {
        let line = "This video is available to this channel's members";
        assert_eq!(classify(StreamKind::Stdout, line).tag, LineTag::Other);
    }

    #[test]
    fn privated_and_removed_detected() {
        assert_eq!(
            classify(StreamKind::Stderr, "ERROR: This video is private").tag,
            LineTag::Privated
        );
        assert_eq!(
            classify(StreamKind::Stderr, "Private video. Sign in if you've been granted access").tag,
            LineTag::Privated
        );
        assert_eq!(
            classify(StreamKind::Stderr, "ERROR: This video has been removed by the uploader").tag,
            LineTag::Removed
        );
    }

    #[test]
    fn download_line_detected_case_insensitively() {
        assert_eq!(
            classify(StreamKind::Stdout, "[download] Destination: x.mp4").tag,
            LineTag::DownloadStarted
        );
        assert_eq!(
            classify(StreamKind::Stdout, "[Download]   0.1% of ~2.5GiB").tag,
            LineTag::DownloadStarted
        );
    }

    #[test]
    fn download_line_only_counts_on_stdout() {
        assert_eq!(
            classify(StreamKind::Stderr, "[download] Destination: x.mp4").tag,
            LineTag::Other
        );
    }

    #[test]
    fn unmatched_lines_are_other() {
        assert_eq!(
            classify(StreamKind::Stdout, "[youtube] abc: Downloading webpage").tag,
            LineTag::Other
        );
        assert_eq!(classify(StreamKind::Stderr, "WARNING: retrying").tag, LineTag::Other);
    }

    #[test]
    fn diagnostics_count_faults() {
        let diag = ClassifierDiagnostics::new();
        assert_eq!(diag.fault_count(), 0);
        diag.record_fault(
            StreamKind::Stdout,
            &std::io::Error::new(std::io::ErrorKind::InvalidData, "bad utf-8"),
        );
        assert_eq!(diag.fault_count(), 1);
    }
}
