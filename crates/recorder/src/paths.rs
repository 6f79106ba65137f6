//! Artifact naming and directory layout.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};

/// Source tag used in artifact names and the watch URL.
pub const SOURCE: &str = "youtube";

/// `{base}/{yyyyMMdd}`, stamped by the day the session started.
pub fn dated_dir(base: &Path, day: NaiveDate) -> PathBuf {
    base.join(day.format("%Y%m%d").to_string())
}

/// Artifact name prefix for one capture attempt:
/// `youtube_{channelId}_{yyyyMMdd_HHmmss}_{videoId}`.
pub fn artifact_prefix(channel_id: &str, started_at: DateTime<Local>, video_id: &str) -> String {
    format!(
        "{SOURCE}_{channel_id}_{}_{video_id}",
        started_at.format("%Y%m%d_%H%M%S")
    )
}

/// Whether a file in the temp directory belongs to this session.
///
/// Each attempt stamps its own prefix, so the match is on the fixed parts:
/// `youtube_{channelId}_` at the front and `_{videoId}.` before the
/// extension.
pub fn belongs_to_session(file_name: &str, channel_id: &str, video_id: &str) -> bool {
    file_name.starts_with(&format!("{SOURCE}_{channel_id}_"))
        && file_name.contains(&format!("_{video_id}."))
}

/// Strip stray quotes a shell may have left in a path argument.
pub fn clean_path_arg(raw: &str) -> PathBuf {
    PathBuf::from(raw.replace('"', ""))
}

/// Whether this instance runs in a managed (containerized) context.
pub fn in_managed_env() -> bool {
    std::env::var("STREAMREC_IN_CONTAINER")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
        || Path::new("/.dockerenv").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dated_dir_appends_compact_date() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        assert_eq!(
            dated_dir(Path::new("/data/temp"), day),
            PathBuf::from("/data/temp/20260830")
        );
    }

    #[test]
    fn prefix_layout_matches_name_scheme() {
        let started = Local.with_ymd_and_hms(2026, 8, 30, 12, 34, 56).unwrap();
        assert_eq!(
            artifact_prefix("UCabc", started, "dQw4w9WgXcQ"),
            "youtube_UCabc_20260830_123456_dQw4w9WgXcQ"
        );
    }

    #[test]
    fn session_matcher_accepts_any_attempt_stamp() {
        assert!(belongs_to_session(
            "youtube_UCabc_20260830_123456_dQw4w9WgXcQ.mp4",
            "UCabc",
            "dQw4w9WgXcQ"
        ));
        assert!(belongs_to_session(
            "youtube_UCabc_20260830_180001_dQw4w9WgXcQ.webm",
            "UCabc",
            "dQw4w9WgXcQ"
        ));
    }

    #[test]
    fn session_matcher_rejects_other_sessions() {
        // Different video on the same channel.
        assert!(!belongs_to_session(
            "youtube_UCabc_20260830_123456_otherVideo1.mp4",
            "UCabc",
            "dQw4w9WgXcQ"
        ));
        // Same video recorded by a different channel prefix.
        assert!(!belongs_to_session(
            "youtube_UCxyz_20260830_123456_dQw4w9WgXcQ.mp4",
            "UCabc",
            "dQw4w9WgXcQ"
        ));
        // Unrelated file.
        assert!(!belongs_to_session("notes.txt", "UCabc", "dQw4w9WgXcQ"));
    }

    #[test]
    fn quotes_are_stripped_from_path_args() {
        assert_eq!(
            clean_path_arg("\"/data/output\""),
            PathBuf::from("/data/output")
        );
    }
}
