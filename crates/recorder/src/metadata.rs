//! Metadata gateway trait and types.
//!
//! Answers "does this broadcast exist, who streams it, and when does it
//! start". Kept as a trait so the session can be driven by a stub in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Snippet and live-streaming details of one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub channel_id: String,
    pub channel_title: String,
    /// Absent for non-live uploads.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Present once the broadcast went live.
    pub actual_start: Option<DateTime<Utc>>,
    /// Present once the broadcast ended.
    pub actual_end: Option<DateTime<Utc>>,
}

impl VideoInfo {
    pub fn is_live_ended(&self) -> bool {
        self.actual_end.is_some()
    }
}

/// Lookup failures. Transient ones are retried indefinitely; auth failures
/// abort the session.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("transient metadata failure: {0}")]
    Transient(String),

    #[error("metadata authentication failed: {0}")]
    Auth(String),
}

impl LookupError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The video metadata lookup service.
#[async_trait]
pub trait MetadataGateway: Send + Sync {
    /// Look up a video. `Ok(None)` means the video no longer exists.
    async fn lookup(&self, video_id: &str) -> Result<Option<VideoInfo>, LookupError>;

    /// Post-hoc check whether the finished video is restricted to members.
    async fn is_member_only(&self, video_id: &str) -> Result<bool, LookupError>;
}
