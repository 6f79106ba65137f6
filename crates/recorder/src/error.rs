//! Session-wide error types.

use thiserror::Error;

/// Session-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a broadcast can no longer be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Restricted to the channel's paid members.
    MembersOnly,
    /// The video was made private.
    Privated,
    /// The video was removed or the waiting room was deleted.
    Removed,
    /// The startup timeout expired without the broadcast ever starting.
    NeverStarted,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MembersOnly => "members-only content",
            Self::Privated => "video is private",
            Self::Removed => "video was removed",
            Self::NeverStarted => "broadcast never started",
        };
        f.write_str(s)
    }
}

/// Session-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("setup error: {0}")]
    Setup(String),

    #[error("invalid video id `{id}`: must be exactly 11 characters")]
    InvalidVideoId { id: String },

    #[error("metadata authentication failed: {0}")]
    Auth(String),

    #[error("no live broadcast found for video {video_id}")]
    VideoNotFound { video_id: String },

    #[error("video {video_id} has no scheduled start time")]
    NoScheduledStart { video_id: String },

    #[error("cannot record video {video_id}: {reason}")]
    ContentUnavailable {
        video_id: String,
        reason: UnavailableReason,
    },

    #[error("failed to spawn capture process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    #[error("coordination store error: {0}")]
    Coordination(#[from] crate::coordination::CoordinationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
}
