//! Recording-session supervisor for YouTube live broadcasts.
//!
//! The crate wraps an external capture process (yt-dlp) in a supervised
//! session: it waits for the scheduled start, classifies the process
//! output into typed events, runs startup and periodic-restart watchdogs,
//! restarts on schedule changes, routes the finished files to the archive,
//! unarchived or member-only directories, and coordinates with sibling
//! instances over a pub/sub bus and a shared recording registry.
//!
//! [`session::Supervisor`] is the entry point; everything else is the
//! machinery it is built from.

pub mod attempt;
pub mod capture;
pub mod classifier;
pub mod command;
pub mod coordination;
pub mod error;
pub mod metadata;
pub mod paths;
pub mod router;
pub mod schedule;
pub mod session;
pub mod watchdog;
pub mod youtube;

pub use error::{Error, Result, UnavailableReason};
pub use router::SessionOutcome;
pub use session::{SessionConfig, SessionEnd, SessionFlags, SessionPaths, Supervisor};
