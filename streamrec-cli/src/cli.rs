use std::path::PathBuf;

use clap::Parser;

/// Record one YouTube live broadcast, start to finish.
#[derive(Parser, Debug)]
#[command(name = "streamrec", version, about, long_about = None)]
pub struct Args {
    /// Video id of the broadcast to record (11 characters; a leading `@`
    /// may be escaped as `-`)
    pub video_id: String,

    /// Path to a config file (default: the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Final archive directory
    #[arg(long)]
    pub output: Option<String>,

    /// Working directory for in-progress captures
    #[arg(long)]
    pub temp: Option<String>,

    /// Directory for broadcasts deleted while live
    #[arg(long)]
    pub unarchived: Option<String>,

    /// Directory for members-only broadcasts
    #[arg(long)]
    pub member_only: Option<String>,

    /// Capture from join time instead of the broadcast's first frame
    #[arg(long)]
    pub disable_live_from_start: bool,

    /// Skip the start-of-stream notification
    #[arg(long)]
    pub no_start_notification: bool,

    /// Run without the pub/sub bus and recording registry
    #[arg(long)]
    pub disable_coordination: bool,

    /// Coordination store URL
    #[arg(long, env = "STREAMREC_REDIS_URL")]
    pub redis_url: Option<String>,

    /// YouTube Data API key
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Path to the yt-dlp binary
    #[arg(long)]
    pub ytdlp: Option<PathBuf>,

    /// Cookie file passed to yt-dlp
    #[arg(long)]
    pub cookies_file: Option<PathBuf>,

    /// Browser profile yt-dlp extracts cookies from
    #[arg(long)]
    pub cookies_from_browser: Option<String>,

    /// Directory for daily-rotated log files (console only when unset)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}
