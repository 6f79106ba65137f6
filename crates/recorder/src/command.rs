//! yt-dlp invocation builder.

use std::path::PathBuf;

/// Where yt-dlp gets its cookies from.
#[derive(Debug, Clone)]
pub enum CookieSource {
    /// Cookie file inside a managed environment.
    File(PathBuf),
    /// Cookies extracted from a local browser profile.
    Browser(String),
}

/// Fixed capture settings shared by every attempt of a session.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Path to the yt-dlp binary.
    pub binary: PathBuf,
    pub cookies: CookieSource,
}

/// One attempt's capture invocation.
#[derive(Debug, Clone)]
pub struct CaptureCommand {
    pub binary: PathBuf,
    pub video_id: String,
    /// Output path template, `{tempDir}/{prefix}.%(ext)s`.
    pub output_template: String,
    /// Record from the broadcast's actual start rather than from join time.
    pub live_from_start: bool,
    pub cookies: CookieSource,
}

impl CaptureCommand {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }

    /// Full argument list in yt-dlp order: target URL, output template,
    /// wait flag, format selection, cookie source.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.watch_url(),
            "-o".to_string(),
            self.output_template.clone(),
            "--wait-for-video".to_string(),
            "15".to_string(),
        ];

        if self.live_from_start {
            args.extend([
                "--live-from-start".to_string(),
                "-f".to_string(),
                "bestvideo+bestaudio".to_string(),
            ]);
        } else {
            // Join-time capture; the rerecord watchdog compensates.
            args.extend(["-f".to_string(), "b".to_string()]);
        }

        match &self.cookies {
            CookieSource::File(path) => {
                args.extend(["--cookies".to_string(), path.display().to_string()]);
            }
            CookieSource::Browser(browser) => {
                args.extend([
                    "--cookies-from-browser".to_string(),
                    browser.clone(),
                    "--mark-watched".to_string(),
                ]);
            }
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(live_from_start: bool, cookies: CookieSource) -> CaptureCommand {
        CaptureCommand {
            binary: PathBuf::from("yt-dlp"),
            video_id: "dQw4w9WgXcQ".to_string(),
            output_template: "/tmp/20260830/youtube_UC123_20260830_120000_dQw4w9WgXcQ.%(ext)s"
                .to_string(),
            live_from_start,
            cookies,
        }
    }

    #[test]
    fn full_history_invocation() {
        let cmd = command(true, CookieSource::File(PathBuf::from("/app/cookies.txt")));
        let args = cmd.args();
        assert_eq!(args[0], "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(args.windows(2).any(|w| w == ["--wait-for-video", "15"]));
        assert!(args.contains(&"--live-from-start".to_string()));
        assert!(args.windows(2).any(|w| w == ["-f", "bestvideo+bestaudio"]));
        assert!(args.windows(2).any(|w| w == ["--cookies", "/app/cookies.txt"]));
        assert!(!args.contains(&"--mark-watched".to_string()));
    }

    #[test]
    fn join_time_invocation_uses_browser_cookies() {
        let cmd = command(false, CookieSource::Browser("firefox".to_string()));
        let args = cmd.args();
        assert!(args.windows(2).any(|w| w == ["-f", "b"]));
        assert!(!args.contains(&"--live-from-start".to_string()));
        assert!(
            args.windows(2)
                .any(|w| w == ["--cookies-from-browser", "firefox"])
        );
        assert!(args.contains(&"--mark-watched".to_string()));
    }
}
