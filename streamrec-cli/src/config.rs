use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// File-backed defaults; the command line overrides any of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub redis_url: String,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub unarchived_dir: PathBuf,
    pub member_only_dir: PathBuf,
    pub ytdlp_path: PathBuf,
    /// Cookie file used in managed environments.
    pub cookies_file: PathBuf,
    /// Browser profile used interactively.
    pub cookies_from_browser: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1/".to_string(),
            output_dir: PathBuf::from("./records"),
            temp_dir: PathBuf::from("./records_tmp"),
            unarchived_dir: PathBuf::from("./unarchived"),
            member_only_dir: PathBuf::from("./member_only"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            cookies_file: PathBuf::from("/app/cookies.txt"),
            cookies_from_browser: "firefox".to_string(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from an explicit path, else the platform config directory,
    /// else built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => match Self::default_path() {
                Some(default) if default.exists() => default,
                _ => return Ok(Self::default()),
            },
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("streamrec").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: AppConfig = toml::from_str("redis_url = \"redis://cache:6379/\"").unwrap();
        assert_eq!(config.redis_url, "redis://cache:6379/");
        assert_eq!(config.ytdlp_path, PathBuf::from("yt-dlp"));
        assert_eq!(config.cookies_from_browser, "firefox");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<AppConfig>("redsi_url = \"oops\"").is_err());
    }
}
