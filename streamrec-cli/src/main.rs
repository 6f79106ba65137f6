mod cli;
mod config;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use recorder::command::{CaptureSettings, CookieSource};
use recorder::coordination::{Coordinator, NoopCoordinator, RedisCoordinator};
use recorder::paths;
use recorder::youtube::YouTubeGateway;
use recorder::{
    Error, SessionConfig, SessionEnd, SessionFlags, SessionOutcome, SessionPaths, Supervisor,
};

use crate::cli::Args;
use crate::config::AppConfig;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("session failed: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load(args.config.as_deref())?;
    let log_dir = args.log_dir.clone().or_else(|| config.log_dir.clone());
    let _guard = init_logging(args.verbose, args.quiet, log_dir.as_deref())?;

    let api_key = args
        .api_key
        .clone()
        .context("no API key given (set YOUTUBE_API_KEY or pass --api-key)")?;
    let gateway = Arc::new(YouTubeGateway::new(api_key));

    let coordinator: Arc<dyn Coordinator> = if args.disable_coordination {
        info!("coordination disabled, running standalone");
        Arc::new(NoopCoordinator)
    } else {
        let url = args.redis_url.as_deref().unwrap_or(&config.redis_url);
        Arc::new(
            RedisCoordinator::connect(url)
                .await
                .context("connecting to the coordination store")?,
        )
    };

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing the session");
            signal_shutdown.cancel();
        }
    });

    let session = session_config(&args, &config);
    let supervisor = Supervisor::new(gateway, coordinator, shutdown);

    match supervisor.run(session).await {
        Ok(SessionEnd::Completed(outcome)) => info!("session finished: {outcome:?}"),
        Ok(SessionEnd::Skipped) => info!("session skipped before capture"),
        Err(e) => {
            if matches!(e, Error::ContentUnavailable { .. }) {
                info!("session finished: {:?}", SessionOutcome::CannotRecord);
            }
            return Err(e.into());
        }
    }
    Ok(())
}

fn session_config(args: &Args, config: &AppConfig) -> SessionConfig {
    // CLI paths may arrive quoted from launcher scripts.
    let dir = |cli: &Option<String>, fallback: &Path| {
        cli.as_deref()
            .map(paths::clean_path_arg)
            .unwrap_or_else(|| fallback.to_path_buf())
    };

    let cookies = if let Some(file) = &args.cookies_file {
        CookieSource::File(file.clone())
    } else if let Some(browser) = &args.cookies_from_browser {
        CookieSource::Browser(browser.clone())
    } else if paths::in_managed_env() {
        CookieSource::File(config.cookies_file.clone())
    } else {
        CookieSource::Browser(config.cookies_from_browser.clone())
    };

    SessionConfig {
        video_id: args.video_id.clone(),
        paths: SessionPaths {
            output: dir(&args.output, &config.output_dir),
            temp: dir(&args.temp, &config.temp_dir),
            unarchived: dir(&args.unarchived, &config.unarchived_dir),
            member_only: dir(&args.member_only, &config.member_only_dir),
        },
        flags: SessionFlags {
            disable_live_from_start: args.disable_live_from_start,
            suppress_start_notification: args.no_start_notification,
        },
        capture: CaptureSettings {
            binary: args.ytdlp.clone().unwrap_or_else(|| config.ytdlp_path.clone()),
            cookies,
        },
    }
}

fn init_logging(
    verbose: bool,
    quiet: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(PathBuf::from(dir), "streamrec.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    Ok(guard)
}
