//! NowPlaying OSC
//!
//! Relays the current Spotify track to the VRChat chatbox and lets the
//! operator type manual messages without being overwritten.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nowplaying_osc::cli;
use nowplaying_osc::config::{AppConfig, Credentials};
use nowplaying_osc::osc::{MessageSink, OscChatboxSink};
use nowplaying_osc::paths::AppPaths;
use nowplaying_osc::playback::SpotifyClient;
use nowplaying_osc::relay::{PollLoop, RelayPolicy, UpdateCoordinator};
use nowplaying_osc::{setup, sniffer};

/// NowPlaying OSC - Spotify track info in the VRChat chatbox
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the app data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Print incoming OSC traffic instead of relaying
    #[arg(long)]
    sniffer: bool,

    /// Re-enter Spotify credentials
    #[arg(long)]
    setup: bool,

    /// Authorize this app with Spotify and cache the token
    #[arg(long)]
    authorize: bool,

    /// Send the current track once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let paths = AppPaths::detect();

    // Working directory first, then the app directory; earlier values win
    dotenvy::dotenv().ok();
    dotenvy::from_path(&paths.env_file).ok();

    let args = Args::parse();

    if let Err(e) = paths.ensure_directories() {
        eprintln!("[paths] {:#}", e);
    }
    let _log_guard = init_logging(&args.log_level, &paths.logs_dir)?;

    info!("Starting NowPlaying OSC v{}...", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", paths.base_dir().display());

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    info!("Configuration file: {}", config_path.display());
    let config = AppConfig::load_or_default(&config_path).await?;

    if args.sniffer {
        return sniffer::run_osc_sniffer(&config.osc.host, config.osc.listen_port).await;
    }

    let credentials = resolve_credentials(&config, &paths.env_file, args.setup)?;
    let spotify = SpotifyClient::new(&credentials, &config.spotify, paths.token_cache.clone()).await;

    if args.authorize {
        return setup::run_authorize(&spotify).await;
    }

    let sink: Arc<dyn MessageSink> = Arc::new(OscChatboxSink::from_config(&config.osc)?);
    let (coordinator, commands) =
        UpdateCoordinator::new(sink, RelayPolicy::from_config(&config));
    coordinator.subscribe_track_updates(Arc::new(|line: &str| {
        info!("Now playing: {}", line);
    }));

    let poller = PollLoop::new(
        coordinator.clone(),
        Arc::new(spotify),
        commands,
        config.timing.poll_interval(),
        config.timing.request_timeout(),
    );

    if args.once {
        let outcome = poller.cycle().await;
        info!("Single update finished: {:?}", outcome);
        return Ok(());
    }

    run_app(coordinator, poller, shutdown_signal()).await?;

    info!("NowPlaying OSC shutdown complete");
    Ok(())
}

async fn run_app(
    coordinator: Arc<UpdateCoordinator>,
    poller: PollLoop,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let handle = poller.spawn();
    let console = cli::spawn_console(coordinator, handle.control());

    tokio::pin!(shutdown);

    tokio::select! {
        result = console => {
            match result {
                Ok(Ok(())) => info!("Console closed, stopping"),
                Ok(Err(e)) => error!("Console failed: {:#}", e),
                Err(_) => warn!("Console thread ended unexpectedly"),
            }
        }
        _ = &mut shutdown => {}
    }

    info!("Shutting down...");
    handle.shutdown().await;
    handle.join().await?;
    Ok(())
}

/// Credentials from env/config, or from the setup wizard when missing or forced
fn resolve_credentials(config: &AppConfig, env_file: &Path, force_setup: bool) -> Result<Credentials> {
    if !force_setup {
        match config.credentials() {
            Ok(credentials) => return Ok(credentials),
            Err(missing) => warn!("{}; starting setup", missing),
        }
    }

    setup::run_setup_wizard(env_file)?;
    config
        .credentials()
        .context("Credentials still incomplete after setup")
}

fn init_logging(level: &str, logs_dir: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(logs_dir, "nowplaying-osc.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
