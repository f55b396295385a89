//! iptv-tuner: HDHomeRun tuner emulator for IPTV playlists.
//!
//! Media servers discover this process as a single-tuner network device and
//! pull MPEG-TS from it; each stream request is relayed from the channel's
//! upstream URL, replacing whatever stream was playing before.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

mod epg;
mod logging;
mod playlist;
mod scheduler;
mod settings;
mod tuner;
mod web;

use settings::SettingsStore;
use tuner::{FallbackConfig, UpstreamTimeouts};
use web::AppContext;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5004;
const DEFAULT_BASE_URL: &str = "http://localhost:5004";
const DEFAULT_CONFIG_FILE: &str = "iptv-tuner.toml";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// iptv-tuner - HDHomeRun tuner emulator for IPTV playlists
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Base URL advertised to media servers
    #[arg(short, long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Path to the runtime settings file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "data/settings.json")]
    settings: PathBuf,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,

    /// Encoder used for the placeholder stream
    #[arg(long)]
    encoder: Option<PathBuf>,

    /// Never serve a placeholder stream
    #[arg(long)]
    no_fallback: bool,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    upstream: UpstreamSection,
    #[serde(default)]
    fallback: FallbackSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ServerSection {
    listen: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct SettingsSection {
    path: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct UpstreamSection {
    connect_timeout_secs: Option<u64>,
    write_timeout_secs: Option<u64>,
    pool_idle_timeout_secs: Option<u64>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct FallbackSection {
    encoder: Option<String>,
    duration_secs: Option<u64>,
    enabled: Option<bool>,
}

impl UpstreamSection {
    fn timeouts(&self) -> UpstreamTimeouts {
        let defaults = UpstreamTimeouts::default();
        UpstreamTimeouts {
            connect: self.connect_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.connect),
            write: self.write_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.write),
            pool: self.pool_idle_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.pool),
            ..defaults
        }
    }
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Command line wins when it differs from its default.
fn listen_addr(args: &Args, file: &ServerSection) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let cli = SocketAddr::new(args.host, args.port);
    let cli_is_default = args.host.to_string() == DEFAULT_HOST && args.port == DEFAULT_PORT;
    match &file.listen {
        Some(listen) if cli_is_default => Ok(listen.parse::<SocketAddr>()?),
        _ => Ok(cli),
    }
}

fn fallback_config(args: &Args, file: &FallbackSection) -> FallbackConfig {
    let defaults = FallbackConfig::default();
    FallbackConfig {
        encoder: args
            .encoder
            .clone()
            .or_else(|| file.encoder.as_ref().map(PathBuf::from))
            .unwrap_or(defaults.encoder),
        duration: file.duration_secs.map(Duration::from_secs).unwrap_or(defaults.duration),
        enabled: !args.no_fallback && file.enabled.unwrap_or(true),
        ..defaults
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    });
    let file_config = if let Some(config_path) = &config_path {
        match load_config(config_path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", config_path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        }
    } else {
        ConfigFile::default()
    };

    // Merge logging configs (command line takes precedence)
    let log_dir = if args.log_dir.to_string_lossy() != "logs" {
        args.log_dir.clone()
    } else {
        PathBuf::from(file_config.logging.log_dir.as_deref().unwrap_or("logs"))
    };
    let log_retention_days = if args.log_retention_days != 7 {
        args.log_retention_days
    } else {
        file_config.logging.retention_days.unwrap_or(7)
    };
    logging::init_logging(
        &log_dir,
        log_retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;

    use log::{error, info, warn};

    let listen = listen_addr(&args, &file_config.server)?;
    let base_url = args
        .base_url
        .clone()
        .or_else(|| file_config.server.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let settings_path = match &file_config.settings.path {
        Some(path) if args.settings == PathBuf::from("data/settings.json") => PathBuf::from(path),
        _ => args.settings.clone(),
    };

    let settings = match SettingsStore::load_or_create(&settings_path) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            error!("Failed to load settings from {}: {}", settings_path.display(), e);
            return Err(e.into());
        }
    };
    let fallback = fallback_config(&args, &file_config.fallback);

    info!("iptv-tuner starting...");
    info!("  Listen address: {}", listen);
    info!("  Base URL: {}", base_url);
    info!("  Settings: {}", settings.path().display());
    info!(
        "  Fallback: {}",
        if fallback.enabled {
            fallback.encoder.display().to_string()
        } else {
            "disabled".to_string()
        }
    );

    let ctx = Arc::new(AppContext::new(
        settings,
        &base_url,
        file_config.upstream.timeouts(),
        fallback,
    ));
    if !ctx.fallback.is_available().await {
        warn!("Placeholder streams unavailable; rejected channels will answer 503");
    }

    let scheduler_handle = Arc::clone(&ctx.scheduler).start();

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(web::start_web_server(listen, Arc::clone(&ctx), shutdown.clone()));

    let finished = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            None
        }
        result = &mut server => Some(result),
    };

    shutdown.cancel();
    ctx.arbiter.shutdown().await;
    ctx.scheduler.stop().await;

    let result = match finished {
        Some(result) => Ok(result),
        None => tokio::time::timeout(SHUTDOWN_GRACE, server).await,
    };
    match result {
        Ok(Ok(Ok(()))) => info!("Server stopped"),
        Ok(Ok(Err(e))) => error!("Server error: {}", e),
        Ok(Err(e)) => error!("Server task failed: {}", e),
        Err(_) => warn!("Server did not stop within {:?}", SHUTDOWN_GRACE),
    }
    scheduler_handle.abort();

    Ok(())
}
