//! attendd - workstation attendance agent
//!
//! This is the main entry point for the agent.
//! It wires together all the components:
//! - Configuration loading
//! - Host adapters (Linux)
//! - Record store (SQLite or REST)
//! - Attendance hand-off and shutdown monitor

use anyhow::{Context, Result};
use attend_config::{AgentConfig, StoreSettings, load_config};
use attend_host_linux::LinuxHost;
use attend_store::{RecordStore, RestRecordStore, RestStoreConfig, SqliteRecordStore};
use attend_util::{ATTEND_CONFIG_ENV, ATTEND_DATA_DIR_ENV, default_config_path, format_duration};
use attendd::{Agent, Collaborators, RunOutcome};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// attendd - Infers work hours from system events and shuts idle machines down
#[derive(Parser, Debug)]
#[command(name = "attendd")]
#[command(about = "Workstation attendance agent with idle shutdown", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/attendd/config.toml)
    #[arg(short, long, env = ATTEND_CONFIG_ENV, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ATTEND_DATA_DIR env var)
    #[arg(short, long, env = ATTEND_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Record attendance and exit without monitoring for idle shutdown
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    /// One JSON object per line, for log collectors
    Json,
}

fn open_store(config: &AgentConfig) -> Result<Arc<dyn RecordStore>> {
    match &config.store {
        StoreSettings::Sqlite { .. } => {
            let path = config
                .store
                .sqlite_path(&config.agent.data_dir)
                .context("sqlite store without a path")?;
            let store = SqliteRecordStore::open(&path)
                .with_context(|| format!("Failed to open database {:?}", path))?;
            info!(db_path = %path.display(), "SQLite record store opened");
            Ok(Arc::new(store))
        }
        StoreSettings::Rest {
            url,
            api_key,
            roster_table,
            attendance_table,
            timeout,
        } => {
            let store = RestRecordStore::new(RestStoreConfig {
                url: url.clone(),
                api_key: api_key.clone(),
                roster_table: roster_table.clone(),
                attendance_table: attendance_table.clone(),
                timeout: *timeout,
            })
            .context("Failed to create REST client")?;
            info!(url = %url, "REST record store configured");
            Ok(Arc::new(store))
        }
    }
}

async fn wait_for_termination() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mock_time = attend_util::is_mock_time_active(),
        "attendd starting"
    );

    // Load configuration
    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(data_dir) = &args.data_dir {
        config.agent.data_dir = data_dir.clone();
    }

    info!(
        config_path = %args.config.display(),
        data_dir = %config.agent.data_dir.display(),
        cutoff = %config.shutdown.cutoff,
        "Configuration loaded"
    );

    std::fs::create_dir_all(&config.agent.data_dir).with_context(|| {
        format!("Failed to create data directory {:?}", config.agent.data_dir)
    })?;

    if !config.agent.startup_delay.is_zero() {
        info!(
            delay = %format_duration(config.agent.startup_delay),
            "Waiting before first contact"
        );
        tokio::time::sleep(config.agent.startup_delay).await;
    }

    let host = LinuxHost::new(&config.host);
    let collab = Collaborators {
        events: Arc::new(host.events),
        idle: Arc::new(host.idle),
        power: Arc::new(host.power),
        identity: Arc::new(host.identity),
        store: open_store(&config)?,
    };

    let agent = Agent::new(config, collab);
    match agent.run(args.once).await? {
        RunOutcome::Exempt(_) | RunOutcome::MonitoringSkipped => {
            info!("attendd finished");
        }
        RunOutcome::ShutdownAccepted => {
            // The system is going down; stay around until asked to stop
            info!("Waiting for system shutdown");
            wait_for_termination().await?;
        }
    }

    Ok(())
}
