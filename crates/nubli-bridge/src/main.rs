//! nubli-bridge - expose Nuki smart locks as lock accessories.
//!
//! Run with: `cargo run -p nubli-bridge -- simulate`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nubli_bridge::commands::{self, CredentialStatus};
use nubli_bridge::{Bridge, Config, Simulation, TracingHost};

#[derive(Parser, Debug)]
#[command(name = "nubli-bridge")]
#[command(version, about = "Expose Nuki smart locks as lock accessories", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log the core crates at debug level.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Directory holding pairing credentials (overrides config).
    #[arg(long, global = true)]
    config_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and report credentials per lock
    Check,

    /// List nearby Smart Locks
    Scan {
        /// Scan duration in seconds
        #[arg(short = 't', long, default_value = "10")]
        duration: u64,
    },

    /// Run the bridge against simulated locks
    Simulate {
        /// Seconds between simulated lock activity
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if args.debug {
        config.debug = true;
    }
    if let Some(path) = args.config_path {
        config.config_path = Some(path);
    }

    init_tracing(config.debug)?;

    match args.command {
        Commands::Check => run_check(&config),
        Commands::Scan { duration } => run_scan(&config, Duration::from_secs(duration)).await,
        Commands::Simulate { interval } => {
            run_simulate(config, Duration::from_secs(interval.max(1))).await
        }
    }
}

fn init_tracing(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("nubli_bridge={level}").parse()?)
        .add_directive(format!("nubli_core={level}").parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn run_check(config: &Config) -> Result<()> {
    config.validate()?;
    println!("Configuration ok: {} lock(s)", config.locks.len());
    println!("Credentials: {}", config.credentials_dir().display());

    let checks = commands::check(config);
    for check in &checks {
        println!("  {}", check);
    }
    let missing = checks
        .iter()
        .filter(|c| !matches!(c.status, CredentialStatus::Valid { .. }))
        .count();
    if missing > 0 {
        anyhow::bail!("{} lock(s) cannot be attached", missing);
    }
    Ok(())
}

async fn run_scan(config: &Config, duration: Duration) -> Result<()> {
    let locks = commands::scan(config, duration).await?;
    if locks.is_empty() {
        println!("No Smart Locks found");
        return Ok(());
    }
    for lock in &locks {
        let configured = commands::configured_name(config, lock).unwrap_or("-");
        let rssi = lock
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{}  {:<20} {:>8}  accessory: {}",
            lock.id,
            lock.name.as_deref().unwrap_or("Nuki"),
            rssi,
            configured
        );
    }
    Ok(())
}

async fn run_simulate(mut config: Config, interval: Duration) -> Result<()> {
    let credentials_dir = Simulation::default_credentials_dir();
    config.config_path = Some(credentials_dir.clone());
    config.validate()?;

    let shutdown = CancellationToken::new();
    let simulation = Arc::new(Simulation::new(&config, &credentials_dir));
    let host = Arc::new(TracingHost::new());
    let bridge = Bridge::new(
        &config,
        Arc::clone(simulation.transport()),
        host,
        shutdown.clone(),
    )?;

    info!(
        "Simulating {} Smart Lock(s), credentials in {}",
        simulation.locks().len(),
        credentials_dir.display()
    );
    simulation.announce_all();
    let activity = simulation.start(interval, shutdown.child_token());

    bridge.run_until_ctrl_c().await;
    activity.await?;
    Ok(())
}
