//! hand-node - host for a tendon-driven robotic hand
//!
//! Runs the actuation server, streams a synthetic test pattern to one, and
//! reads or records the calibration file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod config;
mod operator;
mod pattern;

use config::NodeConfig;

/// hand-node - tendon hand host
#[derive(Parser, Debug)]
#[command(name = "hand-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept pose streams and drive the hand
    Serve {
        /// Listen address (overrides `link.addr`)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Calibration file (overrides `calibration_path`)
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Drive a simulated hand
        #[arg(long)]
        simulate: bool,
    },

    /// Stream a synthetic open-close cycle to a server
    SendTestPattern {
        /// Server address (overrides `link.addr`)
        #[arg(long)]
        connect: Option<SocketAddr>,

        /// Frames per second
        #[arg(long, default_value = "30")]
        rate_hz: u32,

        /// Seconds per open-close cycle
        #[arg(long, default_value = "4")]
        period_secs: f64,

        /// Seconds to run
        #[arg(long, default_value = "10")]
        duration_secs: u64,
    },

    /// Print the stored calibration record
    ShowCalibration {
        /// Calibration file (overrides `calibration_path`)
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Record actuator ranges and tendon positions interactively
    Calibrate {
        /// Calibration file (overrides `calibration_path`)
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Drive a simulated hand
        #[arg(long)]
        simulate: bool,
    },
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = NodeConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            bind,
            calibration,
            simulate,
        } => {
            if let Some(addr) = bind {
                config.link = config.link.with_addr(addr);
            }
            config.calibration_path = calibration.or(config.calibration_path);
            config.simulate |= simulate;
            runtime()?.block_on(commands::serve(config))
        }
        Commands::SendTestPattern {
            connect,
            rate_hz,
            period_secs,
            duration_secs,
        } => {
            if let Some(addr) = connect {
                config.link = config.link.with_addr(addr);
            }
            let period = Duration::try_from_secs_f64(period_secs)
                .context("period must be a non-negative number of seconds")?;
            let args = commands::PatternArgs {
                rate_hz,
                period,
                duration: Duration::from_secs(duration_secs),
            };
            runtime()?.block_on(commands::send_test_pattern(config, args))
        }
        Commands::ShowCalibration { calibration, json } => {
            config.calibration_path = calibration.or(config.calibration_path);
            commands::show_calibration(&config, json)
        }
        Commands::Calibrate {
            calibration,
            simulate,
        } => {
            config.calibration_path = calibration.or(config.calibration_path);
            config.simulate |= simulate;
            commands::calibrate(&config)
        }
    }
}
