//! Command Line and Logging
//!
//! Argument parsing for the `safety-link` tool and tracing setup.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Safety module pairing tool
#[derive(Parser, Debug)]
#[command(name = "safety-link")]
#[command(about = "Pair with a safety module over Bluetooth LE", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON structured logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Config file (defaults to ~/.config/safety-link/config.toml)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a safety module and run the pairing handshake
    Pair {
        /// Device address (e.g. C4:7C:8D:6A:12:34)
        address: String,

        /// Per-step timeout in seconds (overrides the config)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Disconnect from a safety module
    Disconnect {
        /// Device address
        address: String,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Initialize logging based on CLI configuration
pub fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli.log_level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            cli.log_level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.as_str()))
        .context("Failed to create log filter")?;

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    debug!(
        "Logging initialized: level={}, json={}",
        log_level, cli.json_logs
    );

    Ok(())
}
