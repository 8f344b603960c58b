//! safety-link
//!
//! Pairs this machine with a safety module: connects over Bluetooth LE, runs
//! the authentication handshake and reports the outcome.

mod ble_link;
mod cli;
mod config;

use anyhow::{Context, Result};
use ble_link::BluerLink;
use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use safety_link_protocol::codec::commands;
use safety_link_protocol::{HandshakeSession, PairingOutcome, SessionEvent};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    cli::init_logging(&cli).context("Failed to initialize logging")?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path).context("Failed to load configuration")?;
    debug!("Configuration loaded from {}", config_path.display());

    match cli.command {
        Command::Pair { address, timeout } => pair(config, &address, timeout).await,
        Command::Disconnect { address } => {
            disconnect(&config, &address).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { save } => {
            show_config(&config, &config_path, save)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn pair(mut config: Config, address: &str, timeout: Option<u64>) -> Result<ExitCode> {
    if let Some(secs) = timeout {
        config.session = config.session.with_state_timeout(Duration::from_secs(secs));
    }
    let key = config.pre_shared_key()?;

    let link = Arc::new(
        BluerLink::connect(&config.bluetooth, address)
            .await
            .context("Failed to connect to safety module")?,
    );

    let mut session = HandshakeSession::new(link.clone(), key, config.session.clone());
    let mut events = session
        .take_events()
        .context("Session events already taken")?;

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                SessionEvent::Started { peer } => {
                    println!("Confirm pairing on the safety module ({})", peer)
                }
                SessionEvent::WriteFailed { message, .. } => {
                    if let Some(command) = event.command() {
                        warn!("{}: {}", commands::write_failure_message(command), message);
                    }
                }
                SessionEvent::LinkError { message } => warn!("Link error: {}", message),
                other => debug!("{:?}", other),
            }
            if event.is_completed() {
                break;
            }
        }
    });

    let outcome = session.run().await;
    if let Err(e) = reporter.await {
        warn!("Event reporter stopped: {}", e);
    }

    if let PairingOutcome::Failed(reason) = outcome {
        eprintln!("Pairing failed ({}): {}", reason.code(), reason.user_message());
        if let Err(e) = link.disconnect().await {
            warn!("{:#}", e);
        }
    }

    if outcome.is_authenticated() {
        println!("Paired with {}", address);
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn disconnect(config: &Config, address: &str) -> Result<()> {
    let device = ble_link::find_device(&config.bluetooth, address).await?;
    device
        .disconnect()
        .await
        .with_context(|| format!("Failed to disconnect from {}", address))?;
    info!("Disconnected from {}", address);
    Ok(())
}

fn show_config(config: &Config, path: &Path, save: bool) -> Result<()> {
    print!("{}", config.to_toml()?);

    if save {
        config.save(path)?;
        info!("Configuration saved to {}", path.display());
    }
    Ok(())
}
