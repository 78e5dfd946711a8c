//! Home Assistant Rust server
//!
//! Loads `configuration.yaml` and the stored config entries from the
//! configuration directory, sets up every Pronote account and runs until
//! Ctrl-C.

mod accounts;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use ha_config::{load_yaml, CoreConfig};
use ha_helpers::HomeAssistant;
use ha_pronote::{PronoteIntegration, EVENT_TYPE};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::accounts::{accounts_from_yaml, import_account};

const DEFAULT_CONFIG_DIR: &str = "config";

fn config_dir_from_args(mut args: impl Iterator<Item = String>) -> Result<PathBuf> {
    let mut config_dir = PathBuf::from(DEFAULT_CONFIG_DIR);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => match args.next() {
                Some(dir) => config_dir = PathBuf::from(dir),
                None => bail!("{} expects a directory", arg),
            },
            other => bail!("unknown argument {}", other),
        }
    }
    Ok(config_dir)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = config_dir_from_args(std::env::args().skip(1))?;
    info!("Starting Home Assistant (Rust) in {}", config_dir.display());

    let yaml = load_yaml(config_dir.clone(), "configuration.yaml")?;
    let core = CoreConfig::from_yaml(&yaml)?;
    let hass = Arc::new(HomeAssistant::new(&config_dir, core)?);
    hass.config_entries.load().await?;

    let mut imported = Vec::new();
    for account in accounts_from_yaml(&yaml)? {
        imported.push(import_account(&hass, &config_dir, account).await?);
    }
    let Some(first) = imported.first() else {
        bail!("no pronote account in configuration.yaml");
    };

    let integration = Arc::new(PronoteIntegration::new(first.connector.clone()));
    for account in &imported {
        integration.set_entry_connector(&account.entry_id, account.connector.clone());
    }
    hass.register_integration(integration);

    let mut events = hass.bus.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.event_type == EVENT_TYPE => {
                    info!("{}: {}", EVENT_TYPE, event.data)
                }
                Ok(event) => debug!("{}: {}", event.event_type, event.data),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    for (entry_id, state) in hass.setup_all().await {
        info!("Entry {} is {:?}", entry_id, state);
    }
    info!(
        sensors = hass.states.domain_states("sensor").len(),
        calendars = hass.states.domain_states("calendar").len(),
        "Home Assistant is running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hass.stop().await;

    Ok(())
}
