//! Session CLI
//!
//! Command-line front end for the payroll API:
//! 1. Loads configuration (TOML + env overlays)
//! 2. Restores the session from the session file
//! 3. Runs one command through the session-aware client
//! 4. Prints the JSON result, or asks the user to log in again when the
//!    session could not be refreshed

mod command;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use api_client::{ApiClient, SessionEvent};
use session_auth::FileSessionStore;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::{Command, split_args};
use crate::config::Config;

/// Exit status when the user has to log in again.
const EXIT_REAUTHENTICATE: i32 = 2;

/// Filter used when neither `LOG_LEVEL` nor `RUST_LOG` is set.
const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries command output only
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (cli_config_path, words) = split_args(&args);
    let command = Command::parse(&words)?;

    let (config_path, explicit) = Config::resolve_path(cli_config_path.as_deref());
    let config = if explicit || config_path.exists() {
        info!(path = %config_path.display(), "loading configuration");
        Config::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        debug!("no config file, using defaults");
        Config::from_toml("").context("invalid configuration from environment")?
    };

    info!(
        base_url = %config.client.base_url,
        session = %config.session.path.display(),
        timeout_secs = config.client.timeout_secs,
        "configuration loaded"
    );

    let store = FileSessionStore::load(config.session.path.clone())
        .await
        .with_context(|| format!("failed to load session from {}", config.session.path.display()))?;
    let client = ApiClient::new(config.client_config(), Arc::new(store))?;
    let mut events = client.subscribe();

    let result = command.run(&client, config.password.as_ref()).await;

    if let Some(reason) = reauthentication_reason(&mut events) {
        eprintln!("session expired ({reason}); run `session-cli login <email>` to sign in again");
        std::process::exit(EXIT_REAUTHENTICATE);
    }

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Drain session events, returning the reason if re-authentication was
/// requested.
fn reauthentication_reason(events: &mut Receiver<SessionEvent>) -> Option<String> {
    let mut reason = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::ReauthenticationRequired { reason: r } => reason = Some(r),
            SessionEvent::Refreshed => debug!("access token refreshed during command"),
        }
    }
    reason
}
