//! Bitbucket git credential helper
//!
//! Single-binary git credential helper that:
//! 1. Reads the operation from the command line and `key=value` parameters
//!    from stdin
//! 2. Keeps one credential file per Bitbucket user/workspace
//! 3. Issues or refreshes the OAuth token through the consumer's client
//!    credentials
//! 4. Hands the access token back to git as the password of `x-token-auth`
//!
//! Configure it in git with:
//! `git config credential.https://bitbucket.org.helper bitbucket`

mod config;
mod helper;
mod logging;
mod protocol;

use std::time::Duration;

use anyhow::{Context, Result};
use bitbucket_auth::{APP_NAME, CredentialStore, TokenClient, USER_AGENT};
use clap::Parser;
use tracing::{error, info, warn};

use crate::config::{Cli, Config};
use crate::helper::{Helper, Operation};

/// Token endpoint requests give up after this long
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli).context("failed to load configuration")?;
    logging::init(&config.log)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting {APP_NAME}");

    let result = run(&cli, &config).await;
    if let Err(e) = &result {
        let message = format!("{e:#}");
        error!(error = %message, "operation failed");
    }
    result
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    let store = CredentialStore::open(config.store_location.clone())
        .await
        .with_context(|| {
            format!(
                "failed to create the storage location {}",
                config.store_location.display()
            )
        })?;
    info!(
        store_location = %config.store_location.display(),
        renew_before = %humantime::format_duration(config.renew_before),
        "configuration loaded"
    );

    let parameters = protocol::read_parameters(std::io::stdin().lock())
        .context("cannot read parameters from stdin")?;

    let name = cli.operation.as_deref().unwrap_or_default();
    let Some(operation) = Operation::parse(name) else {
        warn!(operation = name, "unsupported operation, ignoring");
        return Ok(());
    };
    info!(?operation, "running operation");

    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let helper = Helper::new(store, TokenClient::bitbucket(http), config.renew_before)
        .with_workspace(config.workspace.clone());

    helper
        .run(operation, &parameters, std::io::stdout().lock())
        .await
        .with_context(|| format!("{} failed", name.to_ascii_lowercase()))
}
