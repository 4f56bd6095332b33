//! Log sink setup
//!
//! stdout carries the credential-helper protocol, so logs never go there.
//! Without a destination no subscriber is installed and every `tracing`
//! call in the libraries is a no-op.

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogDestination;

/// Build the writer for `destination`, or `None` when logging is off.
///
/// File destinations are opened in append mode; missing parent folders
/// are created.
pub fn make_writer(destination: &LogDestination) -> Result<Option<BoxMakeWriter>> {
    let writer = match destination {
        LogDestination::None => return Ok(None),
        LogDestination::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogDestination::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log folder {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Arc::new(file))
        }
    };
    Ok(Some(writer))
}

/// Install the global subscriber: JSON lines, filtered by `LOG_LEVEL` or
/// `RUST_LOG` (default `info`).
pub fn init(destination: &LogDestination) -> Result<()> {
    let Some(writer) = make_writer(destination)? else {
        return Ok(());
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(())
}
