//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! clap handles the first two; the optional TOML file (`--config` or
//! `CONFIG_PATH`) fills whatever they leave unset.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bitbucket_auth::{APP_NAME, DEFAULT_RENEW_BEFORE};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use serde::Deserialize;

/// Command line of the credential helper.
///
/// git runs it as `git-credential-bitbucket [options] <get|store|erase>`.
#[derive(Debug, Default, Parser)]
#[command(name = APP_NAME, version, about = "git credential helper for Bitbucket OAuth consumers")]
pub struct Cli {
    /// Folder where the credential files are stored
    #[arg(long, env = "STORE_LOCATION")]
    pub store_location: Option<PathBuf>,

    /// Log destination: a file path, or "stderr". Default: no logs
    #[arg(long = "log", env = "LOG_DESTINATION")]
    pub log: Option<String>,

    /// Use the credentials of the given workspace
    #[arg(long, env = "WORKSPACE")]
    pub workspace: Option<String>,

    /// How long before expiry the token gets renewed (e.g. "10m")
    #[arg(long = "renew", env = "RENEW_BEFORE", value_parser = humantime::parse_duration)]
    pub renew_before: Option<Duration>,

    /// Optional TOML config file
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Log to ./log/git-credential-bitbucket.log when no destination is set.
    /// `DEBUG` is false only for empty, 0, n, no, f, false or off
    #[arg(
        long,
        env = "DEBUG",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub debug: bool,

    /// Credential helper operation: get, store or erase
    pub operation: Option<String>,
}

/// Optional config file contents
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub store_location: Option<PathBuf>,
    #[serde(default)]
    pub workspace: Option<String>,
    /// humantime duration, e.g. "15m"
    #[serde(default)]
    pub renew_before: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            common::Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Where logs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    None,
    Stderr,
    File(PathBuf),
}

impl LogDestination {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "" => LogDestination::None,
            v if v.eq_ignore_ascii_case("stderr") => LogDestination::Stderr,
            v => LogDestination::File(PathBuf::from(v)),
        }
    }
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_location: PathBuf,
    pub renew_before: Duration,
    pub workspace: Option<String>,
    pub log: LogDestination,
}

impl Config {
    /// Resolve the configuration from the command line, loading the config
    /// file it points at, if any.
    pub fn load(cli: &Cli) -> common::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file, default_store_location)
    }

    /// Merge CLI/env values over the file, then over the defaults.
    pub fn merge(
        cli: &Cli,
        file: FileConfig,
        default_store: impl FnOnce() -> common::Result<PathBuf>,
    ) -> common::Result<Self> {
        let store_location = match cli.store_location.clone().or(file.store_location) {
            Some(path) => path,
            None => default_store()?,
        };
        if store_location.as_os_str().is_empty() {
            return Err(common::Error::Config(
                "store_location must not be empty".into(),
            ));
        }

        let renew_before = match (cli.renew_before, file.renew_before) {
            (Some(duration), _) => duration,
            (None, Some(text)) => humantime::parse_duration(&text).map_err(|e| {
                common::Error::Config(format!("invalid renew_before {text:?}: {e}"))
            })?,
            (None, None) => DEFAULT_RENEW_BEFORE,
        };

        let workspace = cli
            .workspace
            .clone()
            .or(file.workspace)
            .filter(|w| !w.is_empty());

        let log = match cli.log.as_deref().or(file.log.as_deref()) {
            Some(value) => LogDestination::parse(value),
            None if cli.debug => {
                LogDestination::File(Path::new(".").join("log").join(format!("{APP_NAME}.log")))
            }
            None => LogDestination::None,
        };

        Ok(Self {
            store_location,
            renew_before,
            workspace,
            log,
        })
    }
}

/// `$XDG_DATA_HOME/git-credential-bitbucket`, or the platform data directory.
fn default_store_location() -> common::Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| {
            common::Error::Config(
                "cannot determine the user data directory, set --store-location".into(),
            )
        })
}
