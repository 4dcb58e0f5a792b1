//! Runtime configuration resolved from global flags and the environment.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub const DB_ENV: &str = "EVENTFLOW_DB";
pub const LOG_ENV: &str = "EVENTFLOW_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Config {
    #[must_use]
    pub fn new(db_path: PathBuf, log_filter: String) -> Self {
        Self {
            db_path,
            log_filter,
        }
    }

    /// Installs the global tracing subscriber. Logs go to stderr so command
    /// output on stdout stays clean.
    ///
    /// # Errors
    /// Returns error if the filter does not parse or a subscriber is already set.
    pub fn init_logging(&self) -> Result<()> {
        let filter = EnvFilter::try_new(&self.log_filter)
            .with_context(|| format!("Invalid log filter '{}'", self.log_filter))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to install log subscriber")
    }
}
