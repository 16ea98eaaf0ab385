//! Configuration for the pool controller.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::controller::ControllerConfig;

/// Pool controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Cluster snapshot to run against in dry-run mode.
    pub snapshot_path: Option<PathBuf>,

    pub controller: ControllerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = ControllerConfig::default();

        let workers = parse_var("NODEPOOL_WORKERS")?.unwrap_or(defaults.workers);
        let settle_delay = parse_var("NODEPOOL_SETTLE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.settle_delay);
        let max_retries = parse_var("NODEPOOL_MAX_RETRIES")?.unwrap_or(defaults.max_retries);
        let drop_cooldown = parse_var("NODEPOOL_DROP_COOLDOWN_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.drop_cooldown);

        if workers == 0 {
            anyhow::bail!("NODEPOOL_WORKERS must be at least 1");
        }

        let log_level = std::env::var("NODEPOOL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let snapshot_path = std::env::var_os("NODEPOOL_SNAPSHOT").map(PathBuf::from);

        Ok(Self {
            log_level,
            snapshot_path,
            controller: ControllerConfig {
                workers,
                settle_delay,
                max_retries,
                drop_cooldown,
                ..defaults
            },
        })
    }
}

/// Parse an optional environment variable, failing on malformed values.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {name}")),
    }
}
