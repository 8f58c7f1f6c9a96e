//! Command-line interface.
//!
//! Inspection and maintenance tooling over an mdmkv table.

pub mod commands;

use crate::core::config::{Config, ConfigOverrides};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;

/// Config file read when `--config` is not given, if present.
pub const DEFAULT_CONFIG_PATH: &str = "mdmkv.toml";

/// mdmkv - MDM enrollment, command queue, and push credential storage.
#[derive(Parser, Debug)]
#[command(name = "mdmkv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Data directory for the file backend.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Table name.
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Storage backend (memory, file).
    #[arg(long, global = true)]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Create the data directory and open the table.
    Init(commands::InitArgs),
    /// Inspect stored records.
    Inspect(commands::InspectArgs),
    /// Push certificate operations.
    PushCert(commands::PushCertArgs),
    /// Queue a command for one or more enrollments.
    Enqueue(commands::EnqueueArgs),
    /// Snapshot the file backend and truncate its log.
    Compact(commands::CompactArgs),
}

impl Cli {
    /// Overrides carried by global flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            data_dir: self.data_dir.clone(),
            table_name: self.table.clone(),
            backend: self.backend.clone(),
        }
    }

    /// Load the config file (or defaults), apply overrides, and validate.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match self.config.as_deref() {
            Some(path) => Config::from_file(Path::new(path))
                .with_context(|| format!("failed to load config from {path}"))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Config::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Config::default(),
        };
        config.apply_overrides(&self.overrides());
        config.validate()?;
        Ok(config)
    }
}

/// Initialize the tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over the configured level.
#[cfg(feature = "telemetry")]
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_level: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_become_overrides() {
        let cli = Cli::parse_from([
            "mdmkv",
            "--backend",
            "file",
            "--data-dir",
            "/tmp/x",
            "inspect",
            "stats",
        ]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.storage.backend, "file");
        assert_eq!(config.storage.data_dir, "/tmp/x");
    }

    #[test]
    fn invalid_override_fails_validation() {
        let cli = Cli::parse_from(["mdmkv", "--log-level", "loud", "compact"]);
        assert!(cli.load_config().is_err());
    }
}
