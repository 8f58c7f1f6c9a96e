//! Configuration parsing and validation.
//!
//! Configuration is loaded from a TOML file with CLI overrides. Sections map
//! onto the storage backend, the certificate-authorization policy, request
//! deadlines, and logging.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Certificate-authorization policy.
    #[serde(default)]
    pub cert_auth: CertAuthConfig,

    /// Per-request limits.
    #[serde(default)]
    pub requests: RequestConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: "memory" or "file".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Logical table name (used in logs and as the file backend's subdirectory).
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Data directory for the file backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Physically delete completed and invalidated commands instead of
    /// retaining them as `QueueDone` / `QueueInactive` rows.
    #[serde(default)]
    pub delete_commands: bool,

    /// Log compaction for the file backend.
    #[serde(default)]
    pub compaction: CompactionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            table_name: default_table_name(),
            data_dir: default_data_dir(),
            delete_commands: false,
            compaction: CompactionConfig::default(),
        }
    }
}

/// File backend compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Snapshot automatically once the log grows past the threshold.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of logged mutations between snapshots.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_log_entries: default_max_log_entries(),
        }
    }
}

/// Certificate-authorization policy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertAuthConfig {
    /// Associate a certificate hash with an enrollment that has none yet
    /// (enrollments that predate certificate tracking).
    #[serde(default)]
    pub allow_retroactive: bool,

    /// Allow one certificate hash to be bound to more than one enrollment.
    #[serde(default)]
    pub allow_duplicates: bool,
}

/// Per-request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Default deadline for a request in milliseconds. Zero disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RequestConfig {
    /// The configured timeout, if enabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_backend() -> String {
    "memory".to_string()
}

fn default_table_name() -> String {
    "nanomdm".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_log_entries() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration, defaults included, as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        if let Some(ref table_name) = overrides.table_name {
            self.storage.table_name = table_name.clone();
        }
        if let Some(ref backend) = overrides.backend {
            self.storage.backend = backend.clone();
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_storage()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_storage(&self) -> Result<()> {
        if self.storage.backend != "memory" && self.storage.backend != "file" {
            anyhow::bail!(
                "storage.backend must be 'memory' or 'file', got: {}",
                self.storage.backend
            );
        }

        if self.storage.table_name.trim().is_empty() {
            anyhow::bail!("storage.table_name must not be empty");
        }

        if self.storage.backend == "file" && self.storage.data_dir.trim().is_empty() {
            anyhow::bail!("storage.data_dir required for the file backend");
        }

        if self.storage.compaction.max_log_entries == 0 {
            anyhow::bail!("storage.compaction.max_log_entries must be > 0");
        }

        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override the file backend data directory.
    pub data_dir: Option<String>,
    /// Override the table name.
    pub table_name: Option<String>,
    /// Override the backend.
    pub backend: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.table_name, "nanomdm");
        assert!(!config.storage.delete_commands);
        assert_eq!(config.requests.timeout(), Some(Duration::from_millis(5_000)));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = Config::from_toml("[requests]\ntimeout_ms = 0\n").unwrap();
        assert!(config.requests.timeout().is_none());
    }

    #[test]
    fn overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            log_level: Some("debug".into()),
            data_dir: Some("/var/lib/mdm".into()),
            table_name: Some("mdm-prod".into()),
            backend: Some("file".into()),
        });
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.storage.data_dir, "/var/lib/mdm");
        assert_eq!(config.storage.table_name, "mdm-prod");
        assert_eq!(config.storage.backend, "file");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn generated_toml_parses_back() {
        let rendered = Config::default().to_toml_string().unwrap();
        let parsed = Config::from_toml(&rendered).unwrap();
        assert_eq!(parsed.storage.table_name, "nanomdm");
    }
}
