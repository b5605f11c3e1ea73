//! Run configuration for the migration manager.
//!
//! # Example YAML
//!
//! ```yaml
//! database: data/app.db
//! migrations_dir: migrations
//! modules:
//!   - auth
//!   - billing
//! lock:
//!   timeout_secs: 60
//!   poll_interval_ms: 100
//! logging:
//!   level: info
//!   format: text
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nsmigrate_core::validate_namespace;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How long to wait for a namespace lock held by another process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Give up after this many seconds.
    pub timeout_secs: u64,
    /// Delay between acquisition attempts.
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            poll_interval_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings applied by the CLI when it installs a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `nsmigrate_sqlite=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Top-level migration run configuration.
///
/// # Examples
///
/// ```no_run
/// use nsmigrate_loader::MigrateConfig;
///
/// let config = MigrateConfig::load("nsmigrate.yml").unwrap();
/// println!("{} modules enabled", config.modules.len());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Root directory with one subdirectory per namespace.
    pub migrations_dir: PathBuf,
    /// Module namespaces migrated after `core`, in order.
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MigrateConfig {
    /// Creates a configuration with default lock and logging settings.
    pub fn new(database: impl Into<PathBuf>, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            migrations_dir: migrations_dir.into(),
            modules: Vec::new(),
            lock: LockConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read,
    /// [`ConfigError::YamlError`] if parsing fails, or a validation error
    /// from [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks module names and lock settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for module in &self.modules {
            validate_namespace(module)?;
        }
        if self.lock.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = "database: app.db\nmigrations_dir: migrations\n";
        let config: MigrateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database, PathBuf::from("app.db"));
        assert!(config.modules.is_empty());
        assert_eq!(config.lock, LockConfig::default());
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_lock_section() {
        let yaml = "database: a.db\nmigrations_dir: m\nlock:\n  timeout_secs: 5\n";
        let config: MigrateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lock.timeout(), Duration::from_secs(5));
        assert_eq!(config.lock.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_validate_rejects_bad_module() {
        let mut config = MigrateConfig::new("a.db", "m");
        config.modules = vec!["auth".into(), "bad/module".into()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidModule(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = MigrateConfig::new("a.db", "m");
        config.lock.poll_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPollInterval)
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nsmigrate.yml");

        let mut config = MigrateConfig::new("data/app.db", "migrations");
        config.modules = vec!["auth".into(), "billing".into()];
        config.logging.format = LogFormat::Json;
        config.save(&path).unwrap();

        let loaded = MigrateConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
