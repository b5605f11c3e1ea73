//! Error types for migration file loading and configuration.

use std::path::PathBuf;

use nsmigrate_core::NamespaceError;
use thiserror::Error;

/// Errors that can occur while reading migration files from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A directory or file could not be read or written.
    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two files provide the same direction for the same version.
    #[error(
        "duplicate {direction} script for {namespace} version {version}: '{}' and '{}'",
        .first.display(),
        .second.display()
    )]
    DuplicateVersion {
        namespace: String,
        version: i64,
        direction: nsmigrate_core::Direction,
        first: PathBuf,
        second: PathBuf,
    },

    /// Namespace name cannot be used as a directory.
    #[error(transparent)]
    InvalidNamespace(#[from] NamespaceError),

    /// Description for a new migration is empty or contains unsupported characters.
    #[error("invalid migration description '{0}': use letters, digits, spaces, '-' or '_'")]
    InvalidDescription(String),
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| LoadError::Io { path, source }
    }
}

/// Errors that can occur while loading or saving a [`MigrateConfig`](crate::MigrateConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A module listed in the configuration is not a valid namespace.
    #[error("invalid module in configuration: {0}")]
    InvalidModule(#[from] NamespaceError),

    /// Lock polling interval must be positive.
    #[error("lock.poll_interval_ms must be greater than zero")]
    InvalidPollInterval,
}

/// Convenience alias for results with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
