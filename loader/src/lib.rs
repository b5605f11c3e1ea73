//! Filesystem loading of namespaced SQL migrations.
//!
//! This crate turns a directory tree of `NNNNNN_description.up.sql` /
//! `.down.sql` files into ordered [`MigrationFile`](nsmigrate_core::MigrationFile)
//! lists, one per namespace, and holds the YAML run configuration.
//!
//! # Quick start
//!
//! ```no_run
//! use nsmigrate_loader::{MigrateConfig, MigrationLoader};
//!
//! let config = MigrateConfig::load("nsmigrate.yml").unwrap();
//! let loader = MigrationLoader::new(&config.migrations_dir);
//!
//! for namespace in loader.namespaces().unwrap() {
//!     let files = loader.load(&namespace).unwrap();
//!     println!("{namespace}: {} migrations", files.len());
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::{LockConfig, LogFormat, LoggingConfig, MigrateConfig};
pub use error::{ConfigError, LoadError, Result};
pub use loader::{MigrationLoader, NewMigration, ParsedFilename, parse_filename};
