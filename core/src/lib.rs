//! Core migration types and namespace primitives.
//!
//! This crate defines the vocabulary shared by the rest of the workspace:
//!
//! - [`MigrationFile`]: one version of a namespace as found on disk, with
//!   its up and down scripts merged.
//! - [`MigrationRecord`]: one row of the `schema_migrations` table.
//! - [`NamespaceStatus`]: current version, pending count and dirty flag
//!   for a namespace.
//! - [`Direction`]: up or down, with the file suffix that selects it.
//!
//! Namespace names are checked with [`validate_namespace`] before they are
//! used as a directory name or a table key.
//!
//! # Example
//!
//! ```
//! use nsmigrate_core::*;
//!
//! let file = MigrationFile::new(CORE_NAMESPACE, 1, "create_users")
//!     .with_up("CREATE TABLE users (id INTEGER PRIMARY KEY);");
//! assert_eq!(file.script(Direction::Up).is_some(), true);
//! assert!(!file.is_reversible());
//! assert!(validate_namespace(&file.namespace).is_ok());
//! ```

mod types;
mod validate;

pub use types::*;
pub use validate::*;
