//! SQLite migration engine for namespaced SQL migrations.
//!
//! Each namespace (`core`, `billing`, ...) owns a directory of numbered
//! migration files and its own version sequence. All namespaces share one
//! `schema_migrations` table keyed by `(namespace, version)`.
//!
//! # Architecture
//!
//! - **`store`**: reads and writes version records ([`VersionStore`])
//! - **`lock`**: per-namespace lock row held for the duration of an
//!   operation ([`NamespaceLock`])
//! - **`migrator`**: applies and reverts one namespace ([`Migrator`])
//! - **`coordinator`**: runs `core` first, then modules, and reports status
//!   across every namespace
//!
//! # Quick start
//!
//! ```no_run
//! use nsmigrate_sqlite::Migrator;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("app.db").unwrap();
//! let migrator = Migrator::new(conn, "migrations");
//!
//! let report = migrator.migrate_all(&["billing", "search"]).unwrap();
//! println!("applied {} migrations", report.total_applied());
//!
//! for (namespace, status) in migrator.status().unwrap() {
//!     println!("{namespace}: v{} ({} pending)", status.current_version, status.pending_count);
//! }
//! ```
//!
//! # Crash recovery
//!
//! A version is marked dirty before its up-script runs and clean after it
//! commits. A namespace found dirty refuses to migrate or roll back until
//! the database has been checked by hand and [`Migrator::force`] records
//! the correct version.

mod coordinator;
mod error;
mod lock;
mod migrator;
mod schema;
mod store;

pub use coordinator::MigrateReport;
pub use error::{MigrateError, Phase, Result};
pub use lock::{LockOptions, NamespaceLock, lock_holder, release_lock, try_acquire};
pub use migrator::Migrator;
pub use schema::{LOCKS_TABLE, MIGRATIONS_TABLE, SCHEMA_SQL, table_exists};
pub use store::VersionStore;
