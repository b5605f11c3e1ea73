//! Per-namespace migration engine.
//!
//! [`Migrator`] applies pending versions of a namespace and reverts applied
//! ones, one transaction per version.
//!
//! # Apply
//!
//! For each pending version, ascending:
//!
//! 1. the version is recorded as dirty in autocommit mode, outside any
//!    transaction, so the marker survives a crash in the next step;
//! 2. the up-script runs in its own transaction, rolled back on failure;
//! 3. after commit the record is flipped to clean.
//!
//! A crash between 2 and 3 leaves the namespace dirty even though the
//! script committed. The namespace then refuses further work until an
//! operator checks it and calls [`Migrator::force`].
//!
//! # Rollback
//!
//! For each version to revert, descending, the down-script and the deletion
//! of the version record share one transaction. No dirty marker is written
//! before a down-script runs.
//!
//! # Example
//!
//! ```no_run
//! use nsmigrate_sqlite::Migrator;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("app.db").unwrap();
//! let migrator = Migrator::new(conn, "migrations");
//!
//! let applied = migrator.migrate_namespace("billing").unwrap();
//! println!("applied {applied} migrations, now at {}", migrator.version("billing").unwrap());
//!
//! migrator.rollback("billing", 1).unwrap();
//! ```

use std::path::PathBuf;

use nsmigrate_core::{Direction, MigrationFile, MigrationRecord, validate_namespace};
use nsmigrate_loader::MigrationLoader;
use rusqlite::{Connection, InterruptHandle, Transaction, TransactionBehavior};
use tracing::Span;

use crate::error::{MigrateError, Phase, Result};
use crate::lock::{self, LockOptions, NamespaceLock};
use crate::store::VersionStore;

/// Applies and reverts migrations for namespaces sharing one database.
///
/// Owns the connection; every operation borrows it for its duration. All
/// events are emitted with the migrator's span as parent (see
/// [`with_span`](Self::with_span)).
pub struct Migrator {
    conn: Connection,
    loader: MigrationLoader,
    lock_options: LockOptions,
    span: Span,
}

impl Migrator {
    /// Creates a migrator over `conn` reading files from `migrations_dir`.
    pub fn new(conn: Connection, migrations_dir: impl Into<PathBuf>) -> Self {
        let span = tracing::info_span!("migrator");
        let loader = MigrationLoader::new(migrations_dir).with_span(span.clone());
        Self {
            conn,
            loader,
            lock_options: LockOptions::default(),
            span,
        }
    }

    /// Sets the span all migrator and loader events are attached to.
    pub fn with_span(mut self, span: Span) -> Self {
        self.loader = self.loader.with_span(span.clone());
        self.span = span;
        self
    }

    /// Sets how long to wait for a namespace lock held elsewhere.
    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    pub fn loader(&self) -> &MigrationLoader {
        &self.loader
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the migrator and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Handle for cancelling the statement currently running on this
    /// migrator's connection from another thread.
    ///
    /// An interrupted script fails with [`MigrateError::ScriptExecution`];
    /// its transaction is rolled back and, for apply, the dirty marker stays.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    pub(crate) fn store(&self) -> VersionStore<'_> {
        VersionStore::new(&self.conn)
    }

    /// Applies every pending migration of `namespace` in ascending order.
    ///
    /// Returns the number of versions applied; `0` when nothing is pending.
    ///
    /// # Errors
    ///
    /// - [`MigrateError::DirtyState`] if the namespace has a crash marker.
    /// - [`MigrateError::LockTimeout`] if another process is migrating it.
    /// - [`MigrateError::ScriptExecution`] if an up-script fails; that
    ///   version stays marked dirty and later versions are not attempted.
    /// - [`MigrateError::MissingUpScript`] for a pending down-only version.
    pub fn migrate_namespace(&self, namespace: &str) -> Result<usize> {
        validate_namespace(namespace)?;
        self.store().ensure_schema()?;
        let _lock = self.lock(namespace)?;

        let current = self.clean_version(namespace)?;
        let pending: Vec<MigrationFile> = self
            .load(namespace)?
            .into_iter()
            .filter(|file| file.version > current)
            .collect();

        if pending.is_empty() {
            tracing::info!(parent: &self.span, namespace, current_version = current, "no pending migrations");
            return Ok(0);
        }

        tracing::info!(
            parent: &self.span,
            namespace,
            current_version = current,
            pending_count = pending.len(),
            "applying migrations"
        );

        for file in &pending {
            self.apply_unit(file)?;
            tracing::info!(
                parent: &self.span,
                namespace,
                version = file.version,
                description = %file.description,
                "applied migration"
            );
        }

        tracing::info!(parent: &self.span, namespace, "all migrations applied");
        Ok(pending.len())
    }

    /// Reverts up to `steps` versions of `namespace`, newest first.
    ///
    /// Returns the number of versions reverted.
    ///
    /// # Errors
    ///
    /// - [`MigrateError::DirtyState`] if the namespace has a crash marker.
    /// - [`MigrateError::MissingDownScript`] for a version without a
    ///   down-script; versions reverted earlier in the call stay reverted.
    /// - [`MigrateError::ScriptExecution`] if a down-script fails; its
    ///   record is left in place.
    pub fn rollback(&self, namespace: &str, steps: usize) -> Result<usize> {
        validate_namespace(namespace)?;
        self.store().ensure_schema()?;
        let _lock = self.lock(namespace)?;

        let current = self.clean_version(namespace)?;
        if current == 0 || steps == 0 {
            tracing::info!(parent: &self.span, namespace, "no migrations to roll back");
            return Ok(0);
        }

        let to_revert: Vec<MigrationFile> = self
            .load(namespace)?
            .into_iter()
            .rev()
            .filter(|file| file.version <= current)
            .take(steps)
            .collect();

        if to_revert.is_empty() {
            tracing::info!(parent: &self.span, namespace, "no migrations to roll back");
            return Ok(0);
        }

        tracing::info!(
            parent: &self.span,
            namespace,
            current_version = current,
            steps = to_revert.len(),
            "rolling back migrations"
        );

        for file in &to_revert {
            self.rollback_unit(file)?;
            tracing::info!(
                parent: &self.span,
                namespace,
                version = file.version,
                description = %file.description,
                "rolled back migration"
            );
        }

        Ok(to_revert.len())
    }

    /// Current version of `namespace`, `0` if nothing was applied.
    pub fn version(&self, namespace: &str) -> Result<i64> {
        self.current(namespace).map(|(version, _)| version)
    }

    /// Current version of `namespace` together with its dirty flag.
    ///
    /// Read-only: a database without the version table is at `(0, false)`.
    pub fn current(&self, namespace: &str) -> Result<(i64, bool)> {
        validate_namespace(namespace)?;
        let store = self.store();
        if !store.has_schema()? {
            return Ok((0, false));
        }
        store.current_version(namespace)
    }

    /// Every version record of `namespace`, ascending. Read-only.
    pub fn records(&self, namespace: &str) -> Result<Vec<MigrationRecord>> {
        validate_namespace(namespace)?;
        let store = self.store();
        if !store.has_schema()? {
            return Ok(Vec::new());
        }
        store.records(namespace)
    }

    /// Declares `namespace` to be cleanly at `version`.
    ///
    /// Records above `version` are removed and `version` is marked clean;
    /// `0` removes every record. No scripts run. Use after repairing the
    /// database by hand following a [`MigrateError::DirtyState`].
    pub fn force(&self, namespace: &str, version: i64) -> Result<()> {
        validate_namespace(namespace)?;
        self.store().ensure_schema()?;
        let _lock = self.lock(namespace)?;

        let (previous, dirty) = self.store().current_version(namespace)?;
        self.store().force(namespace, version)?;
        tracing::warn!(
            parent: &self.span,
            namespace,
            previous_version = previous,
            previously_dirty = dirty,
            version,
            "forced namespace version"
        );
        Ok(())
    }

    /// Removes a lock left behind by a process that died mid-migration.
    ///
    /// Returns `true` if a lock was held.
    pub fn release_lock(&self, namespace: &str) -> Result<bool> {
        validate_namespace(namespace)?;
        self.store().ensure_schema()?;
        let released = lock::release_lock(&self.conn, namespace)?;
        if released {
            tracing::warn!(parent: &self.span, namespace, "released migration lock by hand");
        }
        Ok(released)
    }

    fn lock(&self, namespace: &str) -> Result<NamespaceLock<'_>> {
        NamespaceLock::acquire(&self.conn, namespace, self.lock_options, &self.span)
    }

    pub(crate) fn load(&self, namespace: &str) -> Result<Vec<MigrationFile>> {
        self.loader
            .load(namespace)
            .map_err(|source| MigrateError::Load {
                namespace: namespace.to_string(),
                source,
            })
    }

    /// Reads the current version, refusing to continue if it is dirty.
    fn clean_version(&self, namespace: &str) -> Result<i64> {
        let (current, dirty) = self.store().current_version(namespace)?;
        if dirty {
            return Err(MigrateError::DirtyState {
                namespace: namespace.to_string(),
                version: current,
            });
        }
        Ok(current)
    }

    fn begin(&self, file: &MigrationFile) -> Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate).map_err(
            MigrateError::store(&file.namespace, Some(file.version), Phase::Begin),
        )
    }

    fn apply_unit(&self, file: &MigrationFile) -> Result<()> {
        let namespace = file.namespace.as_str();
        let Some(sql) = file.script(Direction::Up) else {
            return Err(MigrateError::MissingUpScript {
                namespace: namespace.to_string(),
                version: file.version,
            });
        };

        self.store().set_version(namespace, file.version, true)?;

        let tx = self.begin(file)?;
        if let Err(source) = tx.execute_batch(sql) {
            self.abort(tx, file);
            return Err(MigrateError::ScriptExecution {
                namespace: namespace.to_string(),
                version: file.version,
                direction: Direction::Up,
                source,
            });
        }
        tx.commit()
            .map_err(MigrateError::store(namespace, Some(file.version), Phase::Commit))?;

        self.store().set_version(namespace, file.version, false)
    }

    fn rollback_unit(&self, file: &MigrationFile) -> Result<()> {
        let namespace = file.namespace.as_str();
        let Some(sql) = file.script(Direction::Down) else {
            return Err(MigrateError::MissingDownScript {
                namespace: namespace.to_string(),
                version: file.version,
            });
        };

        let tx = self.begin(file)?;
        if let Err(source) = tx.execute_batch(sql) {
            self.abort(tx, file);
            return Err(MigrateError::ScriptExecution {
                namespace: namespace.to_string(),
                version: file.version,
                direction: Direction::Down,
                source,
            });
        }
        // Dropping `tx` on error rolls the script back with the failed delete.
        VersionStore::new(&tx).delete_version(namespace, file.version)?;
        tx.commit()
            .map_err(MigrateError::store(namespace, Some(file.version), Phase::Commit))
    }

    /// Rolls back a unit whose script failed. A rollback failure is only
    /// logged; the script error is what the caller gets.
    fn abort(&self, tx: Transaction<'_>, file: &MigrationFile) {
        if let Err(err) = tx.rollback() {
            tracing::warn!(
                parent: &self.span,
                namespace = %file.namespace,
                version = file.version,
                error = %err,
                "failed to roll back migration transaction"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn migrator_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Migrator) {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("core");
        fs::create_dir_all(&dir).unwrap();
        for (name, sql) in files {
            fs::write(dir.join(name), sql).unwrap();
        }
        let migrator = Migrator::new(Connection::open_in_memory().unwrap(), root.path());
        (root, migrator)
    }

    #[test]
    fn test_blank_up_script_counts_as_missing() {
        let (_root, migrator) = migrator_with(&[("000001_blank.up.sql", "  \n\t\n")]);
        let err = migrator.migrate_namespace("core").unwrap_err();
        assert!(matches!(err, MigrateError::MissingUpScript { version: 1, .. }));
        assert_eq!(migrator.current("core").unwrap(), (0, false));
    }

    #[test]
    fn test_blank_down_script_counts_as_missing() {
        let (_root, migrator) = migrator_with(&[
            ("000001_t.up.sql", "CREATE TABLE t (id INTEGER);"),
            ("000001_t.down.sql", "\n"),
        ]);
        migrator.migrate_namespace("core").unwrap();
        let err = migrator.rollback("core", 1).unwrap_err();
        assert!(matches!(err, MigrateError::MissingDownScript { version: 1, .. }));
        assert_eq!(migrator.version("core").unwrap(), 1);
    }

    #[test]
    fn test_reads_leave_fresh_database_untouched() {
        let (_root, migrator) = migrator_with(&[("000001_t.up.sql", "CREATE TABLE t (id INTEGER);")]);
        assert_eq!(migrator.version("core").unwrap(), 0);
        assert_eq!(migrator.current("core").unwrap(), (0, false));
        assert!(migrator.records("core").unwrap().is_empty());
        assert!(!crate::schema::table_exists(migrator.connection(), "schema_migrations").unwrap());
        assert!(!crate::schema::table_exists(migrator.connection(), "schema_migration_locks").unwrap());
    }

    #[test]
    fn test_force_to_zero_forgets_namespace() {
        let (_root, migrator) = migrator_with(&[("000001_t.up.sql", "CREATE TABLE t (id INTEGER);")]);
        migrator.migrate_namespace("core").unwrap();
        migrator.force("core", 0).unwrap();
        assert!(migrator.records("core").unwrap().is_empty());
    }

    #[test]
    fn test_into_connection_keeps_state() {
        let (_root, migrator) = migrator_with(&[("000001_t.up.sql", "CREATE TABLE t (id INTEGER);")]);
        migrator.migrate_namespace("core").unwrap();
        let conn = migrator.into_connection();
        assert_eq!(VersionStore::new(&conn).current_version("core").unwrap(), (1, false));
    }
}
