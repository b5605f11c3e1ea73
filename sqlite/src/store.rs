//! Persisted per-namespace version state.
//!
//! [`VersionStore`] reads and writes the `schema_migrations` table. It
//! borrows a connection, so it can be pointed at a plain connection for
//! autocommit writes or at an open transaction (through `Deref`) to make a
//! write part of that transaction.

use chrono::{DateTime, NaiveDateTime, Utc};
use nsmigrate_core::MigrationRecord;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{MigrateError, Phase, Result};
use crate::schema::{MIGRATIONS_TABLE, SCHEMA_SQL, TIMESTAMP_FORMAT, table_exists};

/// Reads and writes version records.
///
/// # Examples
///
/// ```
/// use nsmigrate_sqlite::VersionStore;
/// use rusqlite::Connection;
///
/// let conn = Connection::open_in_memory().unwrap();
/// let store = VersionStore::new(&conn);
/// store.ensure_schema().unwrap();
///
/// assert_eq!(store.current_version("core").unwrap(), (0, false));
/// store.set_version("core", 1, false).unwrap();
/// assert_eq!(store.current_version("core").unwrap(), (1, false));
/// ```
pub struct VersionStore<'c> {
    conn: &'c Connection,
}

impl<'c> VersionStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Creates the version and lock tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::SchemaInit`] if the DDL cannot be executed.
    pub fn ensure_schema(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction().map_err(MigrateError::SchemaInit)?;
        tx.execute_batch(SCHEMA_SQL).map_err(MigrateError::SchemaInit)?;
        tx.commit().map_err(MigrateError::SchemaInit)?;
        Ok(())
    }

    /// Returns the highest recorded version of `namespace` and its dirty flag.
    ///
    /// A namespace with no records is at `(0, false)`.
    pub fn current_version(&self, namespace: &str) -> Result<(i64, bool)> {
        let current = self
            .conn
            .query_row(
                "SELECT version, dirty FROM schema_migrations
                 WHERE namespace = ?1
                 ORDER BY version DESC
                 LIMIT 1",
                [namespace],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()
            .map_err(MigrateError::store(namespace, None, Phase::ReadVersion))?;
        Ok(current.unwrap_or((0, false)))
    }

    /// Records `version` for `namespace`, overwriting `dirty` and
    /// `applied_at` if the row already exists.
    pub fn set_version(&self, namespace: &str, version: i64, dirty: bool) -> Result<()> {
        let phase = if dirty { Phase::MarkDirty } else { Phase::MarkClean };
        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        self.conn
            .execute(
                "INSERT INTO schema_migrations (namespace, version, dirty, applied_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (namespace, version)
                 DO UPDATE SET dirty = excluded.dirty, applied_at = excluded.applied_at",
                params![namespace, version, dirty, now],
            )
            .map_err(MigrateError::store(namespace, Some(version), phase))?;
        Ok(())
    }

    /// Removes the record for `version`. Missing records are ignored.
    pub fn delete_version(&self, namespace: &str, version: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM schema_migrations WHERE namespace = ?1 AND version = ?2",
                params![namespace, version],
            )
            .map_err(MigrateError::store(namespace, Some(version), Phase::DeleteVersion))?;
        Ok(())
    }

    /// All records of `namespace`, ascending by version.
    pub fn records(&self, namespace: &str) -> Result<Vec<MigrationRecord>> {
        let wrap = || MigrateError::store(namespace, None, Phase::ListRecords);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT namespace, version, dirty, applied_at FROM schema_migrations
                 WHERE namespace = ?1
                 ORDER BY version ASC",
            )
            .map_err(wrap())?;

        let records = stmt
            .query_map([namespace], |row| {
                let applied_at: Option<String> = row.get(3)?;
                Ok(MigrationRecord {
                    namespace: row.get(0)?,
                    version: row.get(1)?,
                    dirty: row.get(2)?,
                    applied_at: parse_timestamp(3, applied_at.as_deref())?,
                })
            })
            .map_err(wrap())?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(wrap())?;
        Ok(records)
    }

    /// Whether the version table exists yet. Read-only.
    pub fn has_schema(&self) -> Result<bool> {
        table_exists(self.conn, MIGRATIONS_TABLE).map_err(MigrateError::Inspect)
    }

    /// Distinct namespaces with at least one record, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT namespace FROM schema_migrations ORDER BY namespace")
            .map_err(MigrateError::Inspect)?;
        let namespaces = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(MigrateError::Inspect)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(MigrateError::Inspect)?;
        Ok(namespaces)
    }

    /// Operator repair: drops every record above `version` and records
    /// `version` as clean. `version == 0` clears the namespace entirely.
    ///
    /// Runs in one transaction.
    pub fn force(&self, namespace: &str, version: i64) -> Result<()> {
        let wrap = || MigrateError::store(namespace, Some(version), Phase::Force);
        let tx = self.conn.unchecked_transaction().map_err(wrap())?;
        tx.execute(
            "DELETE FROM schema_migrations WHERE namespace = ?1 AND version > ?2",
            params![namespace, version],
        )
        .map_err(wrap())?;
        if version > 0 {
            VersionStore::new(&tx).set_version(namespace, version, false)?;
        }
        tx.commit().map_err(wrap())?;
        Ok(())
    }
}

/// Parses `applied_at`, accepting both what [`VersionStore::set_version`]
/// writes and SQLite's `CURRENT_TIMESTAMP` layout.
fn parse_timestamp(column: usize, value: Option<&str>) -> rusqlite::Result<DateTime<Utc>> {
    let Some(value) = value else {
        return Ok(DateTime::<Utc>::default());
    };
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}
