//! Tables owned by the migration manager.
//!
//! - `schema_migrations`: one row per applied (or in-flight) version per
//!   namespace. The highest version of a namespace is its current version.
//! - `schema_migration_locks`: one row per namespace currently being
//!   migrated, used as a cross-process advisory lock.
//!
//! Both are created with `IF NOT EXISTS`, so [`SCHEMA_SQL`] is safe to run on
//! every startup.

use rusqlite::Connection;

/// Version tracking table name.
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// Namespace lock table name.
pub const LOCKS_TABLE: &str = "schema_migration_locks";

/// DDL for both tables and the namespace index.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER     NOT NULL,
    namespace   VARCHAR(50) NOT NULL CHECK (length(namespace) BETWEEN 1 AND 50),
    dirty       BOOLEAN     NOT NULL DEFAULT 0,
    applied_at  TIMESTAMP   DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (namespace, version)
);

CREATE INDEX IF NOT EXISTS idx_schema_migrations_namespace
    ON schema_migrations(namespace);

CREATE TABLE IF NOT EXISTS schema_migration_locks (
    namespace   VARCHAR(50) PRIMARY KEY,
    owner       TEXT        NOT NULL,
    acquired_at TIMESTAMP   NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Timestamp layout written to `applied_at` and `acquired_at`.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Checks whether a table exists in the connected database.
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_sql_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        assert!(table_exists(&conn, MIGRATIONS_TABLE).unwrap());
        assert!(table_exists(&conn, LOCKS_TABLE).unwrap());
    }

    #[test]
    fn test_namespace_length_is_checked() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        let long = "n".repeat(51);
        let result = conn.execute(
            "INSERT INTO schema_migrations (namespace, version) VALUES (?1, 1)",
            [&long],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_namespace_index_exists() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_schema_migrations_namespace'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
