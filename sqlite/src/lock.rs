//! Table-based advisory lock scoped to one namespace.
//!
//! A process holds the lock for a namespace while its row exists in
//! `schema_migration_locks`. Acquisition inserts the row with
//! `ON CONFLICT DO NOTHING`: exactly one inserter wins, everyone else sees
//! zero affected rows and polls until the row disappears or the timeout
//! elapses.
//!
//! [`NamespaceLock`] deletes its row on drop, so the lock is released on
//! every exit path of the operation that holds it. A process that is killed
//! outright leaves its row behind; [`release_lock`] removes it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use nsmigrate_loader::LockConfig;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::Span;

use crate::error::{MigrateError, Phase, Result};
use crate::schema::TIMESTAMP_FORMAT;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Timing of lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Total time to keep retrying before giving up.
    pub timeout: Duration,
    /// Delay between attempts.
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Guard for a held namespace lock. Dropping it releases the lock.
pub struct NamespaceLock<'c> {
    conn: &'c Connection,
    namespace: String,
    owner: String,
    span: Span,
}

impl<'c> NamespaceLock<'c> {
    /// Acquires the lock for `namespace`, retrying until `options.timeout`.
    ///
    /// The lock table must already exist (see
    /// [`VersionStore::ensure_schema`](crate::VersionStore::ensure_schema)).
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LockTimeout`] if another owner still holds the
    /// lock when the timeout elapses, or [`MigrateError::Store`] if the lock
    /// table cannot be written.
    pub fn acquire(
        conn: &'c Connection,
        namespace: &str,
        options: LockOptions,
        span: &Span,
    ) -> Result<Self> {
        let owner = new_owner_id();
        let start = Instant::now();

        loop {
            if try_acquire(conn, namespace, &owner)? {
                tracing::debug!(parent: span, namespace, owner = %owner, "acquired migration lock");
                return Ok(Self {
                    conn,
                    namespace: namespace.to_string(),
                    owner,
                    span: span.clone(),
                });
            }

            let waited = start.elapsed();
            if waited >= options.timeout {
                return Err(MigrateError::LockTimeout {
                    namespace: namespace.to_string(),
                    waited,
                });
            }

            tracing::debug!(
                parent: span,
                namespace,
                holder = ?lock_holder(conn, namespace).ok().flatten(),
                "migration lock busy, waiting"
            );
            std::thread::sleep(options.poll_interval.min(options.timeout - waited));
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Identifier written to the lock row for this guard.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for NamespaceLock<'_> {
    fn drop(&mut self) {
        let released = self.conn.execute(
            "DELETE FROM schema_migration_locks WHERE namespace = ?1 AND owner = ?2",
            params![self.namespace, self.owner],
        );
        match released {
            Ok(_) => {
                tracing::debug!(parent: &self.span, namespace = %self.namespace, "released migration lock");
            }
            Err(err) => {
                tracing::warn!(
                    parent: &self.span,
                    namespace = %self.namespace,
                    error = %err,
                    "failed to release migration lock; run `unlock` to clear it"
                );
            }
        }
    }
}

/// Makes one attempt to take the lock. Returns `true` if `owner` now holds it.
pub fn try_acquire(conn: &Connection, namespace: &str, owner: &str) -> Result<bool> {
    let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let inserted = conn
        .execute(
            "INSERT INTO schema_migration_locks (namespace, owner, acquired_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (namespace) DO NOTHING",
            params![namespace, owner, now],
        )
        .map_err(MigrateError::store(namespace, None, Phase::AcquireLock))?;
    Ok(inserted > 0)
}

/// Owner currently holding the lock for `namespace`, if any.
pub fn lock_holder(conn: &Connection, namespace: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT owner FROM schema_migration_locks WHERE namespace = ?1",
        [namespace],
        |row| row.get(0),
    )
    .optional()
    .map_err(MigrateError::store(namespace, None, Phase::AcquireLock))
}

/// Removes the lock row for `namespace` regardless of owner.
///
/// Meant for clearing a lock left by a process that died while holding it.
/// Returns `true` if a row was removed.
pub fn release_lock(conn: &Connection, namespace: &str) -> Result<bool> {
    let removed = conn
        .execute(
            "DELETE FROM schema_migration_locks WHERE namespace = ?1",
            [namespace],
        )
        .map_err(MigrateError::store(namespace, None, Phase::ReleaseLock))?;
    Ok(removed > 0)
}

fn new_owner_id() -> String {
    let seq = NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed);
    format!(
        "pid{}-{}-{seq}",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}
