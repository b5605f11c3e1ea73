//! Error types for migration operations.
//!
//! Every variant carries the namespace it happened in, and the version when
//! one is involved, so that a failed run can be traced to the exact step it
//! stopped at.

use std::fmt;
use std::time::Duration;

use nsmigrate_core::{Direction, NamespaceError};
use nsmigrate_loader::LoadError;
use thiserror::Error;

/// Version-store step that was running when a database call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadVersion,
    MarkDirty,
    Begin,
    Commit,
    MarkClean,
    DeleteVersion,
    ListRecords,
    AcquireLock,
    ReleaseLock,
    Force,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ReadVersion => "reading current version",
            Phase::MarkDirty => "marking version dirty",
            Phase::Begin => "beginning transaction",
            Phase::Commit => "committing transaction",
            Phase::MarkClean => "marking version clean",
            Phase::DeleteVersion => "deleting version record",
            Phase::ListRecords => "listing version records",
            Phase::AcquireLock => "acquiring namespace lock",
            Phase::ReleaseLock => "releasing namespace lock",
            Phase::Force => "forcing version",
        };
        f.write_str(name)
    }
}

fn at_version(version: &Option<i64>) -> String {
    match version {
        Some(v) => format!(" at version {v}"),
        None => String::new(),
    }
}

/// Errors that can occur while applying, reverting or inspecting migrations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The version or lock table could not be created.
    #[error("failed to initialize migration tables: {0}")]
    SchemaInit(#[source] rusqlite::Error),

    /// The namespace has an unresolved crash marker.
    #[error(
        "namespace '{namespace}' is dirty at version {version}; fix the database and run `force` before migrating"
    )]
    DirtyState { namespace: String, version: i64 },

    /// Migration files for the namespace could not be loaded.
    #[error("failed to load migrations for namespace '{namespace}': {source}")]
    Load {
        namespace: String,
        #[source]
        source: LoadError,
    },

    /// An up or down script failed; its transaction was rolled back.
    #[error("{direction} script for {namespace} version {version} failed: {source}")]
    ScriptExecution {
        namespace: String,
        version: i64,
        direction: Direction,
        #[source]
        source: rusqlite::Error,
    },

    /// Rollback was requested for a version without a down-script.
    #[error("cannot roll back {namespace} version {version}: no down script")]
    MissingDownScript { namespace: String, version: i64 },

    /// A pending version has only a down-script.
    #[error("cannot apply {namespace} version {version}: no up script")]
    MissingUpScript { namespace: String, version: i64 },

    /// Namespaces on disk could not be listed.
    #[error("failed to list namespaces in the migrations directory: {0}")]
    Discover(#[source] LoadError),

    /// The migration tables could not be inspected.
    #[error("failed to inspect migration tables: {0}")]
    Inspect(#[source] rusqlite::Error),

    /// A version-store read or write failed.
    #[error("{phase} failed for namespace '{namespace}'{}: {source}", at_version(.version))]
    Store {
        namespace: String,
        version: Option<i64>,
        phase: Phase,
        #[source]
        source: rusqlite::Error,
    },

    /// Another process held the namespace lock for longer than the timeout.
    #[error("timed out after {waited:?} waiting for the migration lock on namespace '{namespace}'")]
    LockTimeout { namespace: String, waited: Duration },

    /// Namespace name is not usable.
    #[error(transparent)]
    InvalidNamespace(#[from] NamespaceError),
}

impl MigrateError {
    /// Builds a `map_err` adapter that tags a database error with its context.
    pub(crate) fn store(
        namespace: &str,
        version: Option<i64>,
        phase: Phase,
    ) -> impl FnOnce(rusqlite::Error) -> Self {
        let namespace = namespace.to_string();
        move |source| MigrateError::Store {
            namespace,
            version,
            phase,
            source,
        }
    }

    /// Namespace the error occurred in, when there is one.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            MigrateError::DirtyState { namespace, .. }
            | MigrateError::Load { namespace, .. }
            | MigrateError::ScriptExecution { namespace, .. }
            | MigrateError::MissingDownScript { namespace, .. }
            | MigrateError::MissingUpScript { namespace, .. }
            | MigrateError::Store { namespace, .. }
            | MigrateError::LockTimeout { namespace, .. } => Some(namespace),
            MigrateError::SchemaInit(_)
            | MigrateError::Discover(_)
            | MigrateError::Inspect(_)
            | MigrateError::InvalidNamespace(_) => None,
        }
    }
}

/// Convenience alias for results with [`MigrateError`].
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_message_includes_phase_and_version() {
        let err = MigrateError::store("billing", Some(3), Phase::MarkDirty)(
            rusqlite::Error::QueryReturnedNoRows,
        );
        let message = err.to_string();
        assert!(message.starts_with("marking version dirty failed for namespace 'billing' at version 3"));
        assert_eq!(err.namespace(), Some("billing"));
    }

    #[test]
    fn test_store_error_message_without_version() {
        let err = MigrateError::store("core", None, Phase::ReadVersion)(
            rusqlite::Error::QueryReturnedNoRows,
        );
        assert!(err.to_string().starts_with("reading current version failed for namespace 'core':"));
    }

    #[test]
    fn test_cross_namespace_errors_have_no_namespace() {
        let err = MigrateError::Inspect(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().starts_with("failed to inspect migration tables"));
        assert_eq!(err.namespace(), None);
        assert!(!err.to_string().contains("'*'"));
    }

    #[test]
    fn test_dirty_state_message() {
        let err = MigrateError::DirtyState {
            namespace: "core".into(),
            version: 2,
        };
        assert!(err.to_string().contains("'core' is dirty at version 2"));
    }
}
