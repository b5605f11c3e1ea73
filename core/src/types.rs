//! Migration type definitions shared by the loader, the store and the CLI.
//!
//! A [`MigrationFile`] is what the filesystem says should exist, a
//! [`MigrationRecord`] is what the database says has been applied, and a
//! [`NamespaceStatus`] is the comparison of the two for one namespace.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace that is always migrated before any module namespace.
pub const CORE_NAMESPACE: &str = "core";

/// Direction a migration script moves the schema in.
///
/// # Examples
///
/// ```
/// use nsmigrate_core::Direction;
///
/// assert_eq!(Direction::Up.suffix(), ".up.sql");
/// assert_eq!(Direction::from_filename("000001_init.down.sql"), Some(Direction::Down));
/// assert_eq!(Direction::from_filename("000001_init.sql"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Forward change, taken from `*.up.sql`.
    Up,
    /// Reversal, taken from `*.down.sql`.
    Down,
}

impl Direction {
    /// File name suffix that selects this direction.
    pub fn suffix(self) -> &'static str {
        match self {
            Direction::Up => ".up.sql",
            Direction::Down => ".down.sql",
        }
    }

    /// Infers the direction from a file name suffix.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.ends_with(Direction::Up.suffix()) {
            Some(Direction::Up)
        } else if filename.ends_with(Direction::Down.suffix()) {
            Some(Direction::Down)
        } else {
            None
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// One version of a namespace as found on disk.
///
/// The up and down scripts of a version are merged into a single value.
/// Either side may be missing: the loader reports what it found and the
/// engine decides whether that is enough for the requested operation.
///
/// # Examples
///
/// ```
/// use nsmigrate_core::MigrationFile;
///
/// let file = MigrationFile::new("core", 1, "create_users")
///     .with_up("CREATE TABLE users (id INTEGER PRIMARY KEY);")
///     .with_down("DROP TABLE users;");
/// assert!(file.is_reversible());
/// assert_eq!(file.display_name(), "core/000001_create_users");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    /// Namespace the file belongs to.
    pub namespace: String,
    /// Numeric version parsed from the file name prefix.
    pub version: i64,
    /// Human description taken from the up-file name. Empty for down-only entries.
    pub description: String,
    /// Contents of the `.up.sql` file, if present.
    pub up_script: Option<String>,
    /// Contents of the `.down.sql` file, if present.
    pub down_script: Option<String>,
    /// Path of the `.up.sql` file, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_path: Option<PathBuf>,
    /// Path of the `.down.sql` file, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_path: Option<PathBuf>,
}

impl MigrationFile {
    /// Creates an entry with no scripts attached.
    pub fn new(namespace: impl Into<String>, version: i64, description: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version,
            description: description.into(),
            up_script: None,
            down_script: None,
            up_path: None,
            down_path: None,
        }
    }

    /// Attaches an up-script.
    pub fn with_up(mut self, sql: impl Into<String>) -> Self {
        self.up_script = Some(sql.into());
        self
    }

    /// Attaches a down-script.
    pub fn with_down(mut self, sql: impl Into<String>) -> Self {
        self.down_script = Some(sql.into());
        self
    }

    /// Returns the script for `direction`, treating whitespace-only content as absent.
    pub fn script(&self, direction: Direction) -> Option<&str> {
        let script = match direction {
            Direction::Up => self.up_script.as_deref(),
            Direction::Down => self.down_script.as_deref(),
        };
        script.filter(|sql| !sql.trim().is_empty())
    }

    /// Returns `true` if a non-empty down-script exists.
    pub fn is_reversible(&self) -> bool {
        self.script(Direction::Down).is_some()
    }

    /// `namespace/NNNNNN_description`, used in log lines and CLI output.
    pub fn display_name(&self) -> String {
        if self.description.is_empty() {
            format!("{}/{:06}", self.namespace, self.version)
        } else {
            format!("{}/{:06}_{}", self.namespace, self.version, self.description)
        }
    }
}

/// A row of the `schema_migrations` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Namespace the version belongs to.
    pub namespace: String,
    /// Applied (or in-flight) version.
    pub version: i64,
    /// `true` while the version's up-script has not been confirmed complete.
    pub dirty: bool,
    /// When the row was last written.
    pub applied_at: DateTime<Utc>,
}

/// Applied-versus-available summary for one namespace.
///
/// # Examples
///
/// ```
/// use nsmigrate_core::NamespaceStatus;
///
/// let status = NamespaceStatus::new("billing", 3, 2, false);
/// assert!(!status.is_up_to_date());
/// assert!(NamespaceStatus::new("core", 5, 0, false).is_up_to_date());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStatus {
    /// Namespace name.
    pub namespace: String,
    /// Highest recorded version, `0` if nothing was ever applied.
    pub current_version: i64,
    /// Files on disk with a version above `current_version`.
    pub pending_count: usize,
    /// Whether the current version is marked dirty.
    pub dirty: bool,
}

impl NamespaceStatus {
    /// Creates a status snapshot.
    pub fn new(
        namespace: impl Into<String>,
        current_version: i64,
        pending_count: usize,
        dirty: bool,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            current_version,
            pending_count,
            dirty,
        }
    }

    /// `true` when nothing is pending and the namespace is clean.
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0 && !self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_filename() {
        assert_eq!(
            Direction::from_filename("000002_add_email.up.sql"),
            Some(Direction::Up)
        );
        assert_eq!(
            Direction::from_filename("000002_add_email.down.sql"),
            Some(Direction::Down)
        );
        assert_eq!(Direction::from_filename("000002_add_email.up.txt"), None);
        assert_eq!(Direction::from_filename("README.md"), None);
    }

    #[test]
    fn test_whitespace_script_counts_as_missing() {
        let file = MigrationFile::new("core", 4, "noop").with_up("  \n").with_down("\t");
        assert_eq!(file.script(Direction::Up), None);
        assert!(!file.is_reversible());
    }

    #[test]
    fn test_display_name_without_description() {
        let file = MigrationFile::new("billing", 12, "");
        assert_eq!(file.display_name(), "billing/000012");
    }

    #[test]
    fn test_status_serializes_with_snake_case_fields() {
        let status = NamespaceStatus::new("core", 2, 1, true);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["current_version"], 2);
        assert_eq!(json["pending_count"], 1);
        assert_eq!(json["dirty"], true);
    }
}
