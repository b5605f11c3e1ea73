//! Migration file discovery and parsing.
//!
//! Migrations live under a root directory with one subdirectory per
//! namespace:
//!
//! ```text
//! migrations/
//! ├── core/
//! │   ├── 000001_create_users.up.sql
//! │   ├── 000001_create_users.down.sql
//! │   └── 000002_add_email.up.sql
//! └── billing/
//!     └── 000001_create_invoices.up.sql
//! ```
//!
//! The part of a file name before the first `_` is the version; the rest,
//! minus the `.up.sql` / `.down.sql` suffix, is the description. Files that
//! do not follow this pattern are ignored.
//!
//! ```no_run
//! use nsmigrate_loader::MigrationLoader;
//!
//! let loader = MigrationLoader::new("migrations");
//! for file in loader.load("core").unwrap() {
//!     println!("{} reversible={}", file.display_name(), file.is_reversible());
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, DirEntry, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use nsmigrate_core::{Direction, MigrationFile, validate_namespace};
use regex::Regex;
use tracing::Span;

use crate::error::{LoadError, Result};

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)_(.*)\.(up|down)\.sql$").expect("static regex must compile")
});

/// Version, description and direction extracted from a migration file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub version: i64,
    pub description: String,
    pub direction: Direction,
}

/// Parses `NNNNNN_description.up.sql` / `NNNNNN_description.down.sql`.
///
/// Returns `None` for anything that is not a migration file name, including
/// version prefixes that do not fit in an `i64`.
///
/// # Examples
///
/// ```
/// use nsmigrate_core::Direction;
/// use nsmigrate_loader::parse_filename;
///
/// let parsed = parse_filename("000042_add_index_on_email.down.sql").unwrap();
/// assert_eq!(parsed.version, 42);
/// assert_eq!(parsed.description, "add_index_on_email");
/// assert_eq!(parsed.direction, Direction::Down);
///
/// assert!(parse_filename("v1_init.up.sql").is_none());
/// assert!(parse_filename("000001.up.sql").is_none());
/// ```
pub fn parse_filename(filename: &str) -> Option<ParsedFilename> {
    let caps = FILENAME_RE.captures(filename)?;
    let version = caps[1].parse::<i64>().ok()?;
    let direction = Direction::from_filename(filename)?;
    Some(ParsedFilename {
        version,
        description: caps[2].to_string(),
        direction,
    })
}

/// Paths of a freshly scaffolded migration pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMigration {
    pub version: i64,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

/// Reads migration files for namespaces under a root directory.
///
/// The loader logs through the span it was given (see
/// [`with_span`](Self::with_span)) rather than any process-wide logger.
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    root: PathBuf,
    span: Span,
}

impl MigrationLoader {
    /// Creates a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let span = tracing::debug_span!("migration_loader", root = %root.display());
        Self { root, span }
    }

    /// Replaces the span every event from this loader is attached to.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Root directory containing one subdirectory per namespace.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of `namespace`.
    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace)
    }

    /// Loads every migration of `namespace`, ascending by version.
    ///
    /// A missing namespace directory is not an error: it yields an empty
    /// list and a warning. Any other failure to stat it (a root that is a
    /// regular file, a permission error) is.
    ///
    /// # Errors
    ///
    /// - [`LoadError::InvalidNamespace`] if the name is not a valid namespace.
    /// - [`LoadError::Io`] if the directory or a file in it cannot be read.
    /// - [`LoadError::DuplicateVersion`] if two files provide the same
    ///   direction for one version.
    pub fn load(&self, namespace: &str) -> Result<Vec<MigrationFile>> {
        validate_namespace(namespace)?;
        let dir = self.namespace_dir(namespace);

        if !dir.try_exists().map_err(LoadError::io(&dir))? {
            tracing::warn!(
                parent: &self.span,
                namespace,
                path = %dir.display(),
                "migration directory not found"
            );
            return Ok(Vec::new());
        }

        let mut merged: BTreeMap<i64, MigrationFile> = BTreeMap::new();

        for entry in sorted_entries(&dir)? {
            let file_type = entry.file_type().map_err(LoadError::io(entry.path()))?;
            if file_type.is_dir() {
                continue;
            }

            let path = entry.path();
            let Some(parsed) = entry.file_name().to_str().and_then(parse_filename) else {
                tracing::debug!(
                    parent: &self.span,
                    namespace,
                    path = %path.display(),
                    "skipping non-migration file"
                );
                continue;
            };

            let sql = fs::read_to_string(&path).map_err(LoadError::io(&path))?;
            let file = merged
                .entry(parsed.version)
                .or_insert_with(|| MigrationFile::new(namespace, parsed.version, ""));

            let existing = match parsed.direction {
                Direction::Up => file.up_path.as_ref(),
                Direction::Down => file.down_path.as_ref(),
            };
            if let Some(first) = existing {
                return Err(LoadError::DuplicateVersion {
                    namespace: namespace.to_string(),
                    version: parsed.version,
                    direction: parsed.direction,
                    first: first.clone(),
                    second: path,
                });
            }

            match parsed.direction {
                Direction::Up => {
                    file.description = parsed.description;
                    file.up_script = Some(sql);
                    file.up_path = Some(path);
                }
                Direction::Down => {
                    file.down_script = Some(sql);
                    file.down_path = Some(path);
                }
            }
        }

        Ok(merged.into_values().collect())
    }

    /// Lists namespace directories under the root, sorted by name.
    ///
    /// Subdirectories whose names are not valid namespaces are skipped. A
    /// missing root yields an empty list; a root that cannot be read is an
    /// error.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        if !self.root.try_exists().map_err(LoadError::io(&self.root))? {
            tracing::debug!(parent: &self.span, "migrations root does not exist");
            return Ok(Vec::new());
        }

        let mut namespaces = Vec::new();
        for entry in sorted_entries(&self.root)? {
            let file_type = entry.file_type().map_err(LoadError::io(entry.path()))?;
            if !file_type.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            match validate_namespace(&name) {
                Ok(()) => namespaces.push(name),
                Err(err) => {
                    tracing::debug!(parent: &self.span, %err, "skipping directory");
                }
            }
        }
        Ok(namespaces)
    }

    /// Scaffolds an empty up/down pair for the next version of `namespace`.
    ///
    /// The new version is one above the highest existing version, written
    /// zero-padded to six digits. The files are created empty, so applying
    /// an unedited scaffold fails instead of recording a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidDescription`] for an empty or unsupported
    /// description, and [`LoadError::Io`] if a file cannot be created
    /// (including when it already exists).
    pub fn create(&self, namespace: &str, description: &str) -> Result<NewMigration> {
        validate_namespace(namespace)?;
        let description = normalize_description(description)?;

        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir).map_err(LoadError::io(&dir))?;

        let version = self
            .load(namespace)?
            .last()
            .map_or(1, |latest| latest.version + 1);

        let stem = format!("{version:06}_{description}");
        let up_path = dir.join(format!("{stem}{}", Direction::Up.suffix()));
        let down_path = dir.join(format!("{stem}{}", Direction::Down.suffix()));

        for path in [&up_path, &down_path] {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .map_err(LoadError::io(path))?;
        }

        tracing::info!(
            parent: &self.span,
            namespace,
            version,
            up = %up_path.display(),
            "created migration"
        );

        Ok(NewMigration {
            version,
            up_path,
            down_path,
        })
    }
}

/// Reads a directory and orders its entries by file name, so that loading
/// does not depend on the platform's enumeration order.
fn sorted_entries(dir: &Path) -> Result<Vec<DirEntry>> {
    let mut entries = fs::read_dir(dir)
        .map_err(LoadError::io(dir))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(LoadError::io(dir))?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

/// Lowercases and joins words with `_`: `"Add Email-Index"` → `"add_email_index"`.
fn normalize_description(description: &str) -> Result<String> {
    let normalized = description
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");

    if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(LoadError::InvalidDescription(description.to_string()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filename_keeps_underscores_in_description() {
        let parsed = parse_filename("000003_create_user_roles_table.up.sql").unwrap();
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.description, "create_user_roles_table");
        assert_eq!(parsed.direction, Direction::Up);
    }

    #[test]
    fn test_parse_filename_leading_zeros_are_numeric() {
        assert_eq!(parse_filename("0010_x.up.sql").unwrap().version, 10);
        assert_eq!(parse_filename("10_x.up.sql").unwrap().version, 10);
    }

    #[test]
    fn test_parse_filename_rejects_non_migrations() {
        assert!(parse_filename("README.md").is_none());
        assert!(parse_filename("abc_init.up.sql").is_none());
        assert!(parse_filename("-1_init.up.sql").is_none());
        assert!(parse_filename("000001_init.sql").is_none());
        assert!(parse_filename("000001_init.up.sql.bak").is_none());
        assert!(parse_filename("99999999999999999999_overflow.up.sql").is_none());
    }

    #[test]
    fn test_parse_filename_allows_empty_description() {
        let parsed = parse_filename("000007_.down.sql").unwrap();
        assert_eq!(parsed.version, 7);
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description("Add Email-Index").unwrap(), "add_email_index");
        assert_eq!(normalize_description("  create__users ").unwrap(), "create_users");
        assert!(normalize_description("   ").is_err());
        assert!(normalize_description("drop;table").is_err());
    }
}
