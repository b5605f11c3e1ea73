//! Namespace name validation.
//!
//! A namespace doubles as a directory name under the migrations root and as
//! a partition key in the `schema_migrations` table, so its name has to be
//! safe for both.
//!
//! # Examples
//!
//! ```
//! use nsmigrate_core::{validate_namespace, NamespaceError};
//!
//! assert!(validate_namespace("core").is_ok());
//! assert!(validate_namespace("billing-v2").is_ok());
//! assert_eq!(
//!     validate_namespace("../etc"),
//!     Err(NamespaceError::InvalidCharacter("../etc".to_string(), '.'))
//! );
//! ```

use thiserror::Error;

/// Longest namespace the `schema_migrations.namespace` column accepts.
pub const MAX_NAMESPACE_LEN: usize = 50;

/// Reasons a namespace name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    /// Name is empty.
    #[error("namespace cannot be empty")]
    Empty,
    /// Name exceeds [`MAX_NAMESPACE_LEN`] characters.
    #[error("namespace '{0}' is longer than {MAX_NAMESPACE_LEN} characters")]
    TooLong(String),
    /// Name contains something other than ASCII alphanumerics, `_` or `-`.
    #[error("namespace '{0}' contains invalid character '{1}'")]
    InvalidCharacter(String, char),
}

/// Checks that `namespace` is usable as a directory name and a table key.
pub fn validate_namespace(namespace: &str) -> Result<(), NamespaceError> {
    if namespace.is_empty() {
        return Err(NamespaceError::Empty);
    }
    if namespace.chars().count() > MAX_NAMESPACE_LEN {
        return Err(NamespaceError::TooLong(namespace.to_string()));
    }
    if let Some(bad) = namespace
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(NamespaceError::InvalidCharacter(namespace.to_string(), bad));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_module_names() {
        for name in ["core", "auth", "user_profiles", "billing-v2", "M1"] {
            assert!(validate_namespace(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_namespace(""), Err(NamespaceError::Empty));
    }

    #[test]
    fn test_rejects_path_separators_and_spaces() {
        assert!(matches!(
            validate_namespace("a/b"),
            Err(NamespaceError::InvalidCharacter(_, '/'))
        ));
        assert!(matches!(
            validate_namespace("my module"),
            Err(NamespaceError::InvalidCharacter(_, ' '))
        ));
    }

    #[test]
    fn test_length_limit_is_inclusive() {
        let max = "n".repeat(MAX_NAMESPACE_LEN);
        assert!(validate_namespace(&max).is_ok());
        let over = "n".repeat(MAX_NAMESPACE_LEN + 1);
        assert_eq!(
            validate_namespace(&over),
            Err(NamespaceError::TooLong(over.clone()))
        );
    }
}
