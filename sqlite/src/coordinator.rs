//! Cross-namespace operations.
//!
//! `core` is the namespace every other module's schema builds on, so
//! [`Migrator::migrate_all`] always migrates it first and stops at the first
//! failing namespace.

use std::collections::{BTreeMap, BTreeSet};

use nsmigrate_core::{CORE_NAMESPACE, NamespaceStatus};

use crate::error::{MigrateError, Result};
use crate::migrator::Migrator;

/// Per-namespace outcome of [`Migrator::migrate_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateReport {
    /// `(namespace, versions applied)` in the order namespaces were run.
    pub namespaces: Vec<(String, usize)>,
}

impl MigrateReport {
    pub fn total_applied(&self) -> usize {
        self.namespaces.iter().map(|(_, applied)| applied).sum()
    }
}

impl Migrator {
    /// Migrates `core`, then each module in the order given.
    ///
    /// A module named `core` in `modules` is skipped since it already ran.
    /// The first failure aborts the run; namespaces migrated before it stay
    /// migrated.
    pub fn migrate_all<S: AsRef<str>>(&self, modules: &[S]) -> Result<MigrateReport> {
        let mut report = MigrateReport::default();

        let applied = self.migrate_namespace(CORE_NAMESPACE)?;
        report.namespaces.push((CORE_NAMESPACE.to_string(), applied));

        for module in modules.iter().map(AsRef::as_ref) {
            if module == CORE_NAMESPACE {
                continue;
            }
            let applied = self.migrate_namespace(module)?;
            report.namespaces.push((module.to_string(), applied));
        }

        tracing::info!(
            parent: self.span(),
            namespaces = report.namespaces.len(),
            applied = report.total_applied(),
            "migration run complete"
        );
        Ok(report)
    }

    /// Status of every namespace known to the database or the migrations
    /// directory.
    ///
    /// A namespace with records but no directory reports `pending_count` 0.
    /// A directory with no records reports version 0 and all of its files
    /// pending.
    ///
    /// Read-only: nothing is created in a database that has never been
    /// migrated.
    pub fn status(&self) -> Result<BTreeMap<String, NamespaceStatus>> {
        let store = self.store();
        let tracked = store.has_schema()?;

        let mut namespaces = BTreeSet::new();
        if tracked {
            namespaces.extend(store.namespaces()?);
        }
        namespaces.extend(self.loader().namespaces().map_err(MigrateError::Discover)?);

        let mut statuses = BTreeMap::new();
        for namespace in namespaces {
            let (current, dirty) = if tracked {
                store.current_version(&namespace)?
            } else {
                (0, false)
            };
            let pending = self
                .load(&namespace)?
                .iter()
                .filter(|file| file.version > current)
                .count();
            statuses.insert(
                namespace.clone(),
                NamespaceStatus::new(namespace, current, pending, dirty),
            );
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_total() {
        let report = MigrateReport {
            namespaces: vec![("core".into(), 2), ("billing".into(), 0), ("auth".into(), 3)],
        };
        assert_eq!(report.total_applied(), 5);
        assert_eq!(MigrateReport::default().total_applied(), 0);
    }
}
