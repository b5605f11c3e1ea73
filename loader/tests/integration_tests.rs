use std::fs;
use std::path::Path;

use nsmigrate_core::Direction;
use nsmigrate_loader::{LoadError, MigrationLoader};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write(root: &Path, namespace: &str, filename: &str, sql: &str) {
    let dir = root.join(namespace);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(filename), sql).unwrap();
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn test_load_merges_up_and_down_by_version() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "core", "000001_create_users.up.sql", "CREATE TABLE users (id INTEGER);");
    write(root.path(), "core", "000001_create_users.down.sql", "DROP TABLE users;");
    write(root.path(), "core", "000002_add_email.up.sql", "ALTER TABLE users ADD COLUMN email TEXT;");

    let files = MigrationLoader::new(root.path()).load("core").unwrap();
    assert_eq!(files.len(), 2);

    assert_eq!(files[0].version, 1);
    assert_eq!(files[0].namespace, "core");
    assert_eq!(files[0].description, "create_users");
    assert_eq!(files[0].script(Direction::Up), Some("CREATE TABLE users (id INTEGER);"));
    assert_eq!(files[0].script(Direction::Down), Some("DROP TABLE users;"));

    assert_eq!(files[1].version, 2);
    assert!(!files[1].is_reversible());
}

#[test]
fn test_load_orders_numerically_not_lexically() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "core", "10_ten.up.sql", "SELECT 10;");
    write(root.path(), "core", "9_nine.up.sql", "SELECT 9;");
    write(root.path(), "core", "3_three.up.sql", "SELECT 3;");
    write(root.path(), "core", "1_one.up.sql", "SELECT 1;");

    let versions: Vec<i64> = MigrationLoader::new(root.path())
        .load("core")
        .unwrap()
        .iter()
        .map(|f| f.version)
        .collect();
    assert_eq!(versions, vec![1, 3, 9, 10]);
}

#[test]
fn test_load_missing_namespace_is_empty() {
    let root = tempfile::tempdir().unwrap();
    let files = MigrationLoader::new(root.path()).load("billing").unwrap();
    assert!(files.is_empty());
}

#[test]
fn test_load_skips_unrecognized_files_and_subdirectories() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "core", "000001_init.up.sql", "SELECT 1;");
    write(root.path(), "core", "README.md", "# notes");
    write(root.path(), "core", "draft_init.up.sql", "SELECT 2;");
    write(root.path(), "core", "000002.up.sql", "SELECT 3;");
    fs::create_dir_all(root.path().join("core").join("000003_nested.up.sql")).unwrap();

    let files = MigrationLoader::new(root.path()).load("core").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].version, 1);
}

#[test]
fn test_load_down_only_version_has_empty_description() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "core", "000004_orphan.down.sql", "DROP TABLE t;");

    let files = MigrationLoader::new(root.path()).load("core").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].description, "");
    assert!(files[0].up_script.is_none());
    assert!(files[0].is_reversible());
}

#[test]
fn test_load_rejects_duplicate_up_scripts() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "core", "000001_create_users.up.sql", "SELECT 1;");
    write(root.path(), "core", "0001_create_people.up.sql", "SELECT 2;");

    let err = MigrationLoader::new(root.path()).load("core").unwrap_err();
    match err {
        LoadError::DuplicateVersion {
            namespace,
            version,
            direction,
            first,
            second,
        } => {
            assert_eq!(namespace, "core");
            assert_eq!(version, 1);
            assert_eq!(direction, Direction::Up);
            // Entries are processed in file name order.
            assert!(first.ends_with("000001_create_users.up.sql"));
            assert!(second.ends_with("0001_create_people.up.sql"));
        }
        other => panic!("expected DuplicateVersion, got {other:?}"),
    }
}

#[test]
fn test_load_rejects_invalid_namespace() {
    let root = tempfile::tempdir().unwrap();
    let err = MigrationLoader::new(root.path()).load("../outside").unwrap_err();
    assert!(matches!(err, LoadError::InvalidNamespace(_)));
}

// ---------------------------------------------------------------------------
// Namespace discovery
// ---------------------------------------------------------------------------

#[test]
fn test_namespaces_lists_valid_directories_sorted() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "core", "000001_init.up.sql", "SELECT 1;");
    fs::create_dir_all(root.path().join("billing")).unwrap();
    fs::create_dir_all(root.path().join("auth")).unwrap();
    fs::create_dir_all(root.path().join("not valid")).unwrap();
    fs::write(root.path().join("notes.txt"), "x").unwrap();

    let namespaces = MigrationLoader::new(root.path()).namespaces().unwrap();
    assert_eq!(namespaces, vec!["auth", "billing", "core"]);
}

#[test]
fn test_namespaces_missing_root_is_empty() {
    let root = tempfile::tempdir().unwrap();
    let loader = MigrationLoader::new(root.path().join("does-not-exist"));
    assert!(loader.namespaces().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Scaffolding
// ---------------------------------------------------------------------------

#[test]
fn test_unreadable_root_is_an_error_not_an_empty_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("migrations");
    fs::write(&root, "not a directory").unwrap();
    let loader = MigrationLoader::new(&root);

    match loader.load("core").unwrap_err() {
        LoadError::Io { path, .. } => assert!(path.ends_with("migrations/core")),
        other => panic!("expected Io, got {other:?}"),
    }
    assert!(matches!(loader.namespaces().unwrap_err(), LoadError::Io { .. }));
}

#[test]
fn test_create_starts_at_version_one() {
    let root = tempfile::tempdir().unwrap();
    let loader = MigrationLoader::new(root.path());

    let created = loader.create("auth", "Create Sessions").unwrap();
    assert_eq!(created.version, 1);
    assert!(created.up_path.ends_with("auth/000001_create_sessions.up.sql"));
    assert!(created.down_path.ends_with("auth/000001_create_sessions.down.sql"));
    assert!(created.up_path.exists());
    assert!(created.down_path.exists());
}

#[test]
fn test_create_follows_highest_version() {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "core", "000007_existing.up.sql", "SELECT 1;");
    let loader = MigrationLoader::new(root.path());

    let created = loader.create("core", "next-step").unwrap();
    assert_eq!(created.version, 8);

    // Empty scaffolds load but carry no runnable script yet.
    let files = loader.load("core").unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[1].description, "next_step");
    assert_eq!(files[1].script(Direction::Up), None);
}

#[test]
fn test_create_rejects_bad_description() {
    let root = tempfile::tempdir().unwrap();
    let err = MigrationLoader::new(root.path())
        .create("core", "drop;table")
        .unwrap_err();
    assert!(matches!(err, LoadError::InvalidDescription(_)));
}
