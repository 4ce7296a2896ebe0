use super::fixtures::{make_root, write_file};
use filecat::scanner::{HashAlgorithm, ScannerConfig};
use filecat::store::{discover, CatalogStore, LoadAction, LoadOptions, RebuildReason, StoreConfig};
use filecat::{CancelToken, CatalogError, Settings};
use filetime::{set_file_mtime, FileTime};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_unchanged_tree_reuses_index() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");
    write_file(&root, "sub/b.txt", b"beta");

    let store = CatalogStore::default();
    let first = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(first.action, LoadAction::Rebuilt(RebuildReason::NoIndex));
    assert!(first.persisted);
    assert!(first.index_path.is_file());
    assert_eq!(first.index_path, base.path().canonicalize().unwrap().join("tree_index.caf"));

    let second = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(second.action, LoadAction::Reused);
    assert_eq!(*second.catalog, *first.catalog);

    // A fresh store picks the persisted index up as well.
    let other = CatalogStore::default();
    let third = other.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(third.action, LoadAction::Reused);
    assert_eq!(third.catalog.file_count(), 2);
}

#[test]
fn test_size_change_triggers_rebuild() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    let file = write_file(&root, "a.txt", b"alpha");

    let store = CatalogStore::default();
    store.load_or_rebuild(&root, LoadOptions::default()).unwrap();

    let mtime = FileTime::from_last_modification_time(&fs::metadata(&file).unwrap());
    OpenOptions::new()
        .append(true)
        .open(&file)
        .unwrap()
        .write_all(b" and more")
        .unwrap();
    set_file_mtime(&file, mtime).unwrap();

    let outcome = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(outcome.action, LoadAction::Rebuilt(RebuildReason::Stale));
    assert_eq!(outcome.catalog.total_size(), 14);
    assert_eq!(store.get(&root).unwrap().total_size(), 14);
}

#[test]
fn test_nested_size_change_triggers_rebuild() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    let file = write_file(&root, "sub/a.txt", b"alpha");

    let store = CatalogStore::default();
    store.load_or_rebuild(&root, LoadOptions::default()).unwrap();

    let sub_dir = root.join("sub");
    let root_mtime = FileTime::from_last_modification_time(&fs::metadata(&root).unwrap());
    let sub_mtime = FileTime::from_last_modification_time(&fs::metadata(&sub_dir).unwrap());
    fs::write(&file, b"twenty bytes of text").unwrap();
    set_file_mtime(&sub_dir, sub_mtime).unwrap();
    set_file_mtime(&root, root_mtime).unwrap();

    let outcome = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(outcome.action, LoadAction::Rebuilt(RebuildReason::Stale));
    assert_eq!(outcome.catalog.total_size(), 20);
}

#[test]
fn test_mtime_change_triggers_rebuild() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    let file = write_file(&root, "a.txt", b"alpha");
    set_file_mtime(&file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let store = CatalogStore::default();
    store.load_or_rebuild(&root, LoadOptions::default()).unwrap();

    set_file_mtime(&file, FileTime::from_unix_time(1_900_000_000, 0)).unwrap();
    let outcome = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(outcome.action, LoadAction::Rebuilt(RebuildReason::Stale));
}

#[test]
fn test_force_and_reuse_flags() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");
    let store = CatalogStore::default();
    store.load_or_rebuild(&root, LoadOptions::default()).unwrap();

    let forced = store.load_or_rebuild(&root, LoadOptions::new(true, true)).unwrap();
    assert_eq!(forced.action, LoadAction::Rebuilt(RebuildReason::Forced));
    assert!(forced.persisted);

    let no_reuse = store.load_or_rebuild(&root, LoadOptions::new(false, false)).unwrap();
    assert_eq!(no_reuse.action, LoadAction::Rebuilt(RebuildReason::ReuseDisabled));
    assert!(!no_reuse.persisted);
}

#[test]
fn test_corrupt_index_is_rebuilt() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");
    let store = CatalogStore::default();
    let first = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();

    fs::write(&first.index_path, b"garbage").unwrap();
    let outcome = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert!(matches!(
        outcome.action,
        LoadAction::Rebuilt(RebuildReason::Unreadable(_))
    ));
    assert!(outcome.persisted);

    // The rewritten index is valid again.
    let again = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(again.action, LoadAction::Reused);
}

#[test]
fn test_hashed_index_is_separate_from_plain() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");

    let hashed = CatalogStore::new(
        StoreConfig::default()
            .with_scanner(ScannerConfig::default().with_hash_algorithm(HashAlgorithm::Sha256)),
    );
    let outcome = hashed.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert!(outcome
        .index_path
        .to_string_lossy()
        .ends_with("tree_index_sha256.caf"));
    assert!(outcome.catalog.files().all(|f| f.entry.hash.is_some()));

    let plain = CatalogStore::default();
    let outcome = plain.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(outcome.action, LoadAction::Rebuilt(RebuildReason::NoIndex));
}

#[test]
fn test_index_dir_setting() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    let index_dir = make_root(base.path(), "indices");
    let store = CatalogStore::new(StoreConfig::default().with_index_dir(index_dir.clone()));

    let outcome = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    assert_eq!(outcome.index_path, index_dir.join("tree_index.caf"));
    assert!(outcome.index_path.is_file());
}

#[test]
fn test_cancelled_rebuild_leaves_store_untouched() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");
    let store = CatalogStore::default();
    let before = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();
    let index_bytes = fs::read(&before.index_path).unwrap();

    write_file(&root, "b.txt", b"beta");
    let token = CancelToken::new();
    token.cancel();
    let result = store.load_or_rebuild_with(&root, LoadOptions::new(true, true), Some(&token), None);

    assert!(matches!(result, Err(CatalogError::Cancelled)));
    assert!(Arc::ptr_eq(&store.get(&root).unwrap(), &before.catalog));
    assert_eq!(fs::read(&before.index_path).unwrap(), index_bytes);
}

#[test]
fn test_active_flags_scope_catalogs() {
    let base = tempdir().unwrap();
    let a = make_root(base.path(), "a");
    let b = make_root(base.path(), "b");
    let store = CatalogStore::default();
    store.load_or_rebuild(&a, LoadOptions::default()).unwrap();
    store.load_or_rebuild(&b, LoadOptions::default()).unwrap();

    assert_eq!(store.active_paths(), vec![a.clone(), b.clone()]);
    store.set_active(&a, false).unwrap();
    assert_eq!(store.is_active(&a), Some(false));
    assert_eq!(store.active_paths(), vec![b.clone()]);
    assert_eq!(store.active_catalogs().len(), 1);
    assert_eq!(store.len(), 2);

    // Rebuilding keeps the flag.
    store.load_or_rebuild(&a, LoadOptions::new(true, true)).unwrap();
    assert_eq!(store.is_active(&a), Some(false));

    assert!(matches!(
        store.set_active(&base.path().join("unknown"), true),
        Err(CatalogError::PathNotFound(_))
    ));
}

#[test]
fn test_discover_and_open_indices() {
    let base = tempdir().unwrap();
    let a = make_root(base.path(), "a");
    let b = make_root(base.path(), "b");
    write_file(&a, "x.txt", b"x");
    let builder = CatalogStore::default();
    builder.load_or_rebuild(&a, LoadOptions::default()).unwrap();
    builder.load_or_rebuild(&b, LoadOptions::default()).unwrap();
    fs::write(base.path().join("broken_index.caf"), b"nope").unwrap();

    let location = base.path().canonicalize().unwrap();
    let found = discover(&[location.clone()]);
    assert_eq!(found.len(), 3);

    let store = CatalogStore::default();
    let results = store.load_discovered(&[location]);
    let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
    assert_eq!(ok, 2);
    assert_eq!(store.len(), 2);
    assert_eq!(store.get(&a).unwrap().file_count(), 1);

    let summaries = store.summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].root_path, a);
}

#[test]
fn test_missing_root_is_an_error() {
    let base = tempdir().unwrap();
    let store = CatalogStore::default();
    let result = store.load_or_rebuild(&base.path().join("absent"), LoadOptions::default());
    assert!(matches!(result, Err(CatalogError::PathNotFound(_))));
    assert!(store.is_empty());
}

#[test]
fn test_store_from_settings_auto_loads_indices() {
    let base = tempdir().unwrap();
    let a = make_root(base.path(), "a");
    write_file(&a, "x.txt", b"x");
    CatalogStore::default()
        .load_or_rebuild(&a, LoadOptions::default())
        .unwrap();
    let location = base.path().canonicalize().unwrap();

    let settings = Settings {
        index_search_locations: vec![location.clone()],
        ..Settings::default()
    };
    let store = CatalogStore::from_settings(&settings);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(&a).unwrap().file_count(), 1);

    let manual = Settings {
        index_search_locations: vec![location],
        auto_load_indices: false,
        ..Settings::default()
    };
    assert!(CatalogStore::from_settings(&manual).is_empty());
}

#[test]
fn test_load_options_follow_reuse_setting() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");
    let settings = Settings {
        reuse_indices: false,
        auto_load_indices: false,
        ..Settings::default()
    };
    let options = LoadOptions::from_settings(&settings);
    assert_eq!(options, LoadOptions::new(false, false));

    let store = CatalogStore::from_settings(&settings);
    let outcome = store.load_or_rebuild(&root, options).unwrap();
    assert_eq!(outcome.action, LoadAction::Rebuilt(RebuildReason::ReuseDisabled));
    assert!(!outcome.index_path.exists());
}
