use super::fixtures::{make_root, write_file};
use filecat::catalog::{read_catalog, read_summary, write_catalog, Entry};
use filecat::scanner::{DirectoryScanner, HashAlgorithm, ScannerConfig};
use filecat::CatalogError;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[test]
fn test_scanned_catalog_survives_disk_round_trip() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "b.txt", b"bbbb");
    write_file(&root, "a/nested/c.bin", &[0u8; 300]);
    write_file(&root, "a/d.txt", b"d");

    let outcome = DirectoryScanner::new(
        &root,
        ScannerConfig::default().with_hash_algorithm(HashAlgorithm::Sha1),
    )
    .scan()
    .unwrap();
    let index = base.path().join("tree.caf");
    write_catalog(&index, &outcome.catalog).unwrap();

    let loaded = read_catalog(&index).unwrap();
    assert_eq!(loaded, outcome.catalog);
    assert_eq!(loaded.file_count(), 3);
    assert_eq!(loaded.total_size(), 305);
    assert!(loaded.files().all(|f| f.entry.hash.is_some()));

    let summary = read_summary(&index).unwrap();
    assert_eq!(summary.file_count, 3);
    assert_eq!(summary.total_size, 305);
    assert_eq!(summary.root_path, root);
    assert_eq!(summary.hash_algorithm, HashAlgorithm::Sha1);
}

#[test]
fn test_files_are_listed_in_path_order() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    for rel in ["z.txt", "m/b.txt", "m/a.txt", "a.txt"] {
        write_file(&root, rel, b"x");
    }
    let catalog = super::fixtures::scan(&root);

    let paths: Vec<_> = catalog.files().map(|f| f.path).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert_eq!(paths.len(), 4);

    match catalog.find(Path::new("m")) {
        Some(Entry::Directory(dir)) => assert_eq!(dir.children.len(), 2),
        other => panic!("expected directory, got {other:?}"),
    }
}

#[test]
fn test_corrupted_index_is_rejected() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"abc");
    let index = base.path().join("tree.caf");
    write_catalog(&index, &super::fixtures::scan(&root)).unwrap();

    let mut bytes = fs::read(&index).unwrap();
    bytes.truncate(bytes.len() - 3);
    fs::write(&index, &bytes).unwrap();
    assert!(matches!(
        read_catalog(&index),
        Err(CatalogError::CorruptFormat(_))
    ));

    bytes[0] = b'X';
    fs::write(&index, &bytes).unwrap();
    assert!(matches!(
        read_catalog(&index),
        Err(CatalogError::CorruptFormat(_))
    ));
}

#[test]
fn test_future_version_is_unsupported() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    let index = base.path().join("tree.caf");
    write_catalog(&index, &super::fixtures::scan(&root)).unwrap();

    let mut bytes = fs::read(&index).unwrap();
    bytes[4] = 99;
    fs::write(&index, &bytes).unwrap();
    assert!(matches!(
        read_catalog(&index),
        Err(CatalogError::UnsupportedVersion { found: 99, .. })
    ));
}

#[test]
fn test_missing_index_is_path_not_found() {
    let base = tempdir().unwrap();
    assert!(matches!(
        read_catalog(&base.path().join("absent.caf")),
        Err(CatalogError::PathNotFound(_))
    ));
}

#[test]
fn test_write_leaves_no_temp_files() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    let index = base.path().join("out").join("tree.caf");
    fs::create_dir_all(index.parent().unwrap()).unwrap();
    write_catalog(&index, &super::fixtures::scan(&root)).unwrap();
    write_catalog(&index, &super::fixtures::scan(&root)).unwrap();

    let names: Vec<_> = fs::read_dir(index.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("tree.caf")]);
}

#[test]
fn test_concurrent_writers_of_one_index() {
    let base = tempdir().unwrap();
    let big_root = make_root(base.path(), "big");
    let small_root = make_root(base.path(), "small");
    for i in 0..300 {
        write_file(&big_root, &format!("d{}/f{i}.txt", i % 10), b"x");
    }
    write_file(&small_root, "only.txt", b"y");
    let big = super::fixtures::scan(&big_root);
    let small = super::fixtures::scan(&small_root);
    let index = base.path().join("shared_index.caf");

    for _ in 0..20 {
        let (a, b) = std::thread::scope(|s| {
            let a = s.spawn(|| write_catalog(&index, &big));
            let b = s.spawn(|| write_catalog(&index, &small));
            (a.join().unwrap(), b.join().unwrap())
        });
        assert!(a.is_ok(), "{a:?}");
        assert!(b.is_ok(), "{b:?}");
        let stored = read_catalog(&index).unwrap();
        assert!(stored == big || stored == small);
    }

    let leftovers = fs::read_dir(base.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}
