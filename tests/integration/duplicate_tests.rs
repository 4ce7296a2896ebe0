use super::fixtures::{make_root, scan, write_file};
use filecat::duplicates::{
    correlate, filter_overlapping_roots, CompareMode, CorrelationConfig, DuplicateEngine,
};
use filecat::scanner::{DirectoryScanner, HashAlgorithm, ScannerConfig};
use filecat::{CatalogError, IssueKind};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_every_destination_copy_is_reported() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let d1 = make_root(base.path(), "d1");
    let d2 = make_root(base.path(), "d2");
    write_file(&src, "photo.jpg", b"same bytes");
    write_file(&src, "unique.txt", b"only here");
    write_file(&d1, "photo.jpg", b"same bytes");
    write_file(&d2, "archive/photo.jpg", b"same bytes");

    let (s, c1, c2) = (scan(&src), scan(&d1), scan(&d2));
    for mode in [CompareMode::NameSize, CompareMode::Hash(HashAlgorithm::Md5)] {
        let groups = correlate(&s, &[&c2, &c1], mode).unwrap();
        assert_eq!(groups.len(), 1, "{mode}");
        let group = &groups[0];
        assert_eq!(group.source_path, src.join("photo.jpg"));
        assert_eq!(group.source_size, 10);
        let paths: Vec<_> = group.matches.iter().map(|m| m.path.clone()).collect();
        assert_eq!(
            paths,
            vec![d1.join("photo.jpg"), d2.join("archive").join("photo.jpg")]
        );
        assert_eq!(group.catalog_roots(), vec![d1.as_path(), d2.as_path()]);
    }
}

#[test]
fn test_hash_mode_rejects_equal_size_different_content() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let dst = make_root(base.path(), "dst");
    write_file(&src, "report.txt", b"version one");
    write_file(&dst, "report.txt", b"version two");

    let (s, d) = (scan(&src), scan(&dst));
    let by_name = correlate(&s, &[&d], CompareMode::NameSize).unwrap();
    assert_eq!(by_name.len(), 1);

    let by_hash = correlate(&s, &[&d], CompareMode::Hash(HashAlgorithm::Sha256)).unwrap();
    assert!(by_hash.is_empty());
}

#[test]
fn test_hash_mode_finds_renamed_copies() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let dst = make_root(base.path(), "dst");
    write_file(&src, "IMG_0001.jpg", b"pixels");
    write_file(&dst, "holiday.jpg", b"pixels");

    let (s, d) = (scan(&src), scan(&dst));
    assert!(correlate(&s, &[&d], CompareMode::NameSize).unwrap().is_empty());
    let groups = correlate(&s, &[&d], CompareMode::Hash(HashAlgorithm::Sha1)).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].matches[0].path, dst.join("holiday.jpg"));
}

#[test]
fn test_only_colliding_sizes_are_hashed() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let dst = make_root(base.path(), "dst");
    for i in 0..1000 {
        write_file(&src, &format!("f{i:04}.bin"), &vec![b'x'; i + 1]);
    }
    write_file(&dst, "copy.bin", &vec![b'x'; 500]);

    let (s, d) = (scan(&src), scan(&dst));
    let engine = DuplicateEngine::new(
        CorrelationConfig::new(CompareMode::Hash(HashAlgorithm::Md5)).with_hash_workers(2),
    );
    let result = engine.correlate(&s, &[&d]).unwrap();

    assert_eq!(result.stats.source_files, 1000);
    assert!(result.stats.files_hashed <= 2);
    assert_eq!(result.stats.candidate_files, 2);
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].source_path, src.join("f0499.bin"));
}

#[test]
fn test_nested_destination_never_matches_itself() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    write_file(&src, "a.txt", b"alpha");
    write_file(&src, "backup/a.txt", b"alpha");
    write_file(&src, "backup/b.txt", b"beta");
    let backup = fs::canonicalize(src.join("backup")).unwrap();

    let (s, d) = (scan(&src), scan(&backup));
    for mode in [CompareMode::NameSize, CompareMode::Hash(HashAlgorithm::Md5)] {
        let result = DuplicateEngine::new(CorrelationConfig::new(mode))
            .correlate(&s, &[&d])
            .unwrap();
        assert_eq!(result.stats.excluded_sources, 2);
        assert_eq!(result.groups.len(), 1);
        for group in &result.groups {
            assert!(!group.source_path.starts_with(&backup));
            assert!(group.matches.iter().all(|m| m.path != group.source_path));
        }
    }
}

#[test]
fn test_stored_digests_are_reused() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let dst = make_root(base.path(), "dst");
    write_file(&src, "a.bin", b"payload");
    write_file(&dst, "b.bin", b"payload");

    let config = ScannerConfig::default().with_hash_algorithm(HashAlgorithm::Md5);
    let s = DirectoryScanner::new(&src, config.clone()).scan().unwrap().catalog;
    let d = DirectoryScanner::new(&dst, config).scan().unwrap().catalog;

    let result = DuplicateEngine::new(CorrelationConfig::new(CompareMode::Hash(
        HashAlgorithm::Md5,
    )))
    .correlate(&s, &[&d])
    .unwrap();
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.stats.files_hashed, 0);
    assert_eq!(result.stats.digests_reused, 2);
}

#[test]
fn test_vanished_file_is_an_issue_not_an_error() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let dst = make_root(base.path(), "dst");
    let gone = write_file(&src, "a.bin", b"payload");
    write_file(&dst, "b.bin", b"payload");

    let (s, d) = (scan(&src), scan(&dst));
    fs::remove_file(&gone).unwrap();

    let result = DuplicateEngine::new(CorrelationConfig::new(CompareMode::Hash(
        HashAlgorithm::Md5,
    )))
    .correlate(&s, &[&d])
    .unwrap();
    assert!(result.groups.is_empty());
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].kind, IssueKind::HashFailed);
    assert_eq!(result.issues[0].path, gone);
}

#[test]
fn test_zero_byte_files_match_by_size() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let dst = make_root(base.path(), "dst");
    write_file(&src, "empty", b"");
    write_file(&dst, "also-empty", b"");

    let (s, d) = (scan(&src), scan(&dst));
    let groups = correlate(&s, &[&d], CompareMode::Hash(HashAlgorithm::Md5)).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].source_size, 0);
}

#[test]
fn test_unknown_algorithm_cannot_correlate() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let s = scan(&src);
    let result = correlate(&s, &[&s], CompareMode::Hash(HashAlgorithm::Unknown(42)));
    assert!(matches!(
        result,
        Err(CatalogError::UnsupportedHashAlgorithm(42))
    ));
}

#[test]
fn test_overlapping_destination_roots_are_filtered() {
    let base = tempdir().unwrap();
    let outer = make_root(base.path(), "outer");
    let inner = make_root(&outer, "inner");
    let other = make_root(base.path(), "other");

    let kept = filter_overlapping_roots(&[inner, outer.clone(), other.clone()]);
    assert_eq!(kept, vec![outer, other]);
}
