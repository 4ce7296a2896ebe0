use super::fixtures::{make_root, write_file};
use filecat::search::{search, SearchQuery};
use filecat::store::{CatalogStore, LoadOptions};
use filetime::{set_file_mtime, FileTime};
use tempfile::tempdir;

#[test]
fn test_search_across_active_catalogs() {
    let base = tempdir().unwrap();
    let photos = make_root(base.path(), "photos");
    let docs = make_root(base.path(), "docs");
    write_file(&photos, "2023/beach.JPG", &[0u8; 2048]);
    write_file(&photos, "2023/notes.txt", b"n");
    write_file(&docs, "scan.jpg", &[0u8; 100]);

    let store = CatalogStore::default();
    store.load_or_rebuild(&photos, LoadOptions::default()).unwrap();
    store.load_or_rebuild(&docs, LoadOptions::default()).unwrap();

    let query = SearchQuery::new(r"\.jpg$").unwrap();
    let catalogs = store.active_catalogs();
    let hits: Vec<_> = search(catalogs.iter().map(|c| &**c), &query)
        .map(|h| h.path)
        .collect();
    assert_eq!(
        hits,
        vec![docs.join("scan.jpg"), photos.join("2023").join("beach.JPG")]
    );

    store.set_active(&docs, false).unwrap();
    let catalogs = store.active_catalogs();
    let count = search(catalogs.iter().map(|c| &**c), &query).count();
    assert_eq!(count, 1);
}

#[test]
fn test_size_and_date_filters() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    let old = write_file(&root, "old.log", &[1u8; 10]);
    let new = write_file(&root, "new.log", &[1u8; 5000]);
    set_file_mtime(&old, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();
    set_file_mtime(&new, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    let catalog = super::fixtures::scan(&root);

    let big = SearchQuery::new("log").unwrap().with_size_range(Some(1024), None);
    let hits: Vec<_> = search([&catalog], &big).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].size, 5000);
    assert_eq!(hits[0].modified, 1_700_000_000);

    let recent = SearchQuery::all().with_modified_range(Some(1_500_000_000), None);
    let hits: Vec<_> = search([&catalog], &recent).map(|h| h.path).collect();
    assert_eq!(hits, vec![new]);

    let exact = SearchQuery::all().with_modified_range(Some(1_000_000_000), Some(1_000_000_000));
    assert_eq!(search([&catalog], &exact).count(), 1);
}

#[test]
fn test_search_is_lazy() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    for i in 0..50 {
        write_file(&root, &format!("f{i:02}.dat"), b"x");
    }
    let catalog = super::fixtures::scan(&root);
    let query = SearchQuery::all();
    let first: Vec<_> = search([&catalog], &query).take(3).map(|h| h.path).collect();
    assert_eq!(
        first,
        vec![root.join("f00.dat"), root.join("f01.dat"), root.join("f02.dat")]
    );
}
