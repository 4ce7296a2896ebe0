use super::fixtures::{make_root, scan, write_file};
use filecat::duplicates::{CompareMode, CorrelationConfig};
use filecat::progress::ProgressEvent;
use filecat::scanner::{HashAlgorithm, ScannerConfig};
use filecat::store::{CatalogStore, LoadAction, LoadOptions};
use filecat::task::{self, TaskStatus};
use filecat::CatalogError;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn final_status<T>(handle: &task::TaskHandle<T>) -> Option<TaskStatus> {
    handle.events().iter().find_map(|event| match event {
        ProgressEvent::Finished(status) => Some(status),
        ProgressEvent::Update(_) => None,
    })
}

#[test]
fn test_background_scan_reports_progress() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    for i in 0..200 {
        write_file(&root, &format!("d{}/f{i}.txt", i % 7), b"content");
    }

    let handle = task::spawn_scan(root.clone(), ScannerConfig::default(), 4).unwrap();
    assert_eq!(final_status(&handle), Some(TaskStatus::Completed));
    assert_eq!(handle.status(), TaskStatus::Completed);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.files_seen, 200);

    let outcome = handle.wait().unwrap();
    assert_eq!(outcome.catalog.file_count(), 200);
    assert!(outcome.issues.is_empty());
}

#[test]
fn test_background_load_goes_through_store() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");
    let store = Arc::new(CatalogStore::default());

    let handle = task::spawn_load(Arc::clone(&store), root.clone(), LoadOptions::default(), 8)
        .unwrap();
    let outcome = handle.wait().unwrap();
    assert!(matches!(outcome.action, LoadAction::Rebuilt(_)));
    assert!(Arc::ptr_eq(&store.get(&root).unwrap(), &outcome.catalog));

    let handle = task::spawn_load(Arc::clone(&store), root, LoadOptions::default(), 8).unwrap();
    assert_eq!(handle.wait().unwrap().action, LoadAction::Reused);
}

#[test]
fn test_background_correlation() {
    let base = tempdir().unwrap();
    let src = make_root(base.path(), "src");
    let dst = make_root(base.path(), "dst");
    write_file(&src, "a.bin", b"same");
    write_file(&dst, "b.bin", b"same");

    let handle = task::spawn_correlate(
        Arc::new(scan(&src)),
        vec![Arc::new(scan(&dst))],
        CorrelationConfig::new(CompareMode::Hash(HashAlgorithm::Sha256)),
        2,
    )
    .unwrap();
    let result = handle.wait().unwrap();
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.stats.files_hashed, 2);
}

#[test]
fn test_cancelled_task_reports_cancelled() {
    let (started_tx, started_rx) = mpsc::channel();
    let handle = task::spawn::<(), _>("blocker", 2, move |ctx| {
        let _ = started_tx.send(());
        loop {
            ctx.cancel.check()?;
            thread::sleep(Duration::from_millis(2));
        }
    })
    .unwrap();
    started_rx.recv().unwrap();
    handle.cancel();

    assert_eq!(final_status(&handle), Some(TaskStatus::Cancelled));
    assert_eq!(handle.status(), TaskStatus::Cancelled);
    assert!(matches!(handle.wait(), Err(CatalogError::Cancelled)));
}

#[test]
fn test_cancelled_load_keeps_previous_catalog() {
    let base = tempdir().unwrap();
    let root = make_root(base.path(), "tree");
    write_file(&root, "a.txt", b"alpha");
    let store = Arc::new(CatalogStore::default());
    let before = store.load_or_rebuild(&root, LoadOptions::default()).unwrap();

    let (go_tx, go_rx) = mpsc::channel::<()>();
    let worker_store = Arc::clone(&store);
    let worker_root = root.clone();
    let handle = task::spawn("load", 2, move |ctx| {
        let _ = go_rx.recv();
        worker_store.load_or_rebuild_with(
            &worker_root,
            LoadOptions::new(true, true),
            Some(&ctx.cancel),
            None,
        )
    })
    .unwrap();
    handle.cancel();
    let _ = go_tx.send(());

    assert!(matches!(handle.wait(), Err(CatalogError::Cancelled)));
    assert!(Arc::ptr_eq(&store.get(&root).unwrap(), &before.catalog));
}
