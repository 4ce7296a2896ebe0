use filecat::catalog::Catalog;
use filecat::scanner::{DirectoryScanner, ScannerConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Create `base/name` and return its canonical path.
pub fn make_root(base: &Path, name: &str) -> PathBuf {
    let root = base.join(name);
    fs::create_dir_all(&root).unwrap();
    fs::canonicalize(root).unwrap()
}

/// Scan `root` with default settings.
pub fn scan(root: &Path) -> Catalog {
    DirectoryScanner::new(root, ScannerConfig::default())
        .scan()
        .unwrap()
        .catalog
}
