//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Create `count` small documents spread over `<temp_dir>/docs` and one subdirectory.
///
/// Returns the docs directory and the documents in discovery order.
#[allow(dead_code)]
pub fn create_doc_set(temp_dir: &TempDir, count: usize) -> (PathBuf, Vec<PathBuf>) {
    let root = temp_dir.path().join("docs");
    std::fs::create_dir_all(root.join("chapters")).unwrap();

    let mut docs = Vec::with_capacity(count);
    for i in 0..count {
        let dir = if i % 2 == 0 {
            root.clone()
        } else {
            root.join("chapters")
        };
        let path = dir.join(format!("doc{i:02}.md"));
        let body = format!(
            "# Document {i}\n\nSome text.\n\n```python\nprint({i})\n```\n"
        );
        std::fs::write(&path, body).unwrap();
        docs.push(path);
    }
    docs.sort_by(|a, b| a.components().cmp(b.components()));
    (root, docs)
}

/// Output location of `doc` when `root` is mirrored into `out`.
#[allow(dead_code)]
pub fn mirrored(doc: &Path, root: &Path, out: &Path) -> PathBuf {
    out.join(doc.strip_prefix(root).unwrap())
        .with_extension("html")
}

/// Create a named pipe at `path`. Reading it blocks until a writer opens the other end.
#[cfg(unix)]
#[allow(dead_code)]
pub fn make_fifo(path: &Path) {
    let status = std::process::Command::new("mkfifo")
        .arg(path)
        .status()
        .unwrap();
    assert!(status.success(), "mkfifo {path:?} failed");
}

/// Open and close the write end of `fifo`, letting a blocked reader see end of file.
#[cfg(unix)]
#[allow(dead_code)]
pub fn release_fifo(fifo: &Path) {
    drop(
        std::fs::OpenOptions::new()
            .write(true)
            .open(fifo)
            .unwrap(),
    );
}
