use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::{tempdir, TempDir};

mod process_tests;

/// A fresh identifier inside its own temporary directory.
fn unique_identifier() -> (TempDir, PathBuf) {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join(format!(
        "shmqueue_test_{}_{}.map",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    (dir, path)
}
