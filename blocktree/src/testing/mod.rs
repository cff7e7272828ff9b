//! Shared test utilities.

use std::path::PathBuf;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::btree::BTree;
use crate::config::TreeConfig;
use crate::store::MemoryBlockStore;

/// Route `tracing` output to the test harness.
///
/// Filtered by `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// A fresh temporary directory and a store path inside it.
///
/// The directory is removed when the returned guard is dropped.
pub fn temp_store_path() -> (TempDir, PathBuf) {
    #[allow(clippy::expect_used)]
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("tree.bt");
    (dir, path)
}

/// An in-memory `u64 -> u64` tree with the given fan-out.
#[allow(clippy::expect_used)]
pub fn memory_tree(fan_out: usize) -> BTree<MemoryBlockStore, u64, u64> {
    BTree::open_with(MemoryBlockStore::new(), &TreeConfig::with_fan_out(fan_out))
        .expect("Failed to open test tree")
}
