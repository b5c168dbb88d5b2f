//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;

use keydir::{KeyStore, StoreConfig};

/// Route `tracing` output to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Open a file-backed store at `dir/keys.db`.
pub fn open_store(dir: &Path) -> KeyStore {
    init_tracing();
    KeyStore::open(&StoreConfig::new(db_path(dir))).unwrap()
}

pub fn db_path(dir: &Path) -> String {
    dir.join("keys.db").to_string_lossy().to_string()
}
