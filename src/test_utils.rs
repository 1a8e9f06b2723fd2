//! Shared test helpers. Only compiled for tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Settings;
use crate::vault::graph::LinkGraph;

/// Creates a temporary workspace directory.
///
/// Temp directories can live under hidden paths such as `/tmp/.tmpXXXXX`, so
/// the workspace is a non-hidden `vault` subdirectory. Keep the `TempDir`
/// alive for the duration of the test.
pub fn create_test_vault_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let vault_dir = temp_dir.path().join("vault");
    fs::create_dir(&vault_dir).expect("Failed to create vault subdirectory");
    let vault_dir = fs::canonicalize(&vault_dir).expect("Failed to canonicalize vault dir");
    (temp_dir, vault_dir)
}

/// Writes `contents` to `relative` under `root`, creating parent directories.
pub fn write_note(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create note directory");
    }
    fs::write(&path, contents).expect("Failed to write note");
    path
}

/// Creates a workspace with `setup_fn` and builds a graph over it with default settings.
pub fn create_test_graph<F>(setup_fn: F) -> (TempDir, PathBuf, LinkGraph)
where
    F: FnOnce(&Path),
{
    let (temp_dir, vault_dir) = create_test_vault_dir();
    setup_fn(&vault_dir);
    let graph = LinkGraph::new(Settings::default());
    graph
        .build_from_scan(&vault_dir)
        .expect("Failed to build test graph");
    (temp_dir, vault_dir, graph)
}
