//! Document text providers: open editor buffers first, disk otherwise.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::paths::{normalize, CanonicalPath};

/// Supplies the current text of a document.
pub trait DocumentSource: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Reads straight from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDocuments;

impl DocumentSource for FsDocuments {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory buffers layered over disk. A buffer shadows the file at the
/// same canonical path, including unsaved edits and not-yet-saved files.
#[derive(Debug, Default)]
pub struct OpenDocuments {
    buffers: RwLock<HashMap<CanonicalPath, String>>,
    fallback: FsDocuments,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, path: impl AsRef<Path>, text: impl Into<String>) {
        let key = normalize(path);
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, text.into());
    }

    pub fn close(&self, path: impl AsRef<Path>) -> Option<String> {
        let key = normalize(path);
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
    }

    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        let key = normalize(path);
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    /// Paths of all open buffers, sorted.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        let buffers = self
            .buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<_> = buffers.keys().map(|k| k.as_path().to_path_buf()).collect();
        paths.sort();
        paths
    }
}

impl DocumentSource for OpenDocuments {
    fn read(&self, path: &Path) -> io::Result<String> {
        let key = normalize(path);
        let buffered = self
            .buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        match buffered {
            Some(text) => Ok(text),
            None => self.fallback.read(path),
        }
    }
}
