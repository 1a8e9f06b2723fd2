//! Error types for graph operations

use std::path::PathBuf;

/// Failures that stop an operation from starting at all. Unresolved links,
/// circular inclusions and unreadable single documents are reported as data.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Workspace root {} is not readable: {source}", .path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GraphError>;
