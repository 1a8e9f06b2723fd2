//! notegraph: a link graph index for folders of markdown notes
//!
//! Documents reference each other with wiki links (`[[target]]`), inclusion
//! links (`[[!target]]`) and plain markdown links. This crate extracts those
//! references, resolves them to files, and keeps a forward/backward link index
//! that editor components can query while rebuilds happen in the background.
//!
//! # Architecture
//!
//! - [`vault`]: reference extraction, workspace scanning and the [`vault::graph::LinkGraph`]
//! - [`paths`]: canonical, case-insensitive path keys
//! - [`resolve`]: raw link target to file resolution
//! - [`inclusion`]: HTML rendering with recursive inclusion expansion
//! - [`rename`]: rewriting references after a rename or delete
//! - [`events`]: change notifications for graph subscribers
//! - [`config`]: settings layered from the user config and the workspace
//!
//! ```ignore
//! use notegraph::config::Settings;
//! use notegraph::vault::graph::LinkGraph;
//!
//! let graph = LinkGraph::new(Settings::new(&root)?);
//! graph.build_from_scan(&root)?;
//! let linking_here = graph.backlinks_for(&root.join("Guide.md"));
//! ```

pub mod vault;

pub mod highlight;
pub mod inclusion;
pub mod patterns;
pub mod rename;
pub mod resolve;

pub mod config;
pub mod documents;
pub mod error;
pub mod events;
pub mod paths;

#[cfg(test)]
pub mod test_utils;
