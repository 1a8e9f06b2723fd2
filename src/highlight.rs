//! Link validity spans for an editor highlighter.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::resolve::{ResolvedTarget, TargetResolver};
use crate::vault::{
    extract_references, MDCodeBlock, MyRange, Position, Rangeable, Reference, ReferenceKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum LinkStatus {
    Valid(PathBuf),
    Broken,
    /// Inside a fenced code block; not styled as a link.
    InCodeBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSpan {
    pub kind: ReferenceKind,
    pub raw_target: String,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub range: MyRange,
    pub status: LinkStatus,
}

/// One span per reference in `text`, resolved live from `document`'s directory.
pub fn classify_links(text: &str, document: &Path, resolver: &TargetResolver) -> Vec<LinkSpan> {
    let blocks = MDCodeBlock::new(text).collect::<Vec<_>>();

    extract_references(text)
        .into_iter()
        .map(|reference| {
            let status = if blocks.iter().any(|block| block.includes_reference(&reference)) {
                LinkStatus::InCodeBlock
            } else {
                match resolver.resolve(&reference.raw_target, document) {
                    ResolvedTarget::Found(path) => LinkStatus::Valid(path),
                    ResolvedTarget::NotFound => LinkStatus::Broken,
                }
            };

            LinkSpan {
                kind: reference.kind,
                raw_target: reference.raw_target,
                byte_offset: reference.byte_offset,
                byte_length: reference.byte_length,
                range: reference.range,
                status,
            }
        })
        .collect()
}

/// The reference under the cursor, for link-click navigation.
pub fn link_at(text: &str, position: Position) -> Option<Reference> {
    extract_references(text)
        .into_iter()
        .find(|reference| reference.includes_position(position))
}
