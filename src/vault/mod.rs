mod helpers;
mod parsing;
mod types;

pub mod graph;

#[cfg(test)]
mod tests;

pub use helpers::{
    clean_target, has_document_extension, is_document_path, split_extension, split_fragment,
    target_dir_prefix, target_file_name, workspace_relative,
};
pub use parsing::{in_code_block, MDCodeBlock};
pub use types::{HeadingLevel, MDHeading, MyRange, Position, Rangeable};

use std::ops::Range;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::{Captures, Match, Regex};
use ropey::Rope;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::documents::DocumentSource;
use crate::error::GraphError;
use crate::paths::Boundary;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `[[target]]` or `[[target|display]]`
    WikiLink,
    /// `[[!target]]` or `[[!target|display]]`
    InclusionLink,
    /// `[text](target)`
    MarkdownLink,
    /// `![alt](target)`
    MarkdownImage,
}

impl ReferenceKind {
    /// Images are rewritten on rename/delete but never produce backlinks.
    pub fn is_graph_edge(&self) -> bool {
        !matches!(self, ReferenceKind::MarkdownImage)
    }

    pub fn is_wiki(&self) -> bool {
        matches!(self, ReferenceKind::WikiLink | ReferenceKind::InclusionLink)
    }
}

/// One link occurrence in a document's text.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    /// Target as written, trimmed. May lack an extension, carry a `#fragment` or percent escapes.
    pub raw_target: String,
    /// Display text, or the raw target when none was written
    pub display_text: String,
    /// Whether `display_text` was written explicitly
    pub has_display: bool,
    pub source_document: Option<PathBuf>,
    /// Start of the whole token in the text
    pub byte_offset: usize,
    /// Length of the whole token
    pub byte_length: usize,
    /// Byte span of `raw_target` in the text
    pub target_span: Range<usize>,
    pub range: MyRange,
}

impl Reference {
    pub fn byte_range(&self) -> Range<usize> {
        self.byte_offset..self.byte_offset + self.byte_length
    }

    /// The target reduced to a path: no fragment, no escapes, `/` separators.
    pub fn target_path(&self) -> String {
        clean_target(&self.raw_target)
    }

    pub fn fragment(&self) -> Option<&str> {
        split_fragment(&self.raw_target).1
    }

    /// Reconstructs the token as it would be written.
    pub fn to_markdown(&self) -> String {
        let display = self.has_display.then_some(self.display_text.as_str());
        match (self.kind, display) {
            (ReferenceKind::WikiLink, None) => format!("[[{}]]", self.raw_target),
            (ReferenceKind::WikiLink, Some(display)) => {
                format!("[[{}|{}]]", self.raw_target, display)
            }
            (ReferenceKind::InclusionLink, None) => format!("[[!{}]]", self.raw_target),
            (ReferenceKind::InclusionLink, Some(display)) => {
                format!("[[!{}|{}]]", self.raw_target, display)
            }
            (ReferenceKind::MarkdownLink, display) => {
                format!("[{}]({})", display.unwrap_or_default(), self.raw_target)
            }
            (ReferenceKind::MarkdownImage, display) => {
                format!("![{}]({})", display.unwrap_or_default(), self.raw_target)
            }
        }
    }

    fn wiki(text: &str, rope: &Rope, capture: Captures) -> Option<Reference> {
        let full = capture.get(0)?;
        let target = capture.name("target")?;
        let target_span = trimmed_span(target)?;
        let raw_target = text[target_span.clone()].to_string();

        let display = capture
            .name("display")
            .map(|display| display.as_str().trim())
            .filter(|display| !display.is_empty());

        let kind = match capture.name("bang") {
            Some(_) => ReferenceKind::InclusionLink,
            None => ReferenceKind::WikiLink,
        };

        Some(Reference {
            kind,
            display_text: display.unwrap_or(&raw_target).to_string(),
            has_display: display.is_some(),
            raw_target,
            source_document: None,
            byte_offset: full.start(),
            byte_length: full.len(),
            target_span,
            range: MyRange::from_range(rope, full.range()),
        })
    }

    fn markdown(text: &str, rope: &Rope, capture: Captures) -> Option<Reference> {
        let full = capture.get(0)?;
        let url = capture.name("url")?;
        let target_span = markdown_target_span(url)?;
        let raw_target = text[target_span.clone()].to_string();

        if is_external(&raw_target) {
            return None;
        }

        let display = capture
            .name("text")
            .map(|text| text.as_str().trim())
            .filter(|text| !text.is_empty());

        let kind = match capture.name("image") {
            Some(_) => ReferenceKind::MarkdownImage,
            None => ReferenceKind::MarkdownLink,
        };

        Some(Reference {
            kind,
            display_text: display.unwrap_or(&raw_target).to_string(),
            has_display: display.is_some(),
            raw_target,
            source_document: None,
            byte_offset: full.start(),
            byte_length: full.len(),
            target_span,
            range: MyRange::from_range(rope, full.range()),
        })
    }
}

impl Rangeable for Reference {
    fn range(&self) -> &MyRange {
        &self.range
    }
}

static WIKI_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[(?<bang>!)?(?<target>[^|\]]*)(?:\|(?<display>[^\]]*))?\]\]")
        .expect("wiki link regex")
});

static MD_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?<image>!)?\[(?<text>[^\]]*)\]\((?<url>[^)]+)\)").expect("markdown link regex")
});

/// Extracts every wiki, inclusion, markdown and image reference from `text`,
/// ordered by byte offset. Links inside code fences are included.
pub fn extract_references(text: &str) -> Vec<Reference> {
    let rope = Rope::from_str(text);

    let wiki_links = WIKI_LINK_RE
        .captures_iter(text)
        .filter_map(|capture| Reference::wiki(text, &rope, capture))
        .collect_vec();

    let wiki_spans = WIKI_LINK_RE
        .find_iter(text)
        .map(|found| found.range())
        .collect_vec();

    let md_links = MD_LINK_RE
        .captures_iter(text)
        .filter(|capture| {
            capture.get(0).is_some_and(|full| {
                !wiki_spans
                    .iter()
                    .any(|span| span.start < full.end() && full.start() < span.end)
            })
        })
        .filter_map(|capture| Reference::markdown(text, &rope, capture));

    wiki_links
        .into_iter()
        .chain(md_links)
        .sorted_by_key(|reference| reference.byte_offset)
        .collect()
}

/// Same as [`extract_references`], with `source_document` filled in.
pub fn extract_document_references(text: &str, path: &Path) -> Vec<Reference> {
    extract_references(text)
        .into_iter()
        .map(|reference| Reference {
            source_document: Some(path.to_path_buf()),
            ..reference
        })
        .collect()
}

/// References that take part in the graph under `settings`: links inside
/// fenced code are dropped when `references_in_codeblocks` is off.
pub fn document_references(settings: &Settings, text: &str, path: &Path) -> Vec<Reference> {
    let references = extract_document_references(text, path);
    if settings.references_in_codeblocks {
        return references;
    }

    let blocks = MDCodeBlock::new(text).collect_vec();
    references
        .into_iter()
        .filter(|reference| !blocks.iter().any(|block| block.includes_reference(reference)))
        .collect()
}

fn trimmed_span(found: Match) -> Option<Range<usize>> {
    let value = found.as_str();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = found.start() + (value.len() - value.trim_start().len());
    Some(start..start + trimmed.len())
}

/// Span of the destination inside `(...)`: trimmed, without `<>` and without a quoted title.
fn markdown_target_span(url: Match) -> Option<Range<usize>> {
    let mut span = trimmed_span(url)?;
    let offset = url.start();
    let value = &url.as_str()[span.start - offset..span.end - offset];

    if value.starts_with('<') {
        let close = value.find('>')?;
        let inner = span.start + 1..span.start + close;
        return (!inner.is_empty()).then_some(inner);
    }

    // `(path "title")`; plain spaces stay part of the path
    if let Some(idx) = value.find([' ', '\t']) {
        if value[idx..].trim_start().starts_with(['"', '\'']) {
            span.end = span.start + idx;
        }
    }

    Some(span)
}

/// Web links, mail links, data URIs and in-page anchors.
pub fn is_external(target: &str) -> bool {
    let target = target.trim();
    target.starts_with('#')
        || target.contains("://")
        || target
            .get(..7)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
        || target
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// An entry the scan could not use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: Option<PathBuf>,
    pub reason: String,
}

/// The documents found under a workspace root.
#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    root_dir: PathBuf,
    documents: Vec<PathBuf>,
    skipped: Vec<SkippedEntry>,
}

/// One document after extraction. An unreadable document keeps its place
/// with no references and the reason in `read_error`.
#[derive(Debug, Clone)]
pub struct ScannedDocument {
    pub path: PathBuf,
    pub references: Vec<Reference>,
    pub read_error: Option<String>,
}

impl Workspace {
    /// Walks `root_dir` for files with a recognized extension, in name order.
    ///
    /// Entries that cannot be read are skipped; only an unreadable root fails.
    /// With `enforce_home_boundary` on, symlinked documents pointing outside
    /// the home directory and the root are skipped too.
    pub fn discover(settings: &Settings, root_dir: &Path) -> Result<Workspace, GraphError> {
        Self::discover_within(settings, root_dir, settings.home_boundary())
    }

    /// [`Workspace::discover`] with an explicit boundary for symlinked
    /// documents. The root itself is always admitted.
    pub fn discover_within(
        settings: &Settings,
        root_dir: &Path,
        boundary: Option<Boundary>,
    ) -> Result<Workspace, GraphError> {
        let root_dir = std::fs::canonicalize(root_dir).map_err(|source| {
            GraphError::RootUnreadable {
                path: root_dir.to_path_buf(),
                source,
            }
        })?;
        std::fs::read_dir(&root_dir).map_err(|source| GraphError::RootUnreadable {
            path: root_dir.clone(),
            source,
        })?;

        let boundary = boundary.map(|mut boundary| {
            boundary.allow(&root_dir);
            boundary
        });

        let mut walker = WalkDir::new(&root_dir).sort_by_file_name();
        if let Some(depth) = settings.scan_depth {
            walker = walker.max_depth(depth + 1);
        }

        let ignore_hidden = settings.ignore_hidden;
        let mut documents = Vec::new();
        let mut skipped = Vec::new();

        for entry in walker.into_iter().filter_entry(|e| {
            e.depth() == 0
                || !ignore_hidden
                || !e
                    .file_name()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
        }) {
            match entry {
                Ok(entry) => {
                    let linked = entry.path_is_symlink() && entry.path().is_file();
                    let is_file = entry.file_type().is_file() || linked;
                    if !is_file || !is_document_path(entry.path(), &settings.extensions) {
                        continue;
                    }

                    if linked && !boundary.as_ref().map_or(true, |b| b.contains(entry.path())) {
                        debug!(path = %entry.path().display(), "symlink leaves the boundary");
                        skipped.push(SkippedEntry {
                            path: Some(entry.into_path()),
                            reason: "symlink target outside the home directory and workspace root".to_string(),
                        });
                        continue;
                    }

                    documents.push(entry.into_path());
                }
                Err(err) => {
                    warn!(path = ?err.path(), error = %err, "skipping unreadable entry");
                    skipped.push(SkippedEntry {
                        path: err.path().map(Path::to_path_buf),
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(root = %root_dir.display(), documents = documents.len(), "discovered workspace");

        Ok(Workspace {
            root_dir,
            documents,
            skipped,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn documents(&self) -> &[PathBuf] {
        &self.documents
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Reads and extracts every document in parallel, preserving discovery order.
    pub fn scan(&self, settings: &Settings, source: &dyn DocumentSource) -> Vec<ScannedDocument> {
        self.documents
            .par_iter()
            .map(|path| match source.read(path) {
                Ok(text) => ScannedDocument {
                    path: path.clone(),
                    references: document_references(settings, &text, path),
                    read_error: None,
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read document");
                    ScannedDocument {
                        path: path.clone(),
                        references: Vec::new(),
                        read_error: Some(err.to_string()),
                    }
                }
            })
            .collect()
    }
}
