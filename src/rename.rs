//! Rewrites references in open documents after a file is renamed or deleted.
//!
//! A reference matches by file name alone (case-insensitive; targets without
//! a document extension compare against the stem), since a file may be
//! referenced from anywhere. All edits for a document are computed from one
//! extraction pass and applied back to front. Rebuilding the graph afterwards
//! is up to the caller.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::Settings;
use crate::vault::{
    document_references, has_document_extension, split_extension, split_fragment,
    target_dir_prefix, target_file_name, MyRange, Reference, ReferenceKind,
};

/// A document open in the editor, edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub path: PathBuf,
    pub text: String,
}

impl OpenDocument {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        OpenDocument {
            path: path.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    /// Byte range in the original text
    pub range: Range<usize>,
    /// Line/character view of `range`
    pub position: MyRange,
    pub new_text: String,
}

/// Edits applied to one open document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentChange {
    pub path: PathBuf,
    pub edits: Vec<TextEdit>,
}

/// Rename/delete rewriting with explicit settings.
#[derive(Debug, Clone, Default)]
pub struct Propagator {
    settings: Settings,
}

struct FileName {
    name: String,
    stem: String,
}

impl FileName {
    fn of(path: &Path) -> Option<FileName> {
        let name = path.file_name()?.to_string_lossy().to_string();
        let stem = split_extension(&name).0.to_string();
        Some(FileName { name, stem })
    }

    fn matches(&self, reference: &Reference, extensions: &[String]) -> bool {
        let target = reference.target_path();
        let target_name = target_file_name(&target);
        if target_name.is_empty() {
            return false;
        }

        target_name.to_lowercase() == self.name.to_lowercase()
            || (!has_document_extension(target_name, extensions)
                && target_name.to_lowercase() == self.stem.to_lowercase())
    }
}

impl Propagator {
    pub fn new(settings: Settings) -> Self {
        Propagator { settings }
    }

    fn matching_references<'a>(
        &'a self,
        text: &str,
        path: &Path,
        file: &'a FileName,
    ) -> impl Iterator<Item = Reference> + 'a {
        document_references(&self.settings, text, path)
            .into_iter()
            .filter(move |reference| file.matches(reference, &self.settings.extensions))
    }

    /// Edits retargeting every reference to `old_path`'s file name at `new_path`'s.
    pub fn rename_edits(&self, text: &str, document: &Path, old_path: &Path, new_path: &Path) -> Vec<TextEdit> {
        let (Some(old), Some(new)) = (FileName::of(old_path), FileName::of(new_path)) else {
            return Vec::new();
        };

        let edits = self
            .matching_references(text, document, &old)
            .map(|reference| TextEdit {
                range: reference.target_span.clone(),
                position: reference.range,
                new_text: self.renamed_target(&reference.raw_target, &new),
            })
            .collect();

        sorted_back_to_front(edits)
    }

    /// `sub/Old%20Name.md#Part` -> `sub/New%20Name.md#Part`, keeping the
    /// directory prefix, fragment, escaping and extension convention.
    fn renamed_target(&self, raw_target: &str, new: &FileName) -> String {
        let (path_part, fragment) = split_fragment(raw_target);
        let prefix = target_dir_prefix(path_part);
        let old_name = target_file_name(path_part);

        let decoded_old = urlencoding::decode(old_name)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| old_name.to_string());
        let name = if has_document_extension(&decoded_old, &self.settings.extensions) {
            new.name.as_str()
        } else {
            new.stem.as_str()
        };

        // re-encode only names that were written percent-escaped
        let name = if decoded_old != old_name {
            urlencoding::encode(name).into_owned()
        } else {
            name.to_string()
        };

        match fragment {
            Some(fragment) => format!("{prefix}{name}#{fragment}"),
            None => format!("{prefix}{name}"),
        }
    }

    /// Edits removing or collapsing every reference to `deleted_path`.
    pub fn delete_edits(&self, text: &str, document: &Path, deleted_path: &Path) -> Vec<TextEdit> {
        let Some(deleted) = FileName::of(deleted_path) else {
            return Vec::new();
        };

        let edits = self
            .matching_references(text, document, &deleted)
            .map(|reference| {
                let new_text = match reference.kind {
                    ReferenceKind::InclusionLink | ReferenceKind::MarkdownImage => String::new(),
                    ReferenceKind::WikiLink if reference.has_display => {
                        reference.display_text.clone()
                    }
                    ReferenceKind::WikiLink => {
                        let target = reference.target_path();
                        split_extension(target_file_name(&target)).0.to_string()
                    }
                    ReferenceKind::MarkdownLink if reference.has_display => {
                        reference.display_text.clone()
                    }
                    ReferenceKind::MarkdownLink => String::new(),
                };

                TextEdit {
                    range: reference.byte_range(),
                    position: reference.range,
                    new_text,
                }
            })
            .collect();

        sorted_back_to_front(edits)
    }

    /// Rewrites references to `old_path` in every open document.
    ///
    /// Each document's text is edited in place; only documents that changed
    /// are reported back.
    ///
    /// # Arguments
    ///
    /// * `old_path` - Path the file had before the rename
    /// * `new_path` - Path the file has now
    /// * `open_documents` - Documents to rewrite
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut docs = vec![OpenDocument::new("/vault/index.md", "See [[Old Name]]")];
    /// let changes = Propagator::default().on_rename(
    ///     Path::new("/vault/Old Name.md"),
    ///     Path::new("/vault/New Name.md"),
    ///     &mut docs,
    /// );
    /// assert_eq!(docs[0].text, "See [[New Name]]");
    /// assert_eq!(changes.len(), 1);
    /// ```
    pub fn on_rename(
        &self,
        old_path: &Path,
        new_path: &Path,
        open_documents: &mut [OpenDocument],
    ) -> Vec<DocumentChange> {
        self.apply_all(open_documents, |propagator, document| {
            propagator.rename_edits(&document.text, &document.path, old_path, new_path)
        })
    }

    /// Strips references to `deleted_path` from every open document.
    pub fn on_delete(
        &self,
        deleted_path: &Path,
        open_documents: &mut [OpenDocument],
    ) -> Vec<DocumentChange> {
        self.apply_all(open_documents, |propagator, document| {
            propagator.delete_edits(&document.text, &document.path, deleted_path)
        })
    }

    fn apply_all(
        &self,
        open_documents: &mut [OpenDocument],
        compute: impl Fn(&Propagator, &OpenDocument) -> Vec<TextEdit>,
    ) -> Vec<DocumentChange> {
        open_documents
            .iter_mut()
            .filter_map(|document| {
                let edits = compute(self, document);
                if edits.is_empty() {
                    return None;
                }

                debug!(path = %document.path.display(), edits = edits.len(), "rewriting references");
                document.text = apply_edits(&document.text, &edits);
                Some(DocumentChange {
                    path: document.path.clone(),
                    edits,
                })
            })
            .collect()
    }
}

fn sorted_back_to_front(mut edits: Vec<TextEdit>) -> Vec<TextEdit> {
    edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    edits
}

/// Applies non-overlapping edits by descending offset so earlier offsets stay valid.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut ordered = edits.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| b.range.start.cmp(&a.range.start));

    let mut result = text.to_string();
    for edit in ordered {
        if edit.range.end <= result.len() {
            result.replace_range(edit.range.clone(), &edit.new_text);
        }
    }
    result
}

/// Rename propagation with default settings.
pub fn on_rename(
    old_path: &Path,
    new_path: &Path,
    open_documents: &mut [OpenDocument],
) -> Vec<DocumentChange> {
    Propagator::default().on_rename(old_path, new_path, open_documents)
}

/// Delete propagation with default settings.
pub fn on_delete(deleted_path: &Path, open_documents: &mut [OpenDocument]) -> Vec<DocumentChange> {
    Propagator::default().on_delete(deleted_path, open_documents)
}
