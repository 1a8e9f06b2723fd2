//! Preview rendering with `[[!target]]` inclusions expanded inline.
//!
//! Inclusion and wiki tokens are swapped for placeholders before the
//! markdown pass and substituted in the generated HTML afterwards, so the
//! included HTML is never re-parsed as markdown. A token counts as code when
//! its placeholder lands inside a `<code>` element. Targets resolve against the
//! live filesystem; the scanned graph is not consulted and no graph lock is
//! taken.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::documents::{DocumentSource, FsDocuments};
use crate::error::GraphError;
use crate::paths::{normalize, CanonicalPath};
use crate::resolve::{ResolvedTarget, TargetResolver};
use crate::vault::{extract_references, Reference, ReferenceKind};

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InclusionStatus {
    Included { path: PathBuf },
    NotFound,
    /// The target is already being expanded further up.
    Circular { path: PathBuf },
    DepthExceeded { limit: usize },
    ReadFailed { path: PathBuf, reason: String },
}

/// What happened to one inclusion link during rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InclusionOutcome {
    /// Document containing the inclusion link
    pub source: PathBuf,
    pub raw_target: String,
    /// 1 for inclusions in the rendered document itself, 2 for theirs, ...
    pub depth: usize,
    /// Substituted as escaped raw text inside code instead of rendered
    pub in_code_block: bool,
    pub status: InclusionStatus,
}

impl InclusionOutcome {
    pub fn is_error(&self) -> bool {
        !matches!(self.status, InclusionStatus::Included { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub path: PathBuf,
    pub html: String,
    /// In document order, nested inclusions right after their parent
    pub inclusions: Vec<InclusionOutcome>,
}

impl RenderedDocument {
    pub fn errors(&self) -> impl Iterator<Item = &InclusionOutcome> + '_ {
        self.inclusions.iter().filter(|outcome| outcome.is_error())
    }
}

/// Renders documents to HTML, expanding inclusions recursively.
pub struct InclusionResolver {
    resolver: TargetResolver,
    source: Arc<dyn DocumentSource>,
    max_depth: usize,
}

impl InclusionResolver {
    pub fn new(settings: &Settings) -> Self {
        Self::with_source(settings, Arc::new(FsDocuments))
    }

    pub fn with_source(settings: &Settings, source: Arc<dyn DocumentSource>) -> Self {
        InclusionResolver {
            resolver: TargetResolver::new(settings),
            source,
            max_depth: settings.max_inclusion_depth,
        }
    }

    /// Renders `path` with the configured maximum depth.
    pub fn render(&self, path: &Path) -> Result<RenderedDocument, GraphError> {
        self.render_with_inclusions(path, self.max_depth)
    }

    /// Renders `path`. Only failing to read `path` itself is an error;
    /// every inclusion problem becomes an inline error block.
    pub fn render_with_inclusions(
        &self,
        path: &Path,
        max_depth: usize,
    ) -> Result<RenderedDocument, GraphError> {
        let text = self.source.read(path).map_err(|source| GraphError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.render_text(&text, path, max_depth))
    }

    /// Renders `text` as if it were the content of `document`.
    pub fn render_text(&self, text: &str, document: &Path, max_depth: usize) -> RenderedDocument {
        let mut expansion = Expansion {
            resolver: self,
            max_depth,
            stack: vec![normalize(document)],
            outcomes: Vec::new(),
        };
        let html = expansion.render(text, document, 0);

        RenderedDocument {
            path: document.to_path_buf(),
            html,
            inclusions: expansion.outcomes,
        }
    }
}

enum Replacement {
    /// Stands alone in a paragraph when possible
    Block(String),
    Inline(String),
}

struct Expansion<'a> {
    resolver: &'a InclusionResolver,
    max_depth: usize,
    /// Documents on the active expansion path
    stack: Vec<CanonicalPath>,
    outcomes: Vec<InclusionOutcome>,
}

impl Expansion<'_> {
    fn render(&mut self, text: &str, document: &Path, depth: usize) -> String {
        let references = extract_references(text)
            .into_iter()
            .filter(|reference| reference.kind.is_wiki())
            .collect_vec();

        let mut source = String::with_capacity(text.len());
        let mut cursor = 0;
        for (idx, reference) in references.iter().enumerate() {
            source.push_str(&text[cursor..reference.byte_offset]);
            source.push_str(&placeholder(idx));
            cursor = reference.byte_range().end;
        }
        source.push_str(&text[cursor..]);

        let mut html = render_markdown(&source);

        // fenced, indented and inline code all end up inside <code>
        let code = code_regions(&html);
        let in_code = (0..references.len())
            .map(|idx| {
                html.find(&placeholder(idx))
                    .is_some_and(|pos| code.iter().any(|region| region.contains(&pos)))
            })
            .collect_vec();

        let mut replacements = Vec::with_capacity(references.len());
        for (reference, in_code) in references.iter().zip(in_code) {
            let replacement = match (reference.kind, in_code) {
                (ReferenceKind::InclusionLink, true) => {
                    Replacement::Inline(escape_html(&self.raw_text(reference, document, depth)))
                }
                (ReferenceKind::InclusionLink, false) => {
                    Replacement::Block(self.include(reference, document, depth))
                }
                (_, true) => Replacement::Inline(escape_html(&text[reference.byte_range()])),
                (_, false) => Replacement::Inline(wiki_anchor(reference)),
            };
            replacements.push(replacement);
        }

        for (idx, replacement) in replacements.into_iter().enumerate() {
            let token = placeholder(idx);
            match replacement {
                Replacement::Block(block) => {
                    let paragraph = format!("<p>{token}</p>");
                    if html.contains(&paragraph) {
                        html = html.replacen(&paragraph, &block, 1);
                    } else {
                        html = html.replacen(&token, &block, 1);
                    }
                }
                Replacement::Inline(inline) => {
                    html = html.replacen(&token, &inline, 1);
                }
            }
        }

        html
    }

    fn record(
        &mut self,
        reference: &Reference,
        document: &Path,
        depth: usize,
        in_code: bool,
        status: InclusionStatus,
    ) {
        self.outcomes.push(InclusionOutcome {
            source: document.to_path_buf(),
            raw_target: reference.raw_target.clone(),
            depth: depth + 1,
            in_code_block: in_code,
            status,
        });
    }

    /// Rendered, wrapped content of the target, or an error block.
    fn include(&mut self, reference: &Reference, document: &Path, depth: usize) -> String {
        let target = &reference.raw_target;

        let path = match self.resolver.resolver.resolve(target, document) {
            ResolvedTarget::Found(path) => path,
            ResolvedTarget::NotFound => {
                debug!(inclusion = %target, document = %document.display(), "inclusion target not found");
                self.record(reference, document, depth, false, InclusionStatus::NotFound);
                return error_block(&format!("File not found: {target}"));
            }
        };

        let key = normalize(&path);
        if self.stack.contains(&key) {
            debug!(inclusion = %target, document = %document.display(), "circular inclusion");
            self.record(
                reference,
                document,
                depth,
                false,
                InclusionStatus::Circular { path },
            );
            return error_block(&format!("Circular inclusion: {target}"));
        }

        if depth + 1 > self.max_depth {
            warn!(inclusion = %target, limit = self.max_depth, "inclusion depth exceeded");
            self.record(
                reference,
                document,
                depth,
                false,
                InclusionStatus::DepthExceeded {
                    limit: self.max_depth,
                },
            );
            return error_block(&format!(
                "Maximum inclusion depth ({}) exceeded: {target}",
                self.max_depth
            ));
        }

        let text = match self.resolver.source.read(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read inclusion target");
                self.record(
                    reference,
                    document,
                    depth,
                    false,
                    InclusionStatus::ReadFailed {
                        path,
                        reason: err.to_string(),
                    },
                );
                return error_block(&format!("Cannot read file: {target} ({err})"));
            }
        };

        self.record(
            reference,
            document,
            depth,
            false,
            InclusionStatus::Included { path: path.clone() },
        );

        self.stack.push(key);
        let inner = self.render(&text, &path, depth + 1);
        self.stack.pop();

        let provenance = escape_html(&path.display().to_string());
        format!(
            "<!-- begin inclusion: {provenance} -->\n\
             <div class=\"included-content\"><div class=\"inclusion-title\">{}</div>\n\
             {inner}</div>\n\
             <!-- end inclusion: {provenance} -->\n",
            escape_html(&reference.display_text),
        )
    }

    /// The target's text as-is for substitution inside code, or an error line.
    fn raw_text(&mut self, reference: &Reference, document: &Path, depth: usize) -> String {
        let target = &reference.raw_target;

        match self.resolver.resolver.resolve(target, document) {
            ResolvedTarget::Found(path) => match self.resolver.source.read(&path) {
                Ok(text) => {
                    self.record(reference, document, depth, true, InclusionStatus::Included { path });
                    text
                }
                Err(err) => {
                    let message = format!("Error: Cannot read file: {target} ({err})");
                    self.record(
                        reference,
                        document,
                        depth,
                        true,
                        InclusionStatus::ReadFailed {
                            path,
                            reason: err.to_string(),
                        },
                    );
                    message
                }
            },
            ResolvedTarget::NotFound => {
                self.record(reference, document, depth, true, InclusionStatus::NotFound);
                format!("Error: File not found: {target}")
            }
        }
    }
}

fn placeholder(idx: usize) -> String {
    format!("{PLACEHOLDER_OPEN}{idx}{PLACEHOLDER_CLOSE}")
}

fn render_markdown(source: &str) -> String {
    markdown::to_html_with_options(source, &markdown::Options::gfm())
        .unwrap_or_else(|_| markdown::to_html(source))
}

/// Byte ranges of `<code>` elements in rendered HTML.
fn code_regions(html: &str) -> Vec<Range<usize>> {
    static CODE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)<code[\s>].*?</code>").expect("code element regex"));

    CODE_RE.find_iter(html).map(|found| found.range()).collect()
}

fn wiki_anchor(reference: &Reference) -> String {
    format!(
        "<a href=\"wiki:{}\" class=\"wiki-link\">{}</a>",
        escape_html(&reference.raw_target),
        escape_html(&reference.display_text)
    )
}

fn error_block(message: &str) -> String {
    format!(
        "<div class=\"inclusion-error\"><strong>Inclusion Error:</strong> {}</div>\n",
        escape_html(message)
    )
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
