//! Fenced code block detection.
//!
//! The extractor reports links regardless of fences; consumers that care
//! (highlighter, inclusion renderer, scan settings) ask these blocks whether
//! a reference falls inside one.

use std::ops::Range;

use ropey::Rope;
use serde::Serialize;

use super::types::{MyRange, Rangeable};
use super::Reference;

#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize)]
pub struct MDCodeBlock {
    /// Info string after the opening fence, if any (`rust` in ```` ```rust ````)
    pub lang: Option<String>,
    /// From the first byte of the opening fence line to the end of the closing fence line
    pub byte_range: Range<usize>,
    pub range: MyRange,
}

struct OpenFence {
    marker: char,
    len: usize,
    start: usize,
    lang: Option<String>,
}

impl MDCodeBlock {
    pub fn new(text: &str) -> impl Iterator<Item = MDCodeBlock> {
        let rope = Rope::from_str(text);
        let mut blocks = Vec::new();
        let mut open: Option<OpenFence> = None;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();

            let Some((marker, len, info)) = fence_of(line) else {
                continue;
            };

            let closes = open.as_ref().map(|fence| {
                marker == fence.marker && len >= fence.len && info.trim().is_empty()
            });

            match closes {
                None => {
                    open = Some(OpenFence {
                        marker,
                        len,
                        start: line_start,
                        lang: Some(info.trim().to_string()).filter(|info| !info.is_empty()),
                    });
                }
                Some(true) => {
                    if let Some(fence) = open.take() {
                        blocks.push(Self::closed(&rope, fence, offset));
                    }
                }
                Some(false) => {}
            }
        }

        // an unterminated fence runs to the end of the document
        if let Some(fence) = open.take() {
            blocks.push(Self::closed(&rope, fence, text.len()));
        }

        blocks.into_iter()
    }

    fn closed(rope: &Rope, fence: OpenFence, end: usize) -> MDCodeBlock {
        MDCodeBlock {
            lang: fence.lang,
            byte_range: fence.start..end,
            range: MyRange::from_range(rope, fence.start..end),
        }
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        self.byte_range.contains(&offset)
    }

    pub fn includes_reference(&self, reference: &Reference) -> bool {
        self.byte_range.start <= reference.byte_offset
            && reference.byte_offset + reference.byte_length <= self.byte_range.end
    }
}

impl Rangeable for MDCodeBlock {
    fn range(&self) -> &MyRange {
        &self.range
    }
}

/// Returns `(marker, fence length, info string)` when `line` is a code fence line.
fn fence_of(line: &str) -> Option<(char, usize, &str)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }

    let rest = &line[indent..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }

    let info = &rest[len..];
    // backtick fences may not carry backticks in their info string
    if marker == '`' && info.contains('`') {
        return None;
    }

    Some((marker, len, info))
}

/// Returns whether `offset` lies inside any of `blocks`.
pub fn in_code_block(blocks: &[MDCodeBlock], offset: usize) -> bool {
    blocks.iter().any(|block| block.contains_offset(offset))
}
