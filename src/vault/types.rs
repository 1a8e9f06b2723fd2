//! Core types for vault data structures.
//!
//! This module contains fundamental types used throughout the vault system:
//! - `Position` / `MyRange`: line and character spans for editor consumers
//! - `HeadingLevel` / `MDHeading`: parsed headings for the outline
//! - `Rangeable`: anything occupying a span of a document

use std::ops::Range;

use ropey::Rope;
use serde::{Deserialize, Serialize};

/// A zero-based line and character (Unicode scalar) position.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// A line/character span in a document.
///
/// Byte offsets are what the extractor and the rewrite logic work with; this
/// is the editor-facing view of the same span.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct MyRange {
    pub start: Position,
    pub end: Position,
}

impl MyRange {
    /// Creates a `MyRange` from a byte offset range using rope for position calculation.
    pub fn from_range(rope: &Rope, range: Range<usize>) -> MyRange {
        // convert from byte offset to char offset
        let char_start = rope.byte_to_char(range.start);
        let char_end = rope.byte_to_char(range.end);

        let start_line = rope.char_to_line(char_start);
        let start_offset = char_start - rope.line_to_char(start_line);

        let end_line = rope.char_to_line(char_end);
        let end_offset = char_end - rope.line_to_char(end_line);

        MyRange {
            start: Position {
                line: start_line as u32,
                character: start_offset as u32,
            },
            end: Position {
                line: end_line as u32,
                character: end_offset as u32,
            },
        }
    }
}

/// Represents a Markdown heading level (1-6).
#[derive(Eq, PartialEq, Debug, PartialOrd, Ord, Clone, Copy, Hash, Serialize)]
pub struct HeadingLevel(pub usize);

impl Default for HeadingLevel {
    fn default() -> Self {
        HeadingLevel(1)
    }
}

/// A parsed Markdown heading with text, position range, and heading level.
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize)]
pub struct MDHeading {
    pub heading_text: String,
    pub range: MyRange,
    pub level: HeadingLevel,
}

impl std::hash::Hash for MDHeading {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.level.hash(state);
        self.heading_text.hash(state)
    }
}

/// Trait for types that have a range (position span in the document).
pub trait Rangeable {
    fn range(&self) -> &MyRange;

    fn includes(&self, other: &impl Rangeable) -> bool {
        let self_range = self.range();
        let other_range = other.range();

        self_range.start <= other_range.start && self_range.end >= other_range.end
    }

    fn includes_position(&self, position: Position) -> bool {
        let range = self.range();
        range.start <= position && range.end >= position
    }
}

impl Rangeable for MDHeading {
    fn range(&self) -> &MyRange {
        &self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_from_bytes_counts_characters_not_bytes() {
        let text = "héllo\n[[x]]";
        let rope = Rope::from_str(text);
        let start = text.find("[[").unwrap();

        let range = MyRange::from_range(&rope, start..text.len());

        assert_eq!(range.start, Position { line: 1, character: 0 });
        assert_eq!(range.end, Position { line: 1, character: 5 });

        let first = MyRange::from_range(&rope, 0..6);
        assert_eq!(first.end, Position { line: 0, character: 5 });
    }

    #[test]
    fn includes_compares_line_then_character() {
        let outer = MDHeading {
            range: MyRange {
                start: Position { line: 1, character: 0 },
                end: Position { line: 3, character: 2 },
            },
            ..Default::default()
        };
        let inner = MDHeading {
            range: MyRange {
                start: Position { line: 2, character: 9 },
                end: Position { line: 3, character: 1 },
            },
            ..Default::default()
        };

        assert!(outer.includes(&inner));
        assert!(!inner.includes(&outer));
        assert!(outer.includes_position(Position { line: 1, character: 40 }));
        assert!(!outer.includes_position(Position { line: 3, character: 3 }));
    }
}
