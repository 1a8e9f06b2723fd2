//! Line classifiers for headers, list items and task items, plus a
//! fence-aware outline built from them.

use once_cell::sync::Lazy;
use regex::Regex;
use ropey::Rope;
use serde::Serialize;

use crate::vault::{in_code_block, HeadingLevel, MDCodeBlock, MDHeading, MyRange};

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?<hashes>#{1,6})\s+(?<text>.+)$").expect("header regex"));

static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?<indent>\s*)(?<marker>[-*+]|[0-9]+\.)\s+").expect("list item regex")
});

static TASK_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?<indent>\s*)(?<marker>[-*+])\s+\[(?<state>[ xX.]?)\]\s*")
        .expect("task item regex")
});

static TASK_CHECKBOX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-*+] \[(?<state>[ xX.]?)\]").expect("task checkbox regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderLine {
    pub level: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub indent: String,
    pub marker: String,
    pub content: String,
    pub ordered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// `[ ]` or `[]`
    Open,
    /// `[x]` or `[X]`
    Done,
    /// `[.]`
    InProgress,
}

impl TaskState {
    fn from_marker(marker: &str) -> TaskState {
        match marker {
            "x" | "X" => TaskState::Done,
            "." => TaskState::InProgress,
            _ => TaskState::Open,
        }
    }

    /// Done and in-progress tasks both count as checked.
    pub fn is_checked(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskItem {
    pub indent: String,
    pub marker: String,
    pub state: TaskState,
    pub content: String,
}

/// `## Text` -> level 2, "Text". Up to six hashes followed by whitespace.
pub fn parse_header(line: &str) -> Option<HeaderLine> {
    let captures = HEADER_RE.captures(line.trim_end_matches(['\n', '\r']))?;
    let text = captures.name("text")?.as_str().trim();
    if text.is_empty() {
        return None;
    }

    Some(HeaderLine {
        level: captures.name("hashes")?.as_str().len(),
        text: text.to_string(),
    })
}

pub fn is_header(line: &str) -> bool {
    parse_header(line).is_some()
}

/// Bullet (`-`, `*`, `+`) or numbered (`1.`) list item.
pub fn parse_list_item(line: &str) -> Option<ListItem> {
    let captures = LIST_ITEM_RE.captures(line)?;
    let marker = captures.name("marker")?.as_str();
    let content_start = captures.get(0)?.end();

    Some(ListItem {
        indent: captures.name("indent")?.as_str().to_string(),
        ordered: marker.ends_with('.'),
        marker: marker.to_string(),
        content: line[content_start..].trim().to_string(),
    })
}

pub fn is_list_item(line: &str) -> bool {
    LIST_ITEM_RE.is_match(line)
}

pub fn is_ordered_list_item(line: &str) -> bool {
    parse_list_item(line).is_some_and(|item| item.ordered)
}

pub fn is_unordered_list_item(line: &str) -> bool {
    parse_list_item(line).is_some_and(|item| !item.ordered)
}

/// `- [x] done` style items.
pub fn parse_task_item(line: &str) -> Option<TaskItem> {
    let captures = TASK_ITEM_RE.captures(line)?;
    let content_start = captures.get(0)?.end();

    Some(TaskItem {
        indent: captures.name("indent")?.as_str().to_string(),
        marker: captures.name("marker")?.as_str().to_string(),
        state: TaskState::from_marker(captures.name("state")?.as_str()),
        content: line[content_start..].trim().to_string(),
    })
}

pub fn is_task_item(line: &str) -> bool {
    TASK_ITEM_RE.is_match(line)
}

/// State of the first checkbox on the line, wherever it sits.
pub fn task_state(line: &str) -> Option<TaskState> {
    TASK_CHECKBOX_RE
        .captures(line)
        .and_then(|captures| captures.name("state"))
        .map(|state| TaskState::from_marker(state.as_str()))
}

pub fn is_task_checked(line: &str) -> bool {
    task_state(line).is_some_and(|state| state.is_checked())
}

/// Headings of a document in order, skipping `#` lines inside code fences.
pub fn outline(text: &str) -> Vec<MDHeading> {
    let rope = Rope::from_str(text);
    let blocks = MDCodeBlock::new(text).collect::<Vec<_>>();

    let mut headings = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        if in_code_block(&blocks, start) {
            continue;
        }
        if let Some(header) = parse_header(line) {
            let end = start + line.trim_end_matches(['\n', '\r']).len();
            headings.push(MDHeading {
                heading_text: header.text,
                range: MyRange::from_range(&rope, start..end),
                level: HeadingLevel(header.level),
            });
        }
    }

    headings
}
