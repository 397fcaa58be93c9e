pub mod cli;
pub mod context;
pub mod git;
pub mod gitreview;
pub mod host;
pub mod manager;
pub mod state;
pub mod thread;
pub mod tui;

use std::fmt;

/// Which version of a file a comment is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentSide {
    Parent,
    Revision,
}

impl CommentSide {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentSide::Parent => "PARENT",
            CommentSide::Revision => "REVISION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PARENT" => Some(CommentSide::Parent),
            "REVISION" => Some(CommentSide::Revision),
            _ => None,
        }
    }
}

impl fmt::Display for CommentSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a comment inside a file. Lines are 1-based, characters 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommentRange {
    pub start_line: u32,
    pub start_character: u32,
    pub end_line: u32,
    pub end_character: u32,
}

impl CommentRange {
    /// A range covering a whole line.
    pub fn line(line: u32) -> Self {
        Self {
            start_line: line,
            start_character: 0,
            end_line: line,
            end_character: 0,
        }
    }
}

/// A single review comment, either a local draft or a published one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub path: String,
    pub side: CommentSide,
    pub range: CommentRange,
    pub author: String,
    pub message: String,
    pub draft: bool,
    pub unresolved: bool,
    pub in_reply_to: Option<String>,
    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

impl Comment {
    pub fn is_draft(&self) -> bool {
        self.draft
    }
}
