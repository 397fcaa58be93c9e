use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::CommentSide;

#[derive(Parser, Debug)]
#[command(
    name = "gerrit-threads",
    about = "Gerrit-style review comment threads for a local checkout"
)]
pub struct Cli {
    /// Comment database (defaults to .git/gerrit-threads/comments.db in the repository).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the review host settings found in .gitreview.
    Config(ConfigArgs),
    /// List the comment threads of a file.
    Threads(ThreadsArgs),
    /// Add a draft comment (or a reply to an existing comment).
    Comment(CommentArgs),
    /// Reply "Done" to a comment, resolving its thread.
    Done(DoneArgs),
    /// Delete a draft comment.
    Discard(DiscardArgs),
    /// Publish draft comments.
    Publish(PublishArgs),
    /// Browse comment threads interactively.
    Browse,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Workspace root to search, in order (repeatable). Defaults to the repository root.
    #[arg(long = "root")]
    pub roots: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ThreadsArgs {
    /// File path, relative to the repository root.
    pub file: String,
}

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// File path, relative to the repository root.
    pub file: String,

    /// Comment text.
    pub message: String,

    /// Line to attach the comment to (ignored for replies).
    #[arg(short, long, default_value = "1")]
    pub line: u32,

    /// Version of the file the line refers to (ignored for replies).
    #[arg(long, value_enum, default_value = "revision")]
    pub side: SideArg,

    /// Id of the comment being replied to.
    #[arg(long)]
    pub reply_to: Option<String>,

    /// Mark the thread resolved with this comment.
    #[arg(long)]
    pub resolved: bool,

    /// Author name recorded on the comment.
    #[arg(long, default_value = "me")]
    pub author: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum SideArg {
    /// The file before the change.
    Parent,
    /// The file as changed.
    Revision,
}

impl From<SideArg> for CommentSide {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Parent => CommentSide::Parent,
            SideArg::Revision => CommentSide::Revision,
        }
    }
}

#[derive(Args, Debug)]
pub struct DoneArgs {
    /// Id of the comment to reply to.
    pub comment_id: String,
}

#[derive(Args, Debug)]
pub struct DiscardArgs {
    /// Id of the draft to delete.
    pub comment_id: String,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Publish only drafts on this file.
    #[arg(short, long)]
    pub file: Option<String>,
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}
