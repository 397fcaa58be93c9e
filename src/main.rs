use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gerrit_threads::cli::{self, Commands};
use gerrit_threads::context::ReviewContext;
use gerrit_threads::git::{default_db_path, find_repo_root, get_current_branch};
use gerrit_threads::gitreview::{FsWorkspace, GIT_REVIEW_FILE};
use gerrit_threads::host::MemoryThread;
use gerrit_threads::state::{CommentDb, draft_id, unix_now};
use gerrit_threads::thread::CollapsibleState;
use gerrit_threads::tui::{App, run_tui};
use gerrit_threads::{Comment, CommentRange, CommentSide};

const DONE_MESSAGE: &str = "Done";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::parse_args();
    init_tracing(args.verbose);

    match args.command {
        Commands::Config(config_args) => {
            handle_config(config_args.roots).await?;
        }
        Commands::Threads(threads_args) => {
            let db = open_db(args.db.as_deref())?;
            handle_threads(&db, &threads_args.file)?;
        }
        Commands::Comment(comment_args) => {
            let mut db = open_db(args.db.as_deref())?;
            let comment = match comment_args.reply_to.as_deref() {
                Some(parent_id) => {
                    let parent = db
                        .get(parent_id)?
                        .with_context(|| format!("No comment with id {}", parent_id))?;
                    reply_to(
                        &parent,
                        &comment_args.author,
                        &comment_args.message,
                        !comment_args.resolved,
                    )
                }
                None => Comment {
                    id: draft_id(&comment_args.file, comment_args.line, &comment_args.message),
                    path: comment_args.file.clone(),
                    side: comment_args.side.into(),
                    range: CommentRange::line(comment_args.line),
                    author: comment_args.author.clone(),
                    message: comment_args.message.clone(),
                    draft: true,
                    unresolved: !comment_args.resolved,
                    in_reply_to: None,
                    updated_at: unix_now(),
                },
            };
            db.upsert(&comment)?;
            println!(
                "✓ Draft {} saved on {}:{} ({})",
                comment.id, comment.path, comment.range.start_line, comment.side
            );
        }
        Commands::Done(done_args) => {
            let mut db = open_db(args.db.as_deref())?;
            let parent = db
                .get(&done_args.comment_id)?
                .with_context(|| format!("No comment with id {}", done_args.comment_id))?;
            let reply = reply_to(&parent, "me", DONE_MESSAGE, false);
            db.upsert(&reply)?;
            println!("✓ Draft {} resolves the thread of {}", reply.id, parent.id);
        }
        Commands::Discard(discard_args) => {
            let mut db = open_db(args.db.as_deref())?;
            if !db.delete_draft(&discard_args.comment_id)? {
                bail!("No comment with id {}", discard_args.comment_id);
            }
            println!("✓ Draft {} discarded", discard_args.comment_id);
        }
        Commands::Publish(publish_args) => {
            let mut db = open_db(args.db.as_deref())?;
            let count = match publish_args.file.as_deref() {
                Some(file) => db.publish_file(file)?,
                None => db.publish_all()?,
            };
            println!("✓ Published {} drafts", count);
        }
        Commands::Browse => {
            let db = open_db(args.db.as_deref())?;
            let app = App::new(db, "me".to_string())?;
            run_tui(app)?;
        }
    }

    Ok(())
}

/// Log to stderr; `-v` enables debug output and `RUST_LOG` overrides both.
fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();
}

/// Print the `.gitreview` settings of the first root that has a valid one.
async fn handle_config(roots: Vec<PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let repo_root = find_repo_root(&cwd).ok();

    let roots = if roots.is_empty() {
        vec![repo_root.clone().unwrap_or(cwd)]
    } else {
        roots
    };

    let workspace = FsWorkspace::new(roots.clone());
    let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
    let Some(file) = ctx.git_review(&workspace).await else {
        let searched: Vec<String> = roots.iter().map(|r| r.display().to_string()).collect();
        bail!("No valid {} found in {}", GIT_REVIEW_FILE, searched.join(", "));
    };
    let settings = file.resolve();

    println!("host:          {}", settings.host);
    println!("project:       {}", settings.project);
    println!("port:          {}", settings.port);
    println!("branch:        {}", settings.branch);
    println!("remote:        {}", settings.remote);
    println!("defaultbranch: {}", settings.default_branch);
    println!("defaultremote: {}", settings.default_remote);
    for (key, value) in &file.extra {
        println!("{:<14} {}", format!("{}:", key), value);
    }

    if let Some(root) = repo_root
        && let Ok(Some(branch)) = get_current_branch(&root)
    {
        println!("\ncurrent branch: {}", branch);
    }

    Ok(())
}

/// Print every thread of a file, both sides, the way a host would show them.
fn handle_threads(db: &CommentDb, file: &str) -> Result<()> {
    let comments = db.comments_for_file(file).context("Failed to load comments")?;
    if comments.is_empty() {
        println!("No comments on {}", file);
        return Ok(());
    }

    let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
    let managers = [CommentSide::Parent, CommentSide::Revision].map(|side| {
        let manager = ctx.open_file(file, side, comments.clone(), MemoryThread::new);
        (side, manager)
    });

    for (side, manager) in managers {
        let threads = ctx.threads_in(manager);
        if threads.is_empty() {
            continue;
        }
        println!("{} ({})", file, side);
        println!("─────────────────────────────────────");

        for thread in threads {
            let state = match thread.collapsible_state() {
                Some(CollapsibleState::Expanded) => "expanded",
                _ => "collapsed",
            };
            let reply = if thread.can_reply() {
                ""
            } else {
                "  (draft pending)"
            };
            println!(
                "#{} L{}  {}  [{}]{}",
                thread.id(),
                thread.range().start_line,
                thread.label(),
                state,
                reply
            );
            for comment in thread.comments() {
                let draft = if comment.draft { " [draft]" } else { "" };
                println!(
                    "    {} {}: {}{}",
                    comment.id, comment.author, comment.message, draft
                );
            }
        }
        println!();
    }

    Ok(())
}

/// Build a draft reply at the parent's position.
fn reply_to(parent: &Comment, author: &str, message: &str, unresolved: bool) -> Comment {
    Comment {
        id: draft_id(&parent.path, parent.range.start_line, message),
        path: parent.path.clone(),
        side: parent.side,
        range: parent.range,
        author: author.to_string(),
        message: message.to_string(),
        draft: true,
        unresolved,
        in_reply_to: Some(parent.id.clone()),
        updated_at: unix_now(),
    }
}

/// Open the comment database, creating its directory if needed.
fn open_db(explicit: Option<&Path>) -> Result<CommentDb> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let repo_root = find_repo_root(&cwd).context("Not in a git repository (use --db)")?;
            default_db_path(&repo_root)
        }
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    CommentDb::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}
