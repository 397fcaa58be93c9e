use crate::{Comment, CommentRange, CommentSide};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during comment store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("comment {0} is already published")]
    NotADraft(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

const COMMENT_COLUMNS: &str = "id, path, side, start_line, start_character, end_line, end_character,
     author, message, draft, unresolved, in_reply_to, updated_at";

/// Per-file comment counts, for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: String,
    pub comments: usize,
    pub drafts: usize,
}

/// SQLite-backed store of review comments.
///
/// Drafts live here until published; published comments are kept so
/// threads can be rebuilt offline.
pub struct CommentDb {
    conn: Connection,
}

impl CommentDb {
    /// Open or create the comment database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                side TEXT NOT NULL DEFAULT 'REVISION',
                start_line INTEGER NOT NULL,
                start_character INTEGER NOT NULL DEFAULT 0,
                end_line INTEGER NOT NULL,
                end_character INTEGER NOT NULL DEFAULT 0,
                author TEXT NOT NULL,
                message TEXT NOT NULL,
                draft INTEGER NOT NULL DEFAULT 1,
                unresolved INTEGER NOT NULL DEFAULT 0,
                in_reply_to TEXT,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Insert a comment or overwrite the one with the same id.
    pub fn upsert(&mut self, comment: &Comment) -> Result<()> {
        self.conn.execute(
            "INSERT INTO comments (id, path, side, start_line, start_character, end_line,
                 end_character, author, message, draft, unresolved, in_reply_to, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                 path = ?2, side = ?3, start_line = ?4, start_character = ?5, end_line = ?6,
                 end_character = ?7, author = ?8, message = ?9, draft = ?10, unresolved = ?11,
                 in_reply_to = ?12, updated_at = ?13",
            params![
                comment.id,
                comment.path,
                comment.side,
                comment.range.start_line,
                comment.range.start_character,
                comment.range.end_line,
                comment.range.end_character,
                comment.author,
                comment.message,
                comment.draft,
                comment.unresolved,
                comment.in_reply_to,
                comment.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS);
        let comment = self
            .conn
            .query_row(&sql, params![id], row_to_comment)
            .optional()?;
        Ok(comment)
    }

    /// Delete a draft. Returns `false` if no comment has that id.
    pub fn delete_draft(&mut self, id: &str) -> Result<bool> {
        match self.get(id)? {
            None => Ok(false),
            Some(c) if !c.draft => Err(StateError::NotADraft(id.to_string())),
            Some(_) => {
                self.conn
                    .execute("DELETE FROM comments WHERE id = ?1", params![id])?;
                Ok(true)
            }
        }
    }

    /// All comments on a file, oldest first.
    pub fn comments_for_file(&self, path: &str) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE path = ?1 ORDER BY updated_at, id",
            COMMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let comments = stmt
            .query_map(params![path], row_to_comment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    /// Every unpublished comment, grouped by file.
    pub fn drafts(&self) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE draft = 1 ORDER BY path, updated_at, id",
            COMMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let comments = stmt
            .query_map([], row_to_comment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    /// Files that have comments, sorted by path.
    pub fn files(&self) -> Result<Vec<FileSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, COUNT(*), SUM(draft) FROM comments GROUP BY path ORDER BY path",
        )?;
        let files = stmt
            .query_map([], |row| {
                Ok(FileSummary {
                    path: row.get(0)?,
                    comments: row.get(1)?,
                    drafts: row.get::<_, Option<usize>>(2)?.unwrap_or(0),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Publish every draft. Returns the count of comments that changed.
    pub fn publish_all(&mut self) -> Result<usize> {
        let count = self.conn.execute(
            "UPDATE comments SET draft = 0, updated_at = ?1 WHERE draft = 1",
            params![unix_now()],
        )?;
        Ok(count)
    }

    /// Publish the drafts of one file. Returns the count of comments that changed.
    pub fn publish_file(&mut self, path: &str) -> Result<usize> {
        let count = self.conn.execute(
            "UPDATE comments SET draft = 0, updated_at = ?1 WHERE path = ?2 AND draft = 1",
            params![unix_now(), path],
        )?;
        Ok(count)
    }
}

fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        path: row.get(1)?,
        side: row.get(2)?,
        range: CommentRange {
            start_line: row.get(3)?,
            start_character: row.get(4)?,
            end_line: row.get(5)?,
            end_character: row.get(6)?,
        },
        author: row.get(7)?,
        message: row.get(8)?,
        draft: row.get(9)?,
        unresolved: row.get(10)?,
        in_reply_to: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl ToSql for CommentSide {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CommentSide {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        CommentSide::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("invalid comment side: {}", s).into()))
    }
}

/// Current time as unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Derive an id for a new draft from its content and the current time.
pub fn draft_id(path: &str, line: u32, message: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(line.to_le_bytes());
    hasher.update(message.as_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Split a flat comment list into threads.
///
/// A thread starts at a comment that replies to nothing (or to a comment
/// not in the list) and holds every transitive reply, ordered by time.
/// Threads are ordered by the line of their first comment.
pub fn group_threads(comments: Vec<Comment>) -> Vec<Vec<Comment>> {
    let ids: HashSet<String> = comments.iter().map(|c| c.id.clone()).collect();
    let mut roots = Vec::new();
    let mut replies: HashMap<String, Vec<Comment>> = HashMap::new();

    for comment in comments {
        match comment.in_reply_to.clone() {
            Some(parent) if ids.contains(&parent) && parent != comment.id => {
                replies.entry(parent).or_default().push(comment);
            }
            _ => roots.push(comment),
        }
    }

    roots.sort_by(|a, b| {
        (a.range.start_line, a.updated_at, &a.id).cmp(&(b.range.start_line, b.updated_at, &b.id))
    });

    let mut threads = Vec::with_capacity(roots.len());
    for root in roots {
        let mut pending = vec![root.id.clone()];
        let mut thread_replies = Vec::new();
        while let Some(parent) = pending.pop() {
            if let Some(children) = replies.remove(&parent) {
                for child in children {
                    pending.push(child.id.clone());
                    thread_replies.push(child);
                }
            }
        }
        thread_replies.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));

        let mut thread = vec![root];
        thread.extend(thread_replies);
        threads.push(thread);
    }

    // Anything left replies in a cycle and never reaches a root.
    let mut leftover: Vec<Comment> = replies.into_values().flatten().collect();
    leftover.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));
    threads.extend(leftover.into_iter().map(|c| vec![c]));

    threads
}
