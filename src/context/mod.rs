use crate::gitreview::{GitReviewFile, GitReviewReader, Workspace};
use crate::manager::{ManagerId, ManagerRegistry};
use crate::state::group_threads;
use crate::thread::{CollapsibleState, CommentThread, ThreadHandle, ThreadId, ThreadRegistry};
use crate::{Comment, CommentRange, CommentSide};
use tracing::debug;

/// All per-session review state: live threads, open managers and the
/// cached `.gitreview`.
///
/// Created empty with [`ReviewContext::new`]; [`ReviewContext::reset`]
/// disposes everything and returns to that state.
#[derive(Debug)]
pub struct ReviewContext<H> {
    threads: ThreadRegistry<H>,
    managers: ManagerRegistry,
    config: GitReviewReader,
}

impl<H> Default for ReviewContext<H> {
    fn default() -> Self {
        Self {
            threads: ThreadRegistry::default(),
            managers: ManagerRegistry::default(),
            config: GitReviewReader::default(),
        }
    }
}

impl<H: ThreadHandle> ReviewContext<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(&self) -> &ThreadRegistry<H> {
        &self.threads
    }

    pub fn managers(&self) -> &ManagerRegistry {
        &self.managers
    }

    /// Both registries at once, for callers driving the thread API directly.
    pub fn parts_mut(&mut self) -> (&mut ThreadRegistry<H>, &mut ManagerRegistry) {
        (&mut self.threads, &mut self.managers)
    }

    /// Show `comments` for one side of a document.
    ///
    /// Comments are grouped into threads by reply chain; one handle is made
    /// per thread. All threads are registered before any is filled so that
    /// threads sharing a line see each other on first display.
    pub fn open_file<F>(
        &mut self,
        uri: &str,
        side: CommentSide,
        comments: Vec<Comment>,
        mut make_handle: F,
    ) -> ManagerId
    where
        F: FnMut(&str, CommentRange) -> H,
    {
        let manager = self.managers.register(uri, side);

        let comments: Vec<Comment> = comments.into_iter().filter(|c| c.side == side).collect();
        let mut pending = Vec::new();
        for thread_comments in group_threads(comments) {
            let Some(first) = thread_comments.first() else {
                continue;
            };
            let handle = make_handle(uri, first.range);
            if let Some(id) = self.threads.attach(handle, manager, &mut self.managers) {
                pending.push((id, thread_comments));
            }
        }

        let count = pending.len();
        for (id, thread_comments) in pending {
            self.threads.set_comments(id, thread_comments, &mut self.managers);
        }
        debug!(uri, %side, manager = %manager, threads = count, "opened file");

        manager
    }

    /// Dispose every thread of a manager and forget the manager.
    pub fn close_file(&mut self, manager: ManagerId) -> bool {
        let Some(ids) = self.managers.get(manager).map(|m| m.threads().to_vec()) else {
            return false;
        };
        for id in ids {
            self.threads.dispose(id, &mut self.managers);
        }
        self.managers.unregister(manager).is_some()
    }

    /// Threads of a manager in display order.
    pub fn threads_in(&self, manager: ManagerId) -> Vec<&CommentThread<H>> {
        match self.managers.get(manager) {
            Some(m) => self.threads.threads_for_manager(m),
            None => Vec::new(),
        }
    }

    /// The live thread holding the comment with `comment_id`.
    pub fn thread_for_comment(&self, manager: ManagerId, comment_id: &str) -> Option<ThreadId> {
        self.threads_in(manager)
            .into_iter()
            .find(|t| t.comments().iter().any(|c| c.id == comment_id))
            .map(|t| t.id())
    }

    pub fn push_comment(&mut self, id: ThreadId, comment: Comment) -> bool {
        self.threads.push_comment(id, comment, &mut self.managers)
    }

    pub fn remove_comment(&mut self, id: ThreadId, comment_id: &str) -> bool {
        self.threads.remove_comment(id, comment_id, &mut self.managers)
    }

    pub fn toggle_collapsed(&mut self, id: ThreadId) -> Option<CollapsibleState> {
        self.threads.toggle_collapsed(id)
    }

    /// The workspace's `.gitreview`, read once and cached.
    pub async fn git_review<W>(&mut self, workspace: &W) -> Option<GitReviewFile>
    where
        W: Workspace + ?Sized,
    {
        self.config.read(workspace).await
    }

    /// Dispose all threads, drop all managers and forget the cached config.
    /// Thread ids keep counting up from where they were.
    pub fn reset(&mut self) {
        self.threads.clear(&mut self.managers);
        self.managers.clear();
        self.config.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryThread;

    fn comment(id: &str, line: u32, reply_to: Option<&str>, unresolved: bool, ts: i64) -> Comment {
        Comment {
            id: id.to_string(),
            path: "src/main.rs".to_string(),
            side: CommentSide::Revision,
            range: CommentRange::line(line),
            author: "alice".to_string(),
            message: format!("message {}", id),
            draft: false,
            unresolved,
            in_reply_to: reply_to.map(str::to_string),
            updated_at: ts,
        }
    }

    #[test]
    fn open_file_groups_by_reply_chain() {
        let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
        let comments = vec![
            comment("a", 10, None, true, 1),
            comment("b", 10, Some("a"), false, 2),
            comment("c", 20, None, true, 3),
        ];

        let manager =
            ctx.open_file("src/main.rs", CommentSide::Revision, comments, MemoryThread::new);

        let threads = ctx.threads_in(manager);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comments().len(), 2);
        assert!(threads[0].is_resolved());
        assert!(!threads[1].is_resolved());
        assert_eq!(ctx.thread_for_comment(manager, "b"), Some(threads[0].id()));
    }

    #[test]
    fn open_file_ignores_other_side() {
        let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
        let mut parent = comment("p", 1, None, true, 1);
        parent.side = CommentSide::Parent;

        let manager =
            ctx.open_file("src/main.rs", CommentSide::Revision, vec![parent], MemoryThread::new);
        assert!(ctx.threads_in(manager).is_empty());
    }

    #[test]
    fn sides_opened_one_after_the_other_agree_on_state() {
        let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
        let mut parent = comment("p", 10, None, false, 1);
        parent.side = CommentSide::Parent;
        let revision = comment("r", 10, None, false, 2);
        let comments = vec![parent, revision];

        let left = ctx.open_file("f.rs", CommentSide::Parent, comments.clone(), MemoryThread::new);
        let right = ctx.open_file("f.rs", CommentSide::Revision, comments, MemoryThread::new);

        let p = ctx.threads_in(left)[0].collapsible_state();
        let r = ctx.threads_in(right)[0].collapsible_state();
        assert_eq!(p, Some(CollapsibleState::Collapsed));
        assert_eq!(p, r);
    }

    #[test]
    fn same_side_opened_twice_expands_both_copies() {
        let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
        let comments = vec![comment("a", 10, None, false, 1)];

        let side = CommentSide::Revision;
        let first = ctx.open_file("f.rs", side, comments.clone(), MemoryThread::new);
        let second = ctx.open_file("f.rs", side, comments, MemoryThread::new);

        for manager in [first, second] {
            assert_eq!(
                ctx.threads_in(manager)[0].collapsible_state(),
                Some(CollapsibleState::Expanded)
            );
        }
    }

    #[test]
    fn close_file_disposes_threads() {
        let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
        let mut handles = Vec::new();
        let manager = ctx.open_file(
            "src/main.rs",
            CommentSide::Revision,
            vec![comment("a", 1, None, true, 1), comment("b", 2, None, true, 2)],
            |uri, range| {
                let handle = MemoryThread::new(uri, range);
                handles.push(handle.clone());
                handle
            },
        );

        assert!(ctx.close_file(manager));
        assert!(ctx.threads().is_empty());
        assert!(ctx.managers().is_empty());
        assert!(handles.iter().all(|h| h.dispose_count() == 1));
        assert!(!ctx.close_file(manager));
    }

    #[test]
    fn reset_disposes_everything() {
        let mut ctx: ReviewContext<MemoryThread> = ReviewContext::new();
        let observer = MemoryThread::new("x.rs", CommentRange::line(1));
        ctx.open_file("x.rs", CommentSide::Revision, vec![], MemoryThread::new);
        let (threads, managers) = ctx.parts_mut();
        let id = threads.from_handle(observer.clone(), managers).unwrap();
        threads.set_comments(id, vec![comment("a", 1, None, false, 1)], managers);

        ctx.reset();
        assert!(ctx.threads().is_empty());
        assert_eq!(observer.dispose_count(), 1);

        let manager = ctx.open_file(
            "x.rs",
            CommentSide::Revision,
            vec![comment("b", 1, None, false, 2)],
            MemoryThread::new,
        );
        assert!(ctx.threads_in(manager)[0].id() > id);
    }
}
