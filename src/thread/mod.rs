use crate::manager::{FileCommentManager, ManagerId, ManagerRegistry};
use crate::{Comment, CommentRange, CommentSide};
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tracing::debug;

pub const LABEL_RESOLVED: &str = "Comment";
pub const LABEL_UNRESOLVED: &str = "Comment (unresolved)";

const CONTEXT_SEPARATOR: char = '|';
const FLAG_UNRESOLVED: &str = "unresolved";
const FLAG_DRAFT: &str = "draft";

/// Identifier of a live thread record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapsibleState {
    Collapsed,
    Expanded,
}

/// A comment thread widget owned by the host UI.
///
/// The host object can't carry extra fields, so the only place to put our
/// identifier is the free-text context value.
pub trait ThreadHandle {
    fn uri(&self) -> String;
    fn range(&self) -> CommentRange;
    fn context_value(&self) -> Option<String>;
    fn set_context_value(&mut self, value: &str);
    fn set_label(&mut self, label: &str);
    fn set_collapsible_state(&mut self, state: CollapsibleState);
    fn set_can_reply(&mut self, can_reply: bool);
    fn set_comments(&mut self, comments: &[Comment]);
    fn dispose(&mut self);
}

/// Extract the thread id from a context value such as `"12|unresolved,draft"`.
pub fn thread_id_from_context(value: &str) -> Option<ThreadId> {
    let prefix = value.split(CONTEXT_SEPARATOR).next()?;
    prefix.trim().parse().ok().map(ThreadId)
}

fn encode_context(id: ThreadId, unresolved: bool, last_is_draft: bool) -> String {
    let mut flags = Vec::new();
    if unresolved {
        flags.push(FLAG_UNRESOLVED);
    }
    if last_is_draft {
        flags.push(FLAG_DRAFT);
    }
    format!("{}{}{}", id, CONTEXT_SEPARATOR, flags.join(","))
}

/// The domain side of a host thread: its comments and derived UI state.
#[derive(Debug)]
pub struct CommentThread<H> {
    id: ThreadId,
    handle: H,
    manager: ManagerId,
    uri: String,
    side: CommentSide,
    range: CommentRange,
    comments: Vec<Comment>,
    resolved: bool,
    can_reply: bool,
    label: &'static str,
    /// `None` until the thread is first shown with comments.
    state: Option<CollapsibleState>,
    /// Set once the user has toggled the thread.
    toggled: bool,
}

impl<H: ThreadHandle> CommentThread<H> {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn manager(&self) -> ManagerId {
        self.manager
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn side(&self) -> CommentSide {
        self.side
    }

    pub fn range(&self) -> CommentRange {
        self.range
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn last_comment(&self) -> Option<&Comment> {
        self.comments.last()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn can_reply(&self) -> bool {
        self.can_reply
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn collapsible_state(&self) -> Option<CollapsibleState> {
        self.state
    }

    pub fn has_drafts(&self) -> bool {
        self.comments.iter().any(Comment::is_draft)
    }

    /// Recompute derived state and push it to the handle.
    fn refresh(&mut self, force_expand: bool) {
        let Some(last) = self.comments.last() else {
            return;
        };
        let last_is_draft = last.draft;

        self.resolved = !last.unresolved;
        self.can_reply = !last_is_draft;
        self.label = if self.resolved {
            LABEL_RESOLVED
        } else {
            LABEL_UNRESOLVED
        };

        self.handle.set_comments(&self.comments);
        self.handle.set_label(self.label);
        self.handle.set_can_reply(self.can_reply);
        self.handle.set_context_value(&encode_context(self.id, !self.resolved, last_is_draft));

        if self.state.is_none() {
            let state = if force_expand || !self.resolved {
                CollapsibleState::Expanded
            } else {
                CollapsibleState::Collapsed
            };
            self.state = Some(state);
            self.handle.set_collapsible_state(state);
        }
    }
}

/// Owns every live [`CommentThread`] and hands out their ids.
#[derive(Debug)]
pub struct ThreadRegistry<H> {
    next_id: u64,
    threads: HashMap<ThreadId, CommentThread<H>>,
}

impl<H> Default for ThreadRegistry<H> {
    fn default() -> Self {
        Self {
            next_id: 0,
            threads: HashMap::new(),
        }
    }
}

impl<H: ThreadHandle> ThreadRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the record for `handle`, creating one if the handle is new.
    ///
    /// Creation needs a manager registered for the handle's URI; without one
    /// the handle is dropped and `None` is returned.
    pub fn from_handle(&mut self, handle: H, managers: &mut ManagerRegistry) -> Option<ThreadId> {
        if let Some(id) = self.resolve(&handle) {
            return Some(id);
        }

        let uri = handle.uri();
        let Some(manager_id) = managers.owner_for_uri(&uri) else {
            debug!(uri = %uri, "no comment manager for thread");
            return None;
        };

        self.attach(handle, manager_id, managers)
    }

    /// Create a record for `handle` owned by a specific manager.
    ///
    /// Returns `None` if the manager is not registered.
    pub fn attach(
        &mut self,
        mut handle: H,
        manager_id: ManagerId,
        managers: &mut ManagerRegistry,
    ) -> Option<ThreadId> {
        let manager = managers.get_mut(manager_id)?;
        let uri = handle.uri();
        let side = manager.side();
        let id = ThreadId(self.next_id);
        self.next_id += 1;

        handle.set_context_value(&encode_context(id, false, false));
        manager.add_thread(id);

        let thread = CommentThread {
            id,
            range: handle.range(),
            handle,
            manager: manager_id,
            uri,
            side,
            comments: Vec::new(),
            resolved: true,
            can_reply: true,
            label: LABEL_RESOLVED,
            state: None,
            toggled: false,
        };
        self.threads.insert(id, thread);
        debug!(thread = %id, manager = %manager_id, "created comment thread");

        Some(id)
    }

    /// Look up an existing record without creating one.
    pub fn resolve(&self, handle: &H) -> Option<ThreadId> {
        let id = handle
            .context_value()
            .as_deref()
            .and_then(thread_id_from_context)?;
        self.threads.contains_key(&id).then_some(id)
    }

    pub fn get(&self, id: ThreadId) -> Option<&CommentThread<H>> {
        self.threads.get(&id)
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Threads of a manager, in the order the manager received them.
    pub fn threads_for_manager(&self, manager: &FileCommentManager) -> Vec<&CommentThread<H>> {
        manager
            .threads()
            .iter()
            .filter_map(|id| self.threads.get(id))
            .collect()
    }

    /// Replace the comment list. An empty list disposes the thread.
    pub fn set_comments(
        &mut self,
        id: ThreadId,
        comments: Vec<Comment>,
        managers: &mut ManagerRegistry,
    ) -> bool {
        let Some(thread) = self.threads.get_mut(&id) else {
            return false;
        };
        thread.comments = comments;
        self.after_change(id, managers);
        true
    }

    pub fn push_comment(
        &mut self,
        id: ThreadId,
        comment: Comment,
        managers: &mut ManagerRegistry,
    ) -> bool {
        let Some(thread) = self.threads.get_mut(&id) else {
            return false;
        };
        thread.comments.push(comment);
        self.after_change(id, managers);
        true
    }

    /// Replace the comment with the same id. Returns `false` if not found.
    pub fn update_comment(
        &mut self,
        id: ThreadId,
        comment: Comment,
        managers: &mut ManagerRegistry,
    ) -> bool {
        let Some(thread) = self.threads.get_mut(&id) else {
            return false;
        };
        let Some(slot) = thread.comments.iter_mut().find(|c| c.id == comment.id) else {
            return false;
        };
        *slot = comment;
        self.after_change(id, managers);
        true
    }

    pub fn remove_comment(
        &mut self,
        id: ThreadId,
        comment_id: &str,
        managers: &mut ManagerRegistry,
    ) -> bool {
        let Some(thread) = self.threads.get_mut(&id) else {
            return false;
        };
        let before = thread.comments.len();
        thread.comments.retain(|c| c.id != comment_id);
        if thread.comments.len() == before {
            return false;
        }
        self.after_change(id, managers);
        true
    }

    /// Run `updater` over every comment and commit the results as one list.
    ///
    /// The updater futures are polled concurrently.
    pub async fn update_comments_with<F, Fut>(
        &mut self,
        id: ThreadId,
        managers: &mut ManagerRegistry,
        updater: F,
    ) -> bool
    where
        F: Fn(Comment) -> Fut,
        Fut: Future<Output = Comment>,
    {
        let Some(current) = self.threads.get(&id).map(|t| t.comments.clone()) else {
            return false;
        };
        let updated = join_all(current.into_iter().map(&updater)).await;
        self.set_comments(id, updated, managers)
    }

    /// Flip between expanded and collapsed after the thread has been shown.
    pub fn toggle_collapsed(&mut self, id: ThreadId) -> Option<CollapsibleState> {
        let thread = self.threads.get_mut(&id)?;
        let next = match thread.state? {
            CollapsibleState::Collapsed => CollapsibleState::Expanded,
            CollapsibleState::Expanded => CollapsibleState::Collapsed,
        };
        thread.state = Some(next);
        thread.toggled = true;
        thread.handle.set_collapsible_state(next);
        Some(next)
    }

    /// Drop the record and release its handle. Disposing twice is a no-op.
    pub fn dispose(&mut self, id: ThreadId, managers: &mut ManagerRegistry) -> bool {
        let Some(mut thread) = self.threads.remove(&id) else {
            return false;
        };
        if let Some(manager) = managers.get_mut(thread.manager) {
            manager.remove_thread(id);
        }
        thread.handle.dispose();
        debug!(thread = %id, "disposed comment thread");
        true
    }

    /// Dispose every thread. Numbering continues, so context values left on
    /// disposed handles never match a later record.
    pub fn clear(&mut self, managers: &mut ManagerRegistry) {
        let ids: Vec<ThreadId> = self.threads.keys().copied().collect();
        for id in ids {
            self.dispose(id, managers);
        }
    }

    fn after_change(&mut self, id: ThreadId, managers: &mut ManagerRegistry) {
        let Some(thread) = self.threads.get(&id) else {
            return;
        };

        if thread.comments.is_empty() {
            self.dispose(id, managers);
            return;
        }

        let first_display = thread.state.is_none();
        let siblings = if first_display {
            self.same_line_threads(id, managers)
        } else {
            Vec::new()
        };
        if let Some(thread) = self.threads.get_mut(&id) {
            thread.refresh(!siblings.is_empty());
        }

        // Siblings shown earlier were collapsed without knowing about this one.
        for sibling in siblings {
            if let Some(other) = self.threads.get_mut(&sibling)
                && other.state == Some(CollapsibleState::Collapsed)
                && !other.toggled
            {
                other.state = Some(CollapsibleState::Expanded);
                other.handle.set_collapsible_state(CollapsibleState::Expanded);
                debug!(thread = %sibling, "expanded thread sharing a line");
            }
        }
    }

    /// Other live threads starting on the same line and side, across every
    /// manager showing the same URI.
    fn same_line_threads(&self, id: ThreadId, managers: &ManagerRegistry) -> Vec<ThreadId> {
        let Some(thread) = self.threads.get(&id) else {
            return Vec::new();
        };
        let line = thread.range.start_line;

        managers
            .managers_for_uri(&thread.uri)
            .flat_map(|m| m.threads().iter().copied())
            .filter(|&other| other != id)
            .filter(|other| {
                self.threads
                    .get(other)
                    .is_some_and(|t| t.side == thread.side && t.range.start_line == line)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_round_trip_keeps_prefix() {
        let encoded = encode_context(ThreadId(42), true, true);
        assert_eq!(encoded, "42|unresolved,draft");
        assert_eq!(thread_id_from_context(&encoded), Some(ThreadId(42)));
    }

    #[test]
    fn context_without_flags() {
        let encoded = encode_context(ThreadId(0), false, false);
        assert_eq!(encoded, "0|");
        assert_eq!(thread_id_from_context(&encoded), Some(ThreadId(0)));
    }

    #[test]
    fn context_from_foreign_value_is_rejected() {
        assert_eq!(thread_id_from_context(""), None);
        assert_eq!(thread_id_from_context("comment|draft"), None);
        assert_eq!(thread_id_from_context("-1|"), None);
    }

    #[test]
    fn context_without_separator_still_parses() {
        assert_eq!(thread_id_from_context("7"), Some(ThreadId(7)));
    }
}
