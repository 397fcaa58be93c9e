use crate::thread::{CollapsibleState, ThreadHandle};
use crate::{Comment, CommentRange};
use std::cell::RefCell;
use std::rc::Rc;

/// What the host is currently showing for a thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadView {
    pub uri: String,
    pub range: CommentRange,
    pub context_value: Option<String>,
    pub label: String,
    pub collapsible_state: Option<CollapsibleState>,
    pub can_reply: bool,
    pub comments: Vec<Comment>,
    pub dispose_count: usize,
}

/// In-process thread widget used by the terminal browser and the CLI.
///
/// Clones share state, so a caller can keep one clone to observe what the
/// registry pushes into the other.
#[derive(Debug, Clone)]
pub struct MemoryThread {
    view: Rc<RefCell<ThreadView>>,
}

impl MemoryThread {
    pub fn new(uri: &str, range: CommentRange) -> Self {
        Self {
            view: Rc::new(RefCell::new(ThreadView {
                uri: uri.to_string(),
                range,
                can_reply: true,
                ..ThreadView::default()
            })),
        }
    }

    /// Copy of the current view state.
    pub fn view(&self) -> ThreadView {
        self.view.borrow().clone()
    }

    pub fn label(&self) -> String {
        self.view.borrow().label.clone()
    }

    pub fn collapsible_state(&self) -> Option<CollapsibleState> {
        self.view.borrow().collapsible_state
    }

    pub fn dispose_count(&self) -> usize {
        self.view.borrow().dispose_count
    }

    pub fn is_disposed(&self) -> bool {
        self.dispose_count() > 0
    }
}

impl ThreadHandle for MemoryThread {
    fn uri(&self) -> String {
        self.view.borrow().uri.clone()
    }

    fn range(&self) -> CommentRange {
        self.view.borrow().range
    }

    fn context_value(&self) -> Option<String> {
        self.view.borrow().context_value.clone()
    }

    fn set_context_value(&mut self, value: &str) {
        self.view.borrow_mut().context_value = Some(value.to_string());
    }

    fn set_label(&mut self, label: &str) {
        self.view.borrow_mut().label = label.to_string();
    }

    fn set_collapsible_state(&mut self, state: CollapsibleState) {
        self.view.borrow_mut().collapsible_state = Some(state);
    }

    fn set_can_reply(&mut self, can_reply: bool) {
        self.view.borrow_mut().can_reply = can_reply;
    }

    fn set_comments(&mut self, comments: &[Comment]) {
        self.view.borrow_mut().comments = comments.to_vec();
    }

    fn dispose(&mut self) {
        let mut view = self.view.borrow_mut();
        view.dispose_count += 1;
        view.comments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let observer = MemoryThread::new("src/lib.rs", CommentRange::line(3));
        let mut handle = observer.clone();

        handle.set_label("Comment");
        handle.set_collapsible_state(CollapsibleState::Expanded);
        handle.dispose();

        assert_eq!(observer.label(), "Comment");
        assert_eq!(
            observer.collapsible_state(),
            Some(CollapsibleState::Expanded)
        );
        assert_eq!(observer.dispose_count(), 1);
    }

    #[test]
    fn new_thread_allows_replies() {
        let thread = MemoryThread::new("a", CommentRange::default());
        let view = thread.view();
        assert!(view.can_reply);
        assert!(view.context_value.is_none());
        assert!(!thread.is_disposed());
    }
}
