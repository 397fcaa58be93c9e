use crate::CommentSide;
use crate::thread::ThreadId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracks the threads shown for one side of one document.
#[derive(Debug)]
pub struct FileCommentManager {
    id: ManagerId,
    uri: String,
    side: CommentSide,
    threads: Vec<ThreadId>,
}

impl FileCommentManager {
    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn side(&self) -> CommentSide {
        self.side
    }

    /// Thread ids in the order they were added.
    pub fn threads(&self) -> &[ThreadId] {
        &self.threads
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.threads.contains(&thread)
    }

    pub(crate) fn add_thread(&mut self, thread: ThreadId) {
        if !self.contains(thread) {
            self.threads.push(thread);
        }
    }

    pub(crate) fn remove_thread(&mut self, thread: ThreadId) -> bool {
        let before = self.threads.len();
        self.threads.retain(|&t| t != thread);
        self.threads.len() != before
    }
}

/// URI-keyed lookup of the managers currently open.
///
/// Several managers may share a URI (e.g. both sides of a diff).
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    next_id: u64,
    managers: Vec<FileCommentManager>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, uri: &str, side: CommentSide) -> ManagerId {
        let id = ManagerId(self.next_id);
        self.next_id += 1;
        self.managers.push(FileCommentManager {
            id,
            uri: uri.to_string(),
            side,
            threads: Vec::new(),
        });
        id
    }

    /// Remove a manager, handing it back so the caller can dispose its threads.
    pub fn unregister(&mut self, id: ManagerId) -> Option<FileCommentManager> {
        let pos = self.managers.iter().position(|m| m.id == id)?;
        Some(self.managers.remove(pos))
    }

    pub fn get(&self, id: ManagerId) -> Option<&FileCommentManager> {
        self.managers.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: ManagerId) -> Option<&mut FileCommentManager> {
        self.managers.iter_mut().find(|m| m.id == id)
    }

    /// The manager that owns new threads for `uri`: the first one registered.
    pub fn owner_for_uri(&self, uri: &str) -> Option<ManagerId> {
        self.managers.iter().find(|m| m.uri == uri).map(|m| m.id)
    }

    pub fn managers_for_uri<'a>(
        &'a self,
        uri: &'a str,
    ) -> impl Iterator<Item = &'a FileCommentManager> + 'a {
        self.managers.iter().filter(move |m| m.uri == uri)
    }

    pub fn ids(&self) -> Vec<ManagerId> {
        self.managers.iter().map(|m| m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn clear(&mut self) {
        self.managers.clear();
        self.next_id = 0;
    }
}
