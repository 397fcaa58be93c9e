use async_trait::async_trait;
use gerrit_threads::gitreview::{
    FsWorkspace, GIT_REVIEW_FILE, GitReviewReader, Workspace, find_git_review,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Helper to create a workspace root, optionally with a `.gitreview`.
fn root_with(content: Option<&str>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    if let Some(content) = content {
        fs::write(dir.path().join(GIT_REVIEW_FILE), content).unwrap();
    }
    dir
}

/// Filesystem workspace that counts reads.
struct CountingWorkspace {
    inner: FsWorkspace,
    reads: AtomicUsize,
}

impl CountingWorkspace {
    fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            inner: FsWorkspace::new(roots),
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Workspace for CountingWorkspace {
    fn roots(&self) -> Vec<PathBuf> {
        self.inner.roots()
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_to_string(path).await
    }
}

#[tokio::test]
async fn finds_file_in_later_root_when_earlier_has_none() {
    let empty = root_with(None);
    let configured = root_with(Some("[gerrit]\nhost=review.example.com\nproject=app\n"));
    let workspace = FsWorkspace::new(vec![
        empty.path().to_path_buf(),
        configured.path().to_path_buf(),
    ]);

    let (path, file) = find_git_review(&workspace).await.unwrap();
    assert_eq!(path, configured.path().join(GIT_REVIEW_FILE));
    assert_eq!(file.host, "review.example.com");
    assert_eq!(file.project, "app");
}

#[tokio::test]
async fn first_valid_root_wins() {
    let first = root_with(Some("[gerrit]\nhost=one\nproject=p1\n"));
    let second = root_with(Some("[gerrit]\nhost=two\nproject=p2\n"));
    let workspace = FsWorkspace::new(vec![
        first.path().to_path_buf(),
        second.path().to_path_buf(),
    ]);

    let (_, file) = find_git_review(&workspace).await.unwrap();
    assert_eq!(file.host, "one");
}

#[tokio::test]
async fn invalid_file_does_not_stop_the_scan() {
    let broken = root_with(Some("[gerrit]\nhost=missing-project\n"));
    let good = root_with(Some("[gerrit]\nhost=h\nproject=p\n"));
    let workspace = FsWorkspace::new(vec![broken.path().to_path_buf(), good.path().to_path_buf()]);

    let (path, file) = find_git_review(&workspace).await.unwrap();
    assert_eq!(path, good.path().join(GIT_REVIEW_FILE));
    assert_eq!(file.project, "p");
}

#[tokio::test]
async fn nothing_found_returns_none() {
    let empty = root_with(None);
    let no_marker = root_with(Some("host=h\nproject=p\n"));
    let workspace = FsWorkspace::new(vec![
        empty.path().to_path_buf(),
        no_marker.path().to_path_buf(),
        PathBuf::from("/definitely/not/a/real/root"),
    ]);

    assert!(find_git_review(&workspace).await.is_none());
}

#[tokio::test]
async fn cached_result_survives_file_changes() {
    let root = root_with(Some("[gerrit]\nhost=first\nproject=p\n"));
    let workspace = CountingWorkspace::new(vec![root.path().to_path_buf()]);
    let mut reader = GitReviewReader::new();

    let first = reader.read(&workspace).await.unwrap();
    assert_eq!(first.host, "first");
    assert_eq!(workspace.reads(), 1);

    fs::write(
        root.path().join(GIT_REVIEW_FILE),
        "[gerrit]\nhost=second\nproject=p\n",
    )
    .unwrap();

    let second = reader.read(&workspace).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(workspace.reads(), 1, "cached read must not touch the workspace");
}

#[tokio::test]
async fn failed_lookup_is_not_cached() {
    let root = root_with(None);
    let workspace = CountingWorkspace::new(vec![root.path().to_path_buf()]);
    let mut reader = GitReviewReader::new();

    assert!(reader.read(&workspace).await.is_none());
    assert!(reader.cached().is_none());

    fs::write(
        root.path().join(GIT_REVIEW_FILE),
        "[gerrit]\nhost=late\nproject=p\n",
    )
    .unwrap();

    assert_eq!(reader.read(&workspace).await.unwrap().host, "late");
    assert_eq!(workspace.reads(), 2);
}

#[tokio::test]
async fn reset_forces_a_fresh_read() {
    let root = root_with(Some("[gerrit]\nhost=first\nproject=p\n"));
    let workspace = FsWorkspace::new(vec![root.path().to_path_buf()]);
    let mut reader = GitReviewReader::new();
    reader.read(&workspace).await.unwrap();

    fs::write(
        root.path().join(GIT_REVIEW_FILE),
        "[gerrit]\nhost=second\nproject=p\n",
    )
    .unwrap();
    reader.reset();

    assert_eq!(reader.read(&workspace).await.unwrap().host, "second");
}
