use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the review config file looked up in every workspace root.
pub const GIT_REVIEW_FILE: &str = ".gitreview";

const SECTION_MARKER: &str = "[gerrit]";

pub const DEFAULT_PORT: u16 = 29418;
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_DEFAULT_REMOTE: &str = "origin";

/// Contents of a `.gitreview` file as written. Optional keys stay `None`
/// when absent; see [`GitReviewFile::resolve`] for the defaulted view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GitReviewFile {
    pub host: String,
    pub project: String,
    pub port: Option<String>,
    pub branch: Option<String>,
    pub remote: Option<String>,
    pub default_branch: Option<String>,
    pub default_remote: Option<String>,
    /// Keys we don't know about, kept as-is.
    pub extra: BTreeMap<String, String>,
}

/// A `.gitreview` with every optional field filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitReviewSettings {
    pub host: String,
    pub project: String,
    pub port: u16,
    pub branch: String,
    pub remote: String,
    pub default_branch: String,
    pub default_remote: String,
}

impl GitReviewFile {
    /// Apply the fallback values for every optional field.
    pub fn resolve(&self) -> GitReviewSettings {
        let port = match self.port.as_deref() {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(port = raw, "invalid port in {}, using {}", GIT_REVIEW_FILE, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        GitReviewSettings {
            host: self.host.clone(),
            project: self.project.clone(),
            port,
            branch: or_default(&self.branch, DEFAULT_BRANCH),
            remote: or_default(&self.remote, DEFAULT_REMOTE),
            default_branch: or_default(&self.default_branch, DEFAULT_DEFAULT_BRANCH),
            default_remote: or_default(&self.default_remote, DEFAULT_DEFAULT_REMOTE),
        }
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value.clone().unwrap_or_else(|| default.to_string())
}

/// Parse the contents of a `.gitreview` file.
///
/// Returns `None` when the `[gerrit]` marker is missing or when `host` or
/// `project` are missing after all lines have been read. Lines without `=`
/// are ignored; the first `=` splits key from value.
pub fn parse_git_review(content: &str) -> Option<GitReviewFile> {
    if !content.contains(SECTION_MARKER) {
        return None;
    }

    let mut host = None;
    let mut project = None;
    let mut file = GitReviewFile::default();

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let value = value.to_string();

        match key {
            "host" => host = Some(value),
            "project" => project = Some(value),
            "port" => file.port = Some(value),
            "branch" => file.branch = Some(value),
            "remote" => file.remote = Some(value),
            "defaultbranch" => file.default_branch = Some(value),
            "defaultremote" => file.default_remote = Some(value),
            other => {
                file.extra.insert(other.to_string(), value);
            }
        }
    }

    match (host, project) {
        (Some(host), Some(project)) => {
            file.host = host;
            file.project = project;
            Some(file)
        }
        (host, project) => {
            warn!(
                has_host = host.is_some(),
                has_project = project.is_some(),
                "{} is missing host or project",
                GIT_REVIEW_FILE
            );
            None
        }
    }
}

/// Read access to the folders the user has open.
#[async_trait]
pub trait Workspace {
    /// Workspace roots, in lookup order.
    fn roots(&self) -> Vec<PathBuf>;

    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// A [`Workspace`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    roots: Vec<PathBuf>,
}

impl FsWorkspace {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Scan the workspace roots in order and return the first valid `.gitreview`.
///
/// Unreadable files are treated as absent. An invalid file does not stop
/// the scan; the next root is tried.
pub async fn find_git_review<W>(workspace: &W) -> Option<(PathBuf, GitReviewFile)>
where
    W: Workspace + ?Sized,
{
    for root in workspace.roots() {
        let path = root.join(GIT_REVIEW_FILE);
        let content = match workspace.read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no readable {}", GIT_REVIEW_FILE);
                continue;
            }
        };

        if let Some(parsed) = parse_git_review(&content) {
            debug!(path = %path.display(), host = %parsed.host, "found {}", GIT_REVIEW_FILE);
            return Some((path, parsed));
        }
    }

    None
}

/// Caches the first successfully parsed `.gitreview`.
///
/// Once a value is cached the workspace is never read again, even if the
/// file changes, until [`GitReviewReader::reset`] is called.
#[derive(Debug, Default)]
pub struct GitReviewReader {
    cached: Option<GitReviewFile>,
}

impl GitReviewReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached config, or look it up and cache it on success.
    pub async fn read<W>(&mut self, workspace: &W) -> Option<GitReviewFile>
    where
        W: Workspace + ?Sized,
    {
        if let Some(cached) = &self.cached {
            return Some(cached.clone());
        }

        let (_, parsed) = find_git_review(workspace).await?;
        self.cached = Some(parsed.clone());
        Some(parsed)
    }

    pub fn cached(&self) -> Option<&GitReviewFile> {
        self.cached.as_ref()
    }

    pub fn reset(&mut self) {
        self.cached = None;
    }
}
