//! The local working copy of a target repository.
//!
//! [`Workspace`] is the seam between the pipeline and git. The production
//! implementation is [`crate::git::GitWorkspace`]; tests use
//! [`crate::fakes::MemoryWorkspace`]. A workspace is acquired once per run
//! through a [`WorkspaceProvider`] and released when dropped.

use async_trait::async_trait;
use auditrepo_hosting::RepoHandle;

use crate::domain::error::Result;
use crate::domain::remote::RemoteUrl;

/// A single checked-out working tree on the default branch.
///
/// Paths are repository-relative with `/` separators; the empty path is the
/// repository root.
#[async_trait]
pub trait Workspace: Send {
    /// Write `contents` to `path`, creating parent directories.
    async fn write_file(&mut self, path: &str, contents: &str) -> Result<()>;

    /// Contents of `path`, or `None` when it does not exist.
    async fn read_file(&mut self, path: &str) -> Result<Option<String>>;

    /// Every file below `dir`, recursively, excluding `.git` metadata.
    async fn list_files(&mut self, dir: &str) -> Result<Vec<String>>;

    /// Remove `path` (file or directory). Returns `false` when absent.
    async fn strip_path(&mut self, path: &str) -> Result<bool>;

    /// Add `url` as a submodule at `path`, checked out at `commit`.
    /// Returns the commit the submodule points at.
    async fn add_submodule(&mut self, url: &RemoteUrl, path: &str, commit: &str) -> Result<String>;

    /// History-preserving subtree merge of `revision` (a full SHA or a
    /// branch name) from `url` into `path`. Leaves the merge staged but
    /// uncommitted. Returns the resolved source commit.
    async fn merge_subtree(&mut self, url: &RemoteUrl, path: &str, revision: &str) -> Result<String>;

    /// Stage everything and commit. `None` when there was nothing to commit.
    async fn commit_all(&mut self, message: &str) -> Result<Option<String>>;

    async fn push(&mut self, branch: &str) -> Result<()>;

    async fn push_tag(&mut self, name: &str) -> Result<()>;

    /// Fast-forward the checked-out branch from the remote.
    async fn pull(&mut self, branch: &str) -> Result<()>;

    /// Create a local branch at `from_ref` without checking it out.
    async fn create_branch(&mut self, name: &str, from_ref: &str) -> Result<()>;

    /// Annotated tag at `target`. Succeeds without change when the tag
    /// already points at `target`.
    async fn tag(&mut self, name: &str, target: &str, message: &str) -> Result<()>;

    async fn head_commit(&mut self) -> Result<String>;
}

/// Hands out a fresh workspace for a target repository.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn acquire(&self, repo: &RepoHandle) -> Result<Box<dyn Workspace>>;
}

/// Directories under `root` that hold CI definitions, found from a file list.
pub fn ci_dirs_in(files: &[String], root: &str) -> Vec<String> {
    use crate::domain::templates::CI_DEFINITION_DIRS;

    let prefix = if root.is_empty() {
        String::new()
    } else {
        format!("{}/", root.trim_matches('/'))
    };
    let mut dirs: Vec<String> = Vec::new();
    for file in files {
        let Some(relative) = file.strip_prefix(&prefix) else {
            continue;
        };
        for marker in CI_DEFINITION_DIRS {
            let needle = format!("{marker}/");
            let hit = if relative.starts_with(&needle) {
                Some(0)
            } else {
                relative.find(&format!("/{needle}")).map(|i| i + 1)
            };
            if let Some(at) = hit {
                let dir = format!("{prefix}{}", &relative[..at + marker.len()]);
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
    }
    dirs.sort();
    dirs
}
