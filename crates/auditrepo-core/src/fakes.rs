//! In-memory fakes for the [`Workspace`] seam (testing only)
//!
//! [`MemoryRemote`] plays both the target repository's git remote and every
//! source repository. Workspaces handed out by [`MemoryWorkspaceProvider`]
//! keep a flat file map as their working tree and publish commits, branches
//! and tags to the shared remote on push. Submodules are committed as
//! gitlinks; their checked-out files live beside the tree, as in a real
//! working copy. Everything is journaled so tests can assert ordering as
//! well as end state.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use auditrepo_hosting::RepoHandle;
use sha2::{Digest, Sha256};

use crate::domain::error::{GitOperationError, ProvisionError, Result};
use crate::domain::remote::RemoteUrl;
use crate::domain::request::is_full_sha;
use crate::gitmodules::{self, SubmoduleEntry};
use crate::workspace::{Workspace, WorkspaceProvider};

pub type Tree = BTreeMap<String, String>;

/// Tree entry contents standing in for a submodule pointer.
const GITLINK_PREFIX: &str = "Subproject commit ";

/// Deterministic 40-hex id derived from `parts`.
pub fn fake_sha(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())[..40].to_string()
}

/// A commit known to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub message: String,
    pub parents: Vec<String>,
    pub tree: Tree,
}

/// An annotated tag known to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
struct SourceRepo {
    commits: BTreeMap<String, Tree>,
    refs: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    sources: BTreeMap<String, SourceRepo>,
    commits: BTreeMap<String, CommitRecord>,
    branches: BTreeMap<String, String>,
    tags: BTreeMap<String, TagRecord>,
    journal: Vec<String>,
    failures: HashSet<&'static str>,
    acquired: usize,
    released: usize,
}

/// Shared remote side of every memory workspace.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `files` as commit `commit` of the source at `url`.
    pub fn add_source_commit(&self, url: &str, commit: &str, files: &[(&str, &str)]) {
        let clean = RemoteUrl::new(url, None).clean().to_string();
        let tree = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        let mut state = self.state.lock().unwrap();
        let source = state.sources.entry(clean).or_default();
        source.commits.insert(commit.to_ascii_lowercase(), tree);
    }

    /// Register a source commit under a content-derived id and return it.
    pub fn add_source(&self, url: &str, files: &[(&str, &str)]) -> String {
        let mut parts = vec![url];
        for (path, contents) in files {
            parts.push(path);
            parts.push(contents);
        }
        let sha = fake_sha(&parts);
        self.add_source_commit(url, &sha, files);
        sha
    }

    /// Point branch `name` of the source at `url` to `commit`.
    pub fn set_source_ref(&self, url: &str, name: &str, commit: &str) {
        let clean = RemoteUrl::new(url, None).clean().to_string();
        let mut state = self.state.lock().unwrap();
        state
            .sources
            .entry(clean)
            .or_default()
            .refs
            .insert(name.to_string(), commit.to_string());
    }

    /// Commit `path` on `branch` from the service side, the way a contents
    /// API does. `None` when the branch does not exist.
    pub fn commit_file(&self, branch: &str, path: &str, contents: &str, message: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let parent = state.branches.get(branch)?.clone();
        let mut tree = state
            .commits
            .get(&parent)
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        tree.insert(path.to_string(), contents.to_string());
        let sha = fake_sha(&[message, &parent, path, contents]);
        state.commits.insert(
            sha.clone(),
            CommitRecord {
                message: message.to_string(),
                parents: vec![parent],
                tree,
            },
        );
        state.branches.insert(branch.to_string(), sha.clone());
        state.journal.push(format!("remote_commit:{path}"));
        Some(sha)
    }

    /// Make every call of the workspace operation `operation` fail.
    pub fn fail_operation(&self, operation: &'static str) {
        self.state.lock().unwrap().failures.insert(operation);
    }

    pub fn branch_head(&self, branch: &str) -> Option<String> {
        self.state.lock().unwrap().branches.get(branch).cloned()
    }

    pub fn branches(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().branches.clone()
    }

    pub fn tags(&self) -> BTreeMap<String, TagRecord> {
        self.state.lock().unwrap().tags.clone()
    }

    pub fn commit(&self, sha: &str) -> Option<CommitRecord> {
        self.state.lock().unwrap().commits.get(sha).cloned()
    }

    /// Files on `branch` as last pushed.
    pub fn tree(&self, branch: &str) -> Tree {
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(branch)
            .and_then(|sha| state.commits.get(sha))
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }

    /// Journal of workspace operations, formatted as `operation:detail`.
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().unwrap().acquired
    }

    pub fn released(&self) -> usize {
        self.state.lock().unwrap().released
    }

    fn enter(&self, operation: &'static str, detail: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("{operation}:{detail}"));
        if state.failures.contains(operation) {
            return Err(GitOperationError::new(operation, detail, "injected failure").into());
        }
        Ok(())
    }

    fn resolve_source(&self, url: &RemoteUrl, revision: &str) -> Result<(String, Tree)> {
        let state = self.state.lock().unwrap();
        let source = state.sources.get(url.clean()).ok_or_else(|| {
            ProvisionError::source_resolution(url.clean(), revision, "repository unreachable")
        })?;
        let sha = if is_full_sha(revision) {
            revision.to_ascii_lowercase()
        } else {
            source.refs.get(revision).cloned().unwrap_or_default()
        };
        match source.commits.get(&sha) {
            Some(tree) => Ok((sha, tree.clone())),
            None => Err(ProvisionError::source_resolution(
                url.clean(),
                revision,
                "commit not found in repository",
            )),
        }
    }
}

/// Hands out [`MemoryWorkspace`]s backed by one [`MemoryRemote`].
#[derive(Debug, Clone)]
pub struct MemoryWorkspaceProvider {
    remote: MemoryRemote,
    default_branch: String,
}

impl MemoryWorkspaceProvider {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            default_branch: "main".to_string(),
        }
    }

    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    pub fn remote(&self) -> &MemoryRemote {
        &self.remote
    }
}

#[async_trait]
impl WorkspaceProvider for MemoryWorkspaceProvider {
    async fn acquire(&self, repo: &RepoHandle) -> Result<Box<dyn Workspace>> {
        self.remote.enter("acquire", &repo.name)?;
        let mut state = self.remote.state.lock().unwrap();
        state.acquired += 1;
        let head = state.branches.get(&self.default_branch).cloned();
        let files = head
            .as_ref()
            .and_then(|sha| state.commits.get(sha))
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        let mut known: BTreeSet<String> = state.commits.keys().cloned().collect();
        known.extend(state.tags.values().map(|t| t.target.clone()));
        drop(state);

        let mut branches = BTreeMap::new();
        if let Some(sha) = &head {
            branches.insert(self.default_branch.clone(), sha.clone());
        }
        // A plain clone leaves submodule directories empty.
        let submodules = files
            .iter()
            .filter(|(_, contents)| contents.starts_with(GITLINK_PREFIX))
            .map(|(path, _)| (path.clone(), Tree::new()))
            .collect();
        Ok(Box::new(MemoryWorkspace {
            remote: self.remote.clone(),
            current_branch: self.default_branch.clone(),
            files,
            submodules,
            head,
            branches,
            tags: BTreeMap::new(),
            commits: BTreeMap::new(),
            known,
            merge_parents: Vec::new(),
        }))
    }
}

/// Working copy over a flat file map.
#[derive(Debug)]
pub struct MemoryWorkspace {
    remote: MemoryRemote,
    current_branch: String,
    /// Tracked content, gitlinks included.
    files: Tree,
    /// Checked-out submodule files, keyed by submodule path.
    submodules: BTreeMap<String, Tree>,
    head: Option<String>,
    branches: BTreeMap<String, String>,
    tags: BTreeMap<String, TagRecord>,
    commits: BTreeMap<String, CommitRecord>,
    known: BTreeSet<String>,
    merge_parents: Vec<String>,
}

impl Drop for MemoryWorkspace {
    fn drop(&mut self) {
        if let Ok(mut state) = self.remote.state.lock() {
            state.released += 1;
        }
    }
}

fn under(path: &str, dir: &str) -> bool {
    dir.is_empty() || path == dir || path.starts_with(&format!("{dir}/"))
}

fn join(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        path.to_string()
    } else {
        format!("{dir}/{path}")
    }
}

impl MemoryWorkspace {
    fn head_tree(&self) -> Tree {
        self.head
            .as_ref()
            .and_then(|sha| {
                self.commits
                    .get(sha)
                    .cloned()
                    .or_else(|| self.remote.commit(sha))
            })
            .map(|c| c.tree)
            .unwrap_or_default()
    }

    fn worktree_len(&self) -> usize {
        self.files.len() + self.submodules.values().map(Tree::len).sum::<usize>()
    }

    fn resolve_ref(&self, spec: &str) -> Option<String> {
        if spec == "HEAD" {
            return self.head.clone();
        }
        if let Some(sha) = self.branches.get(spec) {
            return Some(sha.clone());
        }
        let lowered = spec.to_ascii_lowercase();
        self.known.contains(&lowered).then_some(lowered)
    }
}

#[async_trait]
impl Workspace for MemoryWorkspace {
    async fn write_file(&mut self, path: &str, contents: &str) -> Result<()> {
        self.remote.enter("write_file", path)?;
        self.files.insert(path.to_string(), contents.to_string());
        Ok(())
    }

    async fn read_file(&mut self, path: &str) -> Result<Option<String>> {
        for (root, tree) in &self.submodules {
            if let Some(inner) = path.strip_prefix(&format!("{root}/")) {
                return Ok(tree.get(inner).cloned());
            }
        }
        if self.submodules.contains_key(path) {
            return Ok(None);
        }
        Ok(self.files.get(path).cloned())
    }

    async fn list_files(&mut self, dir: &str) -> Result<Vec<String>> {
        let dir = dir.trim_matches('/');
        let tracked = self
            .files
            .keys()
            .filter(|p| !self.submodules.contains_key(p.as_str()))
            .cloned();
        let checked_out = self
            .submodules
            .iter()
            .flat_map(|(root, tree)| tree.keys().map(move |p| join(root, p)));
        let mut files: Vec<String> = tracked
            .chain(checked_out)
            .filter(|p| under(p, dir) && p.as_str() != dir)
            .collect();
        files.sort();
        Ok(files)
    }

    async fn strip_path(&mut self, path: &str) -> Result<bool> {
        self.remote.enter("strip_path", path)?;
        let before = self.worktree_len();
        self.files.retain(|p, _| !under(p, path));
        self.submodules.retain(|root, _| !under(root, path));
        for (root, tree) in self.submodules.iter_mut() {
            tree.retain(|p, _| !under(&join(root, p), path));
        }
        Ok(self.worktree_len() != before)
    }

    async fn add_submodule(&mut self, url: &RemoteUrl, path: &str, commit: &str) -> Result<String> {
        self.remote.enter("add_submodule", path)?;
        let (sha, tree) = self.remote.resolve_source(url, commit)?;
        self.files
            .insert(path.to_string(), format!("{GITLINK_PREFIX}{sha}\n"));
        self.submodules.insert(path.to_string(), tree);
        let mut entries = self
            .files
            .get(".gitmodules")
            .map(|c| gitmodules::parse(c))
            .unwrap_or_default();
        entries.retain(|e| e.name != path);
        entries.push(SubmoduleEntry {
            name: path.to_string(),
            settings: vec![
                ("path".to_string(), path.to_string()),
                ("url".to_string(), url.clean().to_string()),
            ],
        });
        self.files
            .insert(".gitmodules".to_string(), gitmodules::render(&entries));
        Ok(sha)
    }

    async fn merge_subtree(&mut self, url: &RemoteUrl, path: &str, revision: &str) -> Result<String> {
        self.remote.enter("merge_subtree", path)?;
        let (sha, tree) = self.remote.resolve_source(url, revision)?;
        for (file, contents) in &tree {
            self.files.insert(join(path, file), contents.clone());
        }
        // Make the source commit itself addressable, as a real fetch would.
        self.commits.entry(sha.clone()).or_insert(CommitRecord {
            message: format!("source {}", url.clean()),
            parents: Vec::new(),
            tree,
        });
        self.known.insert(sha.clone());
        self.merge_parents.push(sha.clone());
        Ok(sha)
    }

    async fn commit_all(&mut self, message: &str) -> Result<Option<String>> {
        self.remote.enter("commit", message)?;
        if self.files == self.head_tree() && self.merge_parents.is_empty() {
            return Ok(None);
        }
        let mut parents: Vec<String> = self.head.iter().cloned().collect();
        parents.append(&mut self.merge_parents);

        let mut parts: Vec<&str> = vec![message];
        parts.extend(parents.iter().map(String::as_str));
        for (path, contents) in &self.files {
            parts.push(path);
            parts.push(contents);
        }
        let sha = fake_sha(&parts);

        self.commits.insert(
            sha.clone(),
            CommitRecord {
                message: message.to_string(),
                parents,
                tree: self.files.clone(),
            },
        );
        self.known.insert(sha.clone());
        self.head = Some(sha.clone());
        self.branches
            .insert(self.current_branch.clone(), sha.clone());
        Ok(Some(sha))
    }

    async fn push(&mut self, branch: &str) -> Result<()> {
        self.remote.enter("push", branch)?;
        let sha = self.branches.get(branch).cloned().ok_or_else(|| {
            GitOperationError::new("push", branch, "src refspec does not match any")
        })?;
        let mut state = self.remote.state.lock().unwrap();
        for (id, commit) in &self.commits {
            state.commits.entry(id.clone()).or_insert_with(|| commit.clone());
        }
        state.branches.insert(branch.to_string(), sha);
        Ok(())
    }

    async fn push_tag(&mut self, name: &str) -> Result<()> {
        self.remote.enter("push_tag", name)?;
        let tag = self
            .tags
            .get(name)
            .cloned()
            .ok_or_else(|| GitOperationError::new("push_tag", name, "no such tag"))?;
        let mut state = self.remote.state.lock().unwrap();
        match state.tags.get(name) {
            Some(existing) if existing.target != tag.target => Err(GitOperationError::new(
                "push_tag",
                name,
                "rejected: tag already exists on remote",
            )
            .into()),
            _ => {
                state.tags.insert(name.to_string(), tag);
                Ok(())
            }
        }
    }

    async fn pull(&mut self, branch: &str) -> Result<()> {
        self.remote.enter("pull", branch)?;
        let state = self.remote.state.lock().unwrap();
        let upstream = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| GitOperationError::new("pull", branch, "couldn't find remote ref"))?;
        let local = self.branches.get(branch).cloned();
        if local.as_deref() == Some(upstream.as_str()) {
            return Ok(());
        }
        if let Some(local) = &local {
            if !is_ancestor(&state.commits, local, &upstream) {
                return Err(GitOperationError::new(
                    "pull",
                    branch,
                    "Not possible to fast-forward, aborting.",
                )
                .into());
            }
        }
        let tree = state
            .commits
            .get(&upstream)
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        self.known.extend(state.commits.keys().cloned());
        drop(state);

        if self.current_branch == branch {
            self.files = tree;
            self.head = Some(upstream.clone());
        }
        self.branches.insert(branch.to_string(), upstream);
        Ok(())
    }

    async fn create_branch(&mut self, name: &str, from_ref: &str) -> Result<()> {
        self.remote.enter("create_branch", name)?;
        let target = self
            .resolve_ref(from_ref)
            .ok_or_else(|| GitOperationError::new("create_branch", from_ref, "unknown revision"))?;
        match self.branches.get(name) {
            Some(existing) if *existing != target => Err(GitOperationError::new(
                "create_branch",
                name,
                format!("branch already exists at {existing}"),
            )
            .into()),
            _ => {
                self.branches.insert(name.to_string(), target);
                Ok(())
            }
        }
    }

    async fn tag(&mut self, name: &str, target: &str, message: &str) -> Result<()> {
        self.remote.enter("tag", name)?;
        let commit = self
            .resolve_ref(target)
            .ok_or_else(|| GitOperationError::new("tag", target, "unknown revision"))?;
        if let Some(existing) = self.tags.get(name) {
            if existing.target != commit {
                return Err(GitOperationError::new(
                    "tag",
                    name,
                    format!("tag already exists at {}", existing.target),
                )
                .into());
            }
            return Ok(());
        }
        self.tags.insert(
            name.to_string(),
            TagRecord {
                target: commit,
                message: message.to_string(),
            },
        );
        Ok(())
    }

    async fn head_commit(&mut self) -> Result<String> {
        self.head
            .clone()
            .ok_or_else(|| GitOperationError::new("head_commit", "HEAD", "no commits yet").into())
    }
}

fn is_ancestor(commits: &BTreeMap<String, CommitRecord>, ancestor: &str, descendant: &str) -> bool {
    let mut pending = vec![descendant.to_string()];
    let mut seen = BTreeSet::new();
    while let Some(sha) = pending.pop() {
        if sha == ancestor {
            return true;
        }
        if !seen.insert(sha.clone()) {
            continue;
        }
        if let Some(commit) = commits.get(&sha) {
            pending.extend(commit.parents.iter().cloned());
        }
    }
    false
}
