//! The hosting-service seam consumed by the provisioning pipeline.

use async_trait::async_trait;

use crate::error::HostingResult;
use crate::types::{
    BoardHandle, BoardTemplate, IssueTemplate, LabelSpec, LabelSyncOutcome, RefOutcome,
    RepoHandle, TagSpec, TemplateOutcome,
};

/// Typed access to the remote hosting API, limited to what provisioning needs.
///
/// Inject [`crate::GitHubClient`] in production or
/// [`crate::fakes::MemoryHostingClient`] in tests. Every method maps
/// transport and API failures to a [`crate::HostingError`] naming the
/// operation.
#[async_trait]
pub trait HostingClient: Send + Sync {
    /// Create a new repository in the configured organization.
    ///
    /// Fails with [`crate::HostingErrorKind::AlreadyExists`] when the name is
    /// taken; existing repositories are never reused.
    async fn create_repository(&self, name: &str, private: bool) -> HostingResult<RepoHandle>;

    /// Commit `template` on the default branch unless a file already exists at its path.
    async fn set_issue_template(
        &self,
        repo: &RepoHandle,
        template: &IssueTemplate,
    ) -> HostingResult<TemplateOutcome>;

    /// Create every label in `labels` that is missing. Labels whose name
    /// already exists (case-insensitively) are left untouched.
    async fn ensure_labels(
        &self,
        repo: &RepoHandle,
        labels: &[LabelSpec],
    ) -> HostingResult<LabelSyncOutcome>;

    /// Delete a label by name. Returns `false` when no such label existed.
    async fn delete_label(&self, repo: &RepoHandle, name: &str) -> HostingResult<bool>;

    /// Create branch `name` pointing at commit `from_sha`.
    async fn create_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        from_sha: &str,
    ) -> HostingResult<RefOutcome>;

    /// Create an annotated tag object and its `refs/tags/` ref.
    async fn create_tag(&self, repo: &RepoHandle, tag: &TagSpec) -> HostingResult<RefOutcome>;

    /// Copy a template project board, giving the copy `title`.
    async fn clone_project_board(
        &self,
        template: &BoardTemplate,
        title: &str,
    ) -> HostingResult<BoardHandle>;

    /// Link a project board to a repository.
    async fn link_board(&self, repo: &RepoHandle, board: &BoardHandle) -> HostingResult<()>;
}
