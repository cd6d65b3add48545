//! Value types exchanged with the hosting service.

use serde::{Deserialize, Serialize};

/// A repository that exists on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Owning organization login.
    pub owner: String,
    /// Repository name (without owner).
    pub name: String,
    /// Opaque GraphQL node id, needed to link project boards.
    pub node_id: String,
    /// HTTPS clone URL without credentials.
    pub clone_url: String,
    /// Branch the service treats as default.
    pub default_branch: String,
}

impl RepoHandle {
    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A label to be present on a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    /// Six hex digits, no leading `#`.
    pub color: String,
    #[serde(default)]
    pub description: String,
}

impl LabelSpec {
    pub fn new(name: &str, color: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            description: description.to_string(),
        }
    }
}

/// Result of an `ensure_labels` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSyncOutcome {
    /// Labels that did not exist and were created.
    pub created: Vec<String>,
    /// Labels that were already present (matched by name) and left untouched.
    pub existing: Vec<String>,
}

/// Issue template file committed through the contents API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTemplate {
    /// Repository-relative path, e.g. `.github/ISSUE_TEMPLATE/finding.md`.
    pub path: String,
    pub body: String,
    /// Commit message used when the file is created.
    pub commit_message: String,
}

/// Whether a file-backed setting was written or already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateOutcome {
    Created,
    AlreadyPresent,
}

/// Whether a ref (branch or tag) was created or already existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefOutcome {
    Created,
    AlreadyExists,
}

/// An annotated tag to create through the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpec {
    pub name: String,
    /// Full commit SHA the tag points at.
    pub target: String,
    pub message: String,
}

/// Identifies a template project board: `owner`'s project number `number`.
///
/// The number is the one visible in the board URL,
/// e.g. `https://github.com/orgs/<owner>/projects/7` -> `7`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardTemplate {
    pub owner: String,
    pub number: u64,
}

/// A project board that exists on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardHandle {
    pub id: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub url: String,
}
