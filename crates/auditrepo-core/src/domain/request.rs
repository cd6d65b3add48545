//! Provisioning request model and validation.
//!
//! [`ProvisioningRequest`] mirrors the JSON an operator writes.
//! [`ProvisioningRequest::validate`] turns it into a [`ValidatedRequest`]
//! or a [`ConfigurationError`] listing every violated constraint. Nothing in
//! this module touches the network or the filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::ConfigurationError;
use crate::domain::remote::{normalize_source_url, source_name};

/// How every source repository is embedded into the target. One value per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    /// History-preserving subtree merge under the destination path.
    Subtree,
    /// Git submodule pointer pinned at the commit.
    Submodule,
}

impl EmbeddingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingMode::Subtree => "subtree",
            EmbeddingMode::Submodule => "submodule",
        }
    }
}

impl fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subtree" => Ok(EmbeddingMode::Subtree),
            "submodule" => Ok(EmbeddingMode::Submodule),
            other => Err(format!(
                "unknown embedding mode `{other}` (expected `subtree` or `submodule`)"
            )),
        }
    }
}

/// One source repository pinned at a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub source_url: String,
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_folder: Option<String>,
}

impl SourceSpec {
    pub fn new(source_url: &str, commit_hash: &str, sub_folder: Option<&str>) -> Self {
        Self {
            source_url: source_url.to_string(),
            commit_hash: commit_hash.to_string(),
            sub_folder: sub_folder.map(str::to_string),
        }
    }
}

/// The request as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    pub target_repo_name: String,
    #[serde(default)]
    pub project_title: String,
    /// Either a JSON array or a whitespace/comma delimited string.
    #[serde(default, deserialize_with = "deserialize_auditors")]
    pub auditors: Vec<String>,
    #[serde(rename = "repositories", default)]
    pub source_repos: Vec<SourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<EmbeddingMode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuditorsField {
    Delimited(String),
    List(Vec<String>),
}

fn deserialize_auditors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match AuditorsField::deserialize(deserializer)? {
        AuditorsField::Delimited(raw) => split_auditors(&raw),
        AuditorsField::List(list) => list
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
    })
}

/// Split an operator-supplied auditor list on whitespace and commas.
pub fn split_auditors(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// A single violated constraint. Source positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("target repository name must not be empty")]
    EmptyTargetName,

    #[error("target repository name `{value}` must be 1-100 characters of letters, digits, `-`, `_` or `.`, and must not be `.`, `..` or end in `.git`")]
    UnsafeTargetName { value: String },

    #[error("at least one source repository is required")]
    NoSources,

    #[error("source #{position}: sourceUrl must not be empty")]
    EmptySourceUrl { position: usize },

    #[error("source #{position}: cannot derive a repository name from `{url}`")]
    UnnamedSource { position: usize, url: String },

    #[error("source #{position}: commit hash `{value}` is not a full 40-character hex SHA")]
    MalformedCommitHash { position: usize, value: String },

    #[error("source #{position}: subFolder is required when more than one source is given")]
    MissingSubFolder { position: usize },

    #[error("source #{position}: subFolder `{value}` {reason}")]
    InvalidSubFolder {
        position: usize,
        value: String,
        reason: &'static str,
    },

    #[error("subFolder `{value}` is used by sources #{first} and #{second}")]
    DuplicateSubFolder {
        value: String,
        first: usize,
        second: usize,
    },

    #[error("subFolder `{inner}` is nested inside subFolder `{outer}`")]
    NestedSubFolder { outer: String, inner: String },

    #[error("source #{position}: subFolder `{value}` overlaps reserved path `{reserved}`")]
    ReservedSubFolder {
        position: usize,
        value: String,
        reserved: String,
    },

    #[error("source #{position}: submodule embedding cannot target the repository root; set a subFolder")]
    SubmoduleAtRoot { position: usize },

    #[error("auditor `{value}` is not a valid branch name component")]
    InvalidAuditor { value: String },

    #[error("auditor `{value}` is listed more than once")]
    DuplicateAuditor { value: String },

    #[error("auditor `{value}` would collide with branch `{branch}`")]
    ReservedAuditor { value: String, branch: String },

    #[error("embedding mode must be chosen explicitly (`subtree` or `submodule`)")]
    MissingEmbeddingMode,
}

/// Context-dependent limits applied during validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    /// Paths the pipeline writes itself (e.g. the report template).
    pub reserved_paths: Vec<String>,
    /// Branch names the pipeline creates itself (default and report branch).
    pub reserved_branches: Vec<String>,
    /// Prefix prepended to auditor identifiers to form branch names.
    pub auditor_branch_prefix: String,
}

/// A source after validation: normalised URL, destination and tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSource {
    /// Normalised, credential-free URL.
    pub url: String,
    /// Lower-case 40-hex commit.
    pub commit: String,
    /// Repository-relative destination; empty means the repository root.
    pub destination: String,
    /// Short name derived from the URL.
    pub name: String,
    /// Audit tag created for this source.
    pub tag: String,
}

impl PlannedSource {
    pub fn lands_at_root(&self) -> bool {
        self.destination.is_empty()
    }

    /// Destination for humans: the path, or `<root>`.
    pub fn destination_label(&self) -> &str {
        if self.destination.is_empty() {
            "<root>"
        } else {
            &self.destination
        }
    }
}

/// A request that passed validation. Fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    target_repo_name: String,
    project_title: String,
    auditors: Vec<String>,
    sources: Vec<PlannedSource>,
    mode: EmbeddingMode,
}

impl ValidatedRequest {
    pub fn target_repo_name(&self) -> &str {
        &self.target_repo_name
    }

    pub fn project_title(&self) -> &str {
        &self.project_title
    }

    pub fn auditors(&self) -> &[String] {
        &self.auditors
    }

    pub fn sources(&self) -> &[PlannedSource] {
        &self.sources
    }

    pub fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    /// SHA-256 over the canonical JSON form of the validated request.
    pub fn digest(&self) -> String {
        let canonical = serde_json::json!({
            "target_repo_name": self.target_repo_name,
            "project_title": self.project_title,
            "auditors": self.auditors,
            "mode": self.mode.as_str(),
            "sources": self.sources.iter().map(|s| serde_json::json!({
                "url": s.url,
                "commit": s.commit,
                "destination": s.destination,
            })).collect::<Vec<_>>(),
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// `true` for exactly 40 ASCII hex digits.
pub fn is_full_sha(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_safe_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 100
        && name != "."
        && name != ".."
        && !name.to_ascii_lowercase().ends_with(".git")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_valid_auditor(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(['-', '.'])
        && !name.ends_with(".lock")
        && !name.ends_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Normalise a sub-folder to `a/b` form, or explain why it is unusable.
pub fn normalize_sub_folder(raw: &str) -> Result<String, &'static str> {
    let mut path = raw.trim().replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    let path = path.trim_end_matches('/').to_string();
    if path.is_empty() || path == "." {
        return Ok(String::new());
    }
    if path.starts_with('/') {
        return Err("must be a relative path");
    }
    for component in path.split('/') {
        match component {
            "" => return Err("must not contain empty path segments"),
            "." | ".." => return Err("must not contain `.` or `..` segments"),
            ".git" => return Err("must not contain a `.git` segment"),
            _ => {}
        }
    }
    Ok(path)
}

fn overlaps(a: &str, b: &str) -> bool {
    a == b || b.starts_with(&format!("{a}/")) || a.starts_with(&format!("{b}/"))
}

fn tag_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches(['-', '.'])
        .to_string()
}

impl ProvisioningRequest {
    /// Check every constraint and collect all violations.
    pub fn validate(self, rules: &ValidationRules) -> Result<ValidatedRequest, ConfigurationError> {
        let mut violations = Vec::new();

        let target = self.target_repo_name.trim().to_string();
        if target.is_empty() {
            violations.push(Violation::EmptyTargetName);
        } else if !is_safe_repo_name(&target) {
            violations.push(Violation::UnsafeTargetName { value: target.clone() });
        }

        let mode = self.embedding_mode;
        if mode.is_none() {
            violations.push(Violation::MissingEmbeddingMode);
        }

        let mut seen_auditors = BTreeSet::new();
        for auditor in &self.auditors {
            if !is_valid_auditor(auditor) {
                violations.push(Violation::InvalidAuditor {
                    value: auditor.clone(),
                });
                continue;
            }
            if !seen_auditors.insert(auditor.to_ascii_lowercase()) {
                violations.push(Violation::DuplicateAuditor {
                    value: auditor.clone(),
                });
                continue;
            }
            let branch = format!("{}{}", rules.auditor_branch_prefix, auditor);
            if rules.reserved_branches.iter().any(|b| b.eq_ignore_ascii_case(&branch)) {
                violations.push(Violation::ReservedAuditor {
                    value: auditor.clone(),
                    branch,
                });
            }
        }

        if self.source_repos.is_empty() {
            violations.push(Violation::NoSources);
        }

        let multiple = self.source_repos.len() > 1;
        let mut planned = Vec::with_capacity(self.source_repos.len());
        let mut destinations: Vec<(usize, String)> = Vec::new();

        for (index, spec) in self.source_repos.iter().enumerate() {
            let position = index + 1;

            let url = normalize_source_url(&spec.source_url);
            let name = if url.is_empty() {
                violations.push(Violation::EmptySourceUrl { position });
                None
            } else {
                let name = source_name(&url);
                if name.is_none() {
                    violations.push(Violation::UnnamedSource {
                        position,
                        url: url.clone(),
                    });
                }
                name
            };

            let commit = spec.commit_hash.trim().to_ascii_lowercase();
            if !is_full_sha(&commit) {
                violations.push(Violation::MalformedCommitHash {
                    position,
                    value: spec.commit_hash.clone(),
                });
            }

            let raw_folder = spec.sub_folder.as_deref().unwrap_or("");
            let destination = match normalize_sub_folder(raw_folder) {
                Ok(path) => path,
                Err(reason) => {
                    violations.push(Violation::InvalidSubFolder {
                        position,
                        value: raw_folder.to_string(),
                        reason,
                    });
                    continue;
                }
            };

            if destination.is_empty() {
                if multiple {
                    violations.push(Violation::MissingSubFolder { position });
                }
                if mode == Some(EmbeddingMode::Submodule) {
                    violations.push(Violation::SubmoduleAtRoot { position });
                }
            } else {
                for reserved in &rules.reserved_paths {
                    if overlaps(&destination, reserved) {
                        violations.push(Violation::ReservedSubFolder {
                            position,
                            value: destination.clone(),
                            reserved: reserved.clone(),
                        });
                    }
                }
                destinations.push((position, destination.clone()));
            }

            if let Some(name) = name {
                planned.push(PlannedSource {
                    url,
                    commit,
                    destination,
                    name,
                    tag: String::new(),
                });
            }
        }

        for (i, (first_pos, first)) in destinations.iter().enumerate() {
            for (second_pos, second) in destinations.iter().skip(i + 1) {
                if first == second {
                    violations.push(Violation::DuplicateSubFolder {
                        value: first.clone(),
                        first: *first_pos,
                        second: *second_pos,
                    });
                } else if second.starts_with(&format!("{first}/")) {
                    violations.push(Violation::NestedSubFolder {
                        outer: first.clone(),
                        inner: second.clone(),
                    });
                } else if first.starts_with(&format!("{second}/")) {
                    violations.push(Violation::NestedSubFolder {
                        outer: second.clone(),
                        inner: first.clone(),
                    });
                }
            }
        }

        let mode = match mode {
            Some(mode) if violations.is_empty() => mode,
            _ => return Err(ConfigurationError { violations }),
        };

        assign_tags(&mut planned);

        Ok(ValidatedRequest {
            target_repo_name: target,
            project_title: self.project_title.trim().to_string(),
            auditors: self.auditors,
            sources: planned,
            mode,
        })
    }
}

/// `<name>-audit`, falling back to the destination when names collide.
/// A stem that is still taken gets a numeric suffix.
fn assign_tags(sources: &mut [PlannedSource]) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for source in sources.iter() {
        *counts.entry(source.name.to_ascii_lowercase()).or_default() += 1;
    }
    let mut taken: BTreeSet<String> = BTreeSet::new();
    for source in sources.iter_mut() {
        let shared = counts
            .get(&source.name.to_ascii_lowercase())
            .copied()
            .unwrap_or(0)
            > 1;
        let stem = if shared && !source.destination.is_empty() {
            tag_component(&source.destination.replace('/', "-"))
        } else {
            tag_component(&source.name)
        };
        let stem = if stem.is_empty() { "source".to_string() } else { stem };
        let mut tag = format!("{stem}-audit");
        let mut n = 2;
        while taken.contains(&tag.to_ascii_lowercase()) {
            tag = format!("{stem}-{n}-audit");
            n += 1;
        }
        taken.insert(tag.to_ascii_lowercase());
        source.tag = tag;
    }
}
