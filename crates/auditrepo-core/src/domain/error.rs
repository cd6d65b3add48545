//! Error taxonomy for the provisioning pipeline.

use auditrepo_hosting::HostingError;

use crate::domain::request::Violation;

/// A provisioning request that failed validation.
///
/// Carries every violated constraint, not just the first one found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid provisioning request: {}", render_violations(.violations))]
pub struct ConfigurationError {
    pub violations: Vec<Violation>,
}

fn render_violations(violations: &[Violation]) -> String {
    let mut out = format!("{} problem(s)", violations.len());
    for violation in violations {
        out.push_str(&format!("\n  - {violation}"));
    }
    out
}

/// A local git command that failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("git {operation} failed on `{target}`{}: {stderr}", exit_suffix(.status))]
pub struct GitOperationError {
    /// Workspace operation, e.g. `merge_subtree` or `push`.
    pub operation: &'static str,
    /// Path, branch, or revision the operation acted on.
    pub target: String,
    /// Exit code, when the process ran to completion.
    pub status: Option<i32>,
    /// Stderr with credentials redacted.
    pub stderr: String,
}

fn exit_suffix(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!(" (exit {code})"),
        None => String::new(),
    }
}

impl GitOperationError {
    pub fn new(operation: &'static str, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            operation,
            target: target.into(),
            status: None,
            stderr: detail.into(),
        }
    }
}

/// A failure in a best-effort step. Never fails the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("best-effort step `{step}` failed: {reason}")]
pub struct BestEffortError {
    pub step: &'static str,
    pub reason: String,
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The request is malformed; raised before any network or git call.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The hosting API rejected an operation.
    #[error(transparent)]
    Hosting(#[from] HostingError),

    /// A local git command failed.
    #[error(transparent)]
    Git(#[from] GitOperationError),

    /// A source repository is unreachable or lacks the pinned commit.
    #[error("cannot resolve {commit} in {url}: {reason}")]
    SourceResolution {
        url: String,
        commit: String,
        reason: String,
    },

    /// A best-effort step failed.
    #[error(transparent)]
    BestEffort(#[from] BestEffortError),
}

impl ProvisionError {
    pub fn source_resolution(url: &str, commit: &str, reason: impl Into<String>) -> Self {
        Self::SourceResolution {
            url: url.to_string(),
            commit: commit.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable name of the error kind, as used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Hosting(_) => "HostingError",
            Self::Git(_) => "GitOperationError",
            Self::SourceResolution { .. } => "SourceResolutionError",
            Self::BestEffort(_) => "BestEffortError",
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
