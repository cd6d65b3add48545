//! auditrepo core library
//!
//! Turns a provisioning request into an audit-ready repository: validates
//! the request, creates the target, embeds each source at its pinned
//! commit, scaffolds audit tooling, and optionally links a project board.

pub mod board;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod gitmodules;
pub mod integrate;
pub mod obs;
pub mod orchestrator;
pub mod report;
pub mod scaffold;
pub mod telemetry;
pub mod workspace;

pub use board::{BoardOutcome, ProjectBoardProvisioner, DEFAULT_BOARD_TITLE};

pub use domain::{
    AuditLabelSet, BestEffortError, ConfigurationError, EmbeddingMode, GitIdentity,
    GitOperationError, PipelineSettings, ProvisionError, ProvisioningRequest,
    ReportTemplateSettings, Result, SourceSpec, ValidatedRequest, Violation,
};

pub use git::{GitWorkspace, GitWorkspaceProvider};
pub use integrate::{IntegratedSource, SourceIntegrator};
pub use orchestrator::{Orchestrator, PipelineState};
pub use report::{
    render_report_md, write_report_json, write_report_md, ProvisioningReport, StageStatus,
};
pub use scaffold::{AuditScaffolder, ScaffoldOutcome};
pub use telemetry::init_tracing;
pub use workspace::{Workspace, WorkspaceProvider};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
