//! Domain models for auditrepo.
//!
//! - `ProvisioningRequest`: what the operator asked for
//! - `ValidatedRequest`: the same request after every check passed
//! - `PipelineSettings`: organisation-wide knobs
//! - `RemoteUrl`: a source or target URL with credentials kept apart

pub mod error;
pub mod labels;
pub mod remote;
pub mod request;
pub mod settings;
pub mod templates;

pub use error::{BestEffortError, ConfigurationError, GitOperationError, ProvisionError, Result};
pub use labels::AuditLabelSet;
pub use remote::{normalize_source_url, RemoteUrl};
pub use request::{
    EmbeddingMode, PlannedSource, ProvisioningRequest, SourceSpec, ValidatedRequest,
    ValidationRules, Violation,
};
pub use settings::{GitIdentity, PipelineSettings, ReportTemplateSettings, REPORT_BRANCH};
