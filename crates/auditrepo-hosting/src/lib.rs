//! auditrepo-hosting: repository-hosting adapter for auditrepo
//!
//! Exposes the [`HostingClient`] seam the provisioning pipeline talks to,
//! a GitHub implementation over `reqwest`, and an in-memory fake.
//!
//! ## Layer 1 - External Service
//!
//! Focus: every remote failure surfaces as a [`HostingError`] that names the
//! operation and HTTP status; nothing is retried here.

pub mod client;
pub mod error;
pub mod fakes;
pub mod github;
pub mod types;

pub use client::HostingClient;
pub use error::{HostingError, HostingErrorKind, HostingResult};
pub use github::{GitHubClient, GitHubConfig};
pub use types::{
    BoardHandle, BoardTemplate, IssueTemplate, LabelSpec, LabelSyncOutcome, RefOutcome,
    RepoHandle, TagSpec, TemplateOutcome,
};
