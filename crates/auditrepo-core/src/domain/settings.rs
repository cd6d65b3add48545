//! Pipeline settings: everything the run needs besides the request itself.

use auditrepo_hosting::{BoardTemplate, IssueTemplate};
use serde::{Deserialize, Serialize};

use crate::domain::labels::AuditLabelSet;
use crate::domain::request::ValidationRules;
use crate::domain::templates::{FINDING_TEMPLATE, ISSUE_TEMPLATE_PATH};

/// Name of the branch the report is generated from.
pub const REPORT_BRANCH: &str = "report";

/// Author identity for commits made by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            name: "auditrepo".to_string(),
            email: "auditrepo@users.noreply.github.com".to_string(),
        }
    }
}

/// Report generator template embedded into every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportTemplateSettings {
    pub url: String,
    pub revision: String,
    /// Destination inside the target repository.
    pub path: String,
    /// Name of the on-demand workflow written at the root.
    pub workflow_name: String,
}

impl Default for ReportTemplateSettings {
    fn default() -> Self {
        Self {
            url: "https://github.com/Cyfrin/report-generator-template.git".to_string(),
            revision: "main".to_string(),
            path: "cyfrin-report/report-generator-template".to_string(),
            workflow_name: "generate-report".to_string(),
        }
    }
}

/// Settings for one pipeline run. Every field has a default, so a settings
/// overlay file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub organization: String,
    /// Hosting REST API root.
    pub api_url: String,
    pub default_branch: String,
    pub private: bool,
    pub identity: GitIdentity,
    pub report_template: ReportTemplateSettings,
    pub board_template: Option<BoardTemplate>,
    pub labels: AuditLabelSet,
    /// Delete the hosting service's seeded labels before applying ours.
    pub prune_default_labels: bool,
    /// Prepended to each auditor id to form the branch name.
    pub auditor_branch_prefix: String,
    pub issue_template: IssueTemplate,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            organization: String::new(),
            api_url: "https://api.github.com".to_string(),
            default_branch: "main".to_string(),
            private: true,
            identity: GitIdentity::default(),
            report_template: ReportTemplateSettings::default(),
            board_template: None,
            labels: AuditLabelSet::default(),
            prune_default_labels: true,
            auditor_branch_prefix: String::new(),
            issue_template: IssueTemplate {
                path: ISSUE_TEMPLATE_PATH.to_string(),
                body: FINDING_TEMPLATE.to_string(),
                commit_message: "Add finding issue template".to_string(),
            },
        }
    }
}

impl PipelineSettings {
    pub fn for_organization(organization: &str) -> Self {
        Self {
            organization: organization.to_string(),
            ..Self::default()
        }
    }

    /// Validation limits implied by these settings: the report template path
    /// and the branches the pipeline creates itself are off limits.
    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            reserved_paths: vec![self.report_template.path.trim_matches('/').to_string()],
            reserved_branches: vec![self.default_branch.clone(), REPORT_BRANCH.to_string()],
            auditor_branch_prefix: self.auditor_branch_prefix.clone(),
        }
    }

    pub fn auditor_branch(&self, auditor: &str) -> String {
        format!("{}{}", self.auditor_branch_prefix, auditor)
    }
}
