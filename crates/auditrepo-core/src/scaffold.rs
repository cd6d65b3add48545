//! Audit scaffolding: issue template, labels, report template, branches.
//!
//! Every step is safe to repeat against an already scaffolded repository:
//! an existing issue template is left alone, labels are matched by name,
//! an installed report template is not merged again, and existing branches
//! are skipped.

use auditrepo_hosting::{
    HostingClient, LabelSyncOutcome, RefOutcome, RepoHandle, TemplateOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::error::Result;
use crate::domain::remote::RemoteUrl;
use crate::domain::request::ValidatedRequest;
use crate::domain::settings::{PipelineSettings, REPORT_BRANCH};
use crate::domain::templates::{
    render_report_workflow, rewrite_summary_conf, RELOCATED_WORKFLOW, SUMMARY_CONF,
    TEMPLATE_WORKFLOW,
};
use crate::integrate::strip_ci_definitions;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportTemplateOutcome {
    Installed { commit: String, revision: String },
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOutcome {
    pub name: String,
    pub outcome: RefOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldOutcome {
    pub issue_template: TemplateOutcome,
    pub pruned_labels: Vec<String>,
    pub labels: LabelSyncOutcome,
    pub report_template: ReportTemplateOutcome,
    /// Default-branch commit every branch was cut from.
    pub baseline: String,
    pub branches: Vec<BranchOutcome>,
    pub warnings: Vec<String>,
}

pub struct AuditScaffolder<'a> {
    hosting: &'a dyn HostingClient,
    settings: &'a PipelineSettings,
}

impl<'a> AuditScaffolder<'a> {
    pub fn new(hosting: &'a dyn HostingClient, settings: &'a PipelineSettings) -> Self {
        Self { hosting, settings }
    }

    /// Apply issue template, labels and report template, then cut the
    /// auditor and report branches from the resulting default branch head.
    pub async fn scaffold(
        &self,
        repo: &RepoHandle,
        ws: &mut dyn Workspace,
        request: &ValidatedRequest,
    ) -> Result<ScaffoldOutcome> {
        let mut warnings = Vec::new();
        let branch = self.settings.default_branch.as_str();

        let issue_template = self
            .hosting
            .set_issue_template(repo, &self.settings.issue_template)
            .await?;
        if issue_template == TemplateOutcome::Created {
            // The API committed on the default branch; catch up before adding more.
            ws.pull(branch).await?;
        }

        let mut pruned_labels = Vec::new();
        if self.settings.prune_default_labels {
            for name in self.settings.labels.prunable_defaults() {
                if self.hosting.delete_label(repo, name).await? {
                    pruned_labels.push(name.to_string());
                }
            }
        }
        let labels = self
            .hosting
            .ensure_labels(repo, &self.settings.labels.all())
            .await?;
        info!(
            created = labels.created.len(),
            existing = labels.existing.len(),
            pruned = pruned_labels.len(),
            "labels applied"
        );

        let report_template = self.install_report_template(repo, ws, request, &mut warnings).await?;

        let baseline = ws.head_commit().await?;
        let mut names: Vec<String> = request
            .auditors()
            .iter()
            .map(|a| self.settings.auditor_branch(a))
            .collect();
        names.push(REPORT_BRANCH.to_string());

        let mut branches = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.hosting.create_branch(repo, &name, &baseline).await?;
            if outcome == RefOutcome::AlreadyExists {
                info!(branch = %name, "branch already exists, leaving it untouched");
            }
            branches.push(BranchOutcome { name, outcome });
        }

        Ok(ScaffoldOutcome {
            issue_template,
            pruned_labels,
            labels,
            report_template,
            baseline,
            branches,
            warnings,
        })
    }

    async fn install_report_template(
        &self,
        repo: &RepoHandle,
        ws: &mut dyn Workspace,
        request: &ValidatedRequest,
        warnings: &mut Vec<String>,
    ) -> Result<ReportTemplateOutcome> {
        let template = &self.settings.report_template;
        let path = template.path.trim_matches('/');

        if !ws.list_files(path).await?.is_empty() {
            info!(path = %path, "report template already present");
            return Ok(ReportTemplateOutcome::AlreadyPresent);
        }

        let url = RemoteUrl::new(&template.url, None);
        let resolved = ws.merge_subtree(&url, path, &template.revision).await?;

        let shipped = format!("{path}/{TEMPLATE_WORKFLOW}");
        match ws.read_file(&shipped).await? {
            Some(workflow) => ws.write_file(RELOCATED_WORKFLOW, &workflow).await?,
            None => {
                let message = format!("report template has no {TEMPLATE_WORKFLOW}; report workflow will not run");
                warn!("{message}");
                warnings.push(message);
            }
        }
        strip_ci_definitions(ws, path).await?;

        let workflow_path = format!(".github/workflows/{}.yml", template.workflow_name);
        ws.write_file(
            &workflow_path,
            &render_report_workflow(&template.workflow_name, REPORT_BRANCH, path),
        )
        .await?;

        let summary_path = format!("{path}/{SUMMARY_CONF}");
        match ws.read_file(&summary_path).await? {
            Some(contents) => {
                let updated = rewrite_summary_conf(&contents, request.sources(), &repo.clone_url);
                ws.write_file(&summary_path, &updated).await?;
            }
            None => {
                let message = format!("{summary_path} not found; project summary left unset");
                warn!("{message}");
                warnings.push(message);
            }
        }

        let commit = match ws.commit_all("install: report-generator-template").await? {
            Some(sha) => sha,
            None => ws.head_commit().await?,
        };
        ws.push(&self.settings.default_branch).await?;
        info!(path = %path, revision = %resolved, "report template installed");

        Ok(ReportTemplateOutcome::Installed {
            commit,
            revision: resolved,
        })
    }
}
