use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::board::BoardOutcome;
use crate::domain::error::ProvisionError;
use crate::domain::request::EmbeddingMode;
use crate::integrate::IntegratedSource;
use crate::orchestrator::PipelineState;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Finished, but a best-effort step inside it failed.
    Degraded,
    Skipped,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Degraded => "degraded",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PipelineState,
    pub status: StageStatus,
    pub detail: String,
    pub duration_ms: u64,
}

/// The fatal error that ended a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: PipelineState,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWarning {
    pub stage: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: String,
}

/// Outcome of one provisioning run, written for operators and CI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub target: String,
    pub repository: Option<String>,
    pub request_digest: Option<String>,
    pub embedding_mode: Option<EmbeddingMode>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last state reached; `done` or `failed` once the run is over.
    pub final_state: PipelineState,
    pub stages: Vec<StageRecord>,
    pub sources: Vec<IntegratedSource>,
    pub branches: Vec<String>,
    pub board: Option<BoardOutcome>,
    pub warnings: Vec<ReportWarning>,
    pub failure: Option<StageFailure>,
}

impl ProvisioningReport {
    pub fn new(target: &str) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            target: target.to_string(),
            repository: None,
            request_digest: None,
            embedding_mode: None,
            started_at: Utc::now(),
            finished_at: None,
            final_state: PipelineState::Validated,
            stages: Vec::new(),
            sources: Vec::new(),
            branches: Vec::new(),
            board: None,
            warnings: Vec::new(),
            failure: None,
        }
    }

    /// Record a stage outcome. Any non-failed status advances `final_state`.
    pub fn record(&mut self, stage: PipelineState, status: StageStatus, detail: String, duration_ms: u64) {
        if status != StageStatus::Failed {
            self.final_state = stage;
        }
        self.stages.push(StageRecord {
            stage,
            status,
            detail,
            duration_ms,
        });
    }

    pub fn warn(&mut self, stage: PipelineState, kind: Option<&str>, message: String) {
        self.warnings.push(ReportWarning {
            stage,
            kind: kind.map(str::to_string),
            message,
        });
    }

    pub fn fail(&mut self, stage: PipelineState, error: &ProvisionError, duration_ms: u64) {
        let message = error.to_string();
        self.record(stage, StageStatus::Failed, message.clone(), duration_ms);
        self.failure = Some(StageFailure {
            stage,
            kind: error.kind().to_string(),
            message,
        });
        self.finish(PipelineState::Failed);
    }

    pub fn finish(&mut self, state: PipelineState) {
        self.final_state = state;
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.final_state == PipelineState::Done
    }

    pub fn stage(&self, stage: PipelineState) -> Option<&StageRecord> {
        self.stages.iter().rev().find(|r| r.stage == stage)
    }

    /// Warnings raised by best-effort steps.
    pub fn best_effort_errors(&self) -> impl Iterator<Item = &ReportWarning> {
        self.warnings
            .iter()
            .filter(|w| w.kind.as_deref() == Some("BestEffortError"))
    }

    pub fn render_markdown(&self) -> String {
        render_report_md(self)
    }
}

/// Render the Markdown summary printed at the end of a run.
pub fn render_report_md(report: &ProvisioningReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Provisioning Report: {}\n\n", report.target));

    let result = match &report.failure {
        Some(failure) => format!("failed at `{}`", failure.stage),
        None => report.final_state.to_string(),
    };
    out.push_str(&format!("- run: `{}`\n", report.run_id));
    out.push_str(&format!("- result: **{}**\n", result));
    if let Some(repo) = &report.repository {
        out.push_str(&format!("- repository: {}\n", repo));
    }
    if let Some(mode) = report.embedding_mode {
        out.push_str(&format!("- embedding: {}\n", mode));
    }
    if let Some(digest) = &report.request_digest {
        out.push_str(&format!("- request digest: `{}`\n", digest));
    }
    out.push('\n');

    out.push_str("## Stages\n");
    out.push_str("| Stage | Status | Duration (ms) | Detail |\n|---|---|---|---|\n");
    for record in &report.stages {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            record.stage,
            record.status.as_str(),
            record.duration_ms,
            record.detail.replace('|', "\\|")
        ));
    }
    out.push('\n');

    if !report.sources.is_empty() {
        out.push_str("## Sources\n");
        out.push_str("| Source | Commit | Path | Tag | CI dirs removed |\n|---|---|---|---|---|\n");
        for source in &report.sources {
            let path = if source.destination.is_empty() {
                "<root>"
            } else {
                source.destination.as_str()
            };
            out.push_str(&format!(
                "| {} | `{}` | `{}` | `{}` | {} |\n",
                source.url,
                &source.commit[..source.commit.len().min(12)],
                path,
                source.tag,
                source.stripped.len()
            ));
        }
        out.push('\n');
    }

    if !report.branches.is_empty() {
        out.push_str("## Branches\n");
        for branch in &report.branches {
            out.push_str(&format!("- `{}`\n", branch));
        }
        out.push('\n');
    }

    if let Some(board) = &report.board {
        out.push_str("## Project Board\n");
        match board {
            BoardOutcome::Linked { board } => {
                out.push_str(&format!("- linked: [{}]({})\n", board.title, board.url))
            }
            BoardOutcome::Skipped { reason } => out.push_str(&format!("- skipped: {}\n", reason)),
            BoardOutcome::Failed { error, .. } => out.push_str(&format!("- failed: {}\n", error)),
        }
        out.push('\n');
    }

    if !report.warnings.is_empty() {
        out.push_str("## Warnings\n");
        for warning in &report.warnings {
            match &warning.kind {
                Some(kind) => out.push_str(&format!(
                    "- [{}] {}: {}\n",
                    warning.stage, kind, warning.message
                )),
                None => out.push_str(&format!("- [{}] {}\n", warning.stage, warning.message)),
            }
        }
        out.push('\n');
    }

    if let Some(failure) = &report.failure {
        out.push_str("## Failure\n");
        out.push_str(&format!(
            "- stage: `{}`\n- kind: {}\n- message: {}\n",
            failure.stage, failure.kind, failure.message
        ));
    }
    out
}

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, report: &ProvisioningReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize provisioning report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write the Markdown summary.
pub fn write_report_md(path: &Path, report: &ProvisioningReport) -> Result<()> {
    std::fs::write(path, render_report_md(report)).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{BestEffortError, GitOperationError};
    use serde_json::json;

    fn fixed(target: &str) -> ProvisioningReport {
        let mut report = ProvisioningReport::new(target);
        report.run_id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("valid UUID");
        report.started_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        report
    }

    #[test]
    fn failure_records_stage_and_kind() {
        let mut report = fixed("acme-audit");
        report.record(PipelineState::Validated, StageStatus::Completed, "ok".into(), 1);
        report.record(PipelineState::RepoCreated, StageStatus::Completed, "acme/acme-audit".into(), 2);
        let err: ProvisionError = GitOperationError::new("push", "main", "rejected").into();
        report.fail(PipelineState::SourcesIntegrated, &err, 3);

        assert!(!report.succeeded());
        assert_eq!(report.final_state, PipelineState::Failed);
        let failure = report.failure.as_ref().expect("failure recorded");
        assert_eq!(failure.stage, PipelineState::SourcesIntegrated);
        assert_eq!(failure.kind, "GitOperationError");
        assert_eq!(
            report.stage(PipelineState::SourcesIntegrated).map(|r| r.status),
            Some(StageStatus::Failed)
        );
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn best_effort_warnings_are_filterable() {
        let mut report = fixed("acme-audit");
        report.warn(PipelineState::Scaffolded, None, "summary missing".into());
        let err = BestEffortError {
            step: "clone_project_board",
            reason: "not found".to_string(),
        };
        report.warn(PipelineState::BoardAttempted, Some("BestEffortError"), err.to_string());
        report.finish(PipelineState::Done);

        assert!(report.succeeded());
        assert_eq!(report.best_effort_errors().count(), 1);
    }

    #[test]
    fn report_schema_has_expected_keys() {
        let mut report = fixed("acme-audit");
        report.finish(PipelineState::Done);
        let raw = serde_json::to_value(&report).expect("serialize report");
        let obj = raw.as_object().expect("report object");
        for key in ["schema_version", "run_id", "target", "final_state", "stages", "sources", "warnings"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(raw["final_state"], json!("done"));
    }

    #[test]
    fn markdown_render_is_stable() {
        let mut report = fixed("acme-audit");
        report.repository = Some("https://github.com/acme/acme-audit.git".to_string());
        report.record(PipelineState::Validated, StageStatus::Completed, "1 source(s)".into(), 0);
        report.branches = vec!["alice".to_string(), "report".to_string()];
        report.finish(PipelineState::Done);

        let expected = "# Provisioning Report: acme-audit\n\n- run: `11111111-1111-1111-1111-111111111111`\n- result: **done**\n- repository: https://github.com/acme/acme-audit.git\n\n## Stages\n| Stage | Status | Duration (ms) | Detail |\n|---|---|---|---|\n| validated | completed | 0 | 1 source(s) |\n\n## Branches\n- `alice`\n- `report`\n\n";
        assert_eq!(report.render_markdown(), expected);
    }

    #[test]
    fn writes_json_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let mut report = fixed("acme-audit");
        report.finish(PipelineState::Done);
        write_report_json(&path, &report).expect("write report");
        let back: ProvisioningReport =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(back, report);
    }

    #[test]
    fn writes_markdown_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.md");
        let mut report = fixed("acme-audit");
        report.finish(PipelineState::Done);
        write_report_md(&path, &report).expect("write report");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), report.render_markdown());
    }
}
