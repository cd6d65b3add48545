//! Pipeline orchestration.
//!
//! The run advances through [`PipelineState`] in a fixed order:
//!
//! ```text
//! Validated -> RepoCreated -> SourcesIntegrated -> Scaffolded -> BoardAttempted -> Done
//! ```
//!
//! Any error before `BoardAttempted` moves the run to `Failed` and records the
//! stage that was being entered. Nothing created remotely is rolled back; the
//! report says where the run stopped. The board step never fails the run.

use std::sync::Arc;
use std::time::Instant;

use auditrepo_hosting::{HostingClient, RepoHandle};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::board::{BoardOutcome, ProjectBoardProvisioner};
use crate::domain::error::{GitOperationError, ProvisionError, Result};
use crate::domain::request::{ProvisioningRequest, ValidatedRequest};
use crate::domain::settings::PipelineSettings;
use crate::domain::templates::render_readme;
use crate::integrate::SourceIntegrator;
use crate::obs;
use crate::report::{ProvisioningReport, StageStatus};
use crate::scaffold::AuditScaffolder;
use crate::workspace::{Workspace, WorkspaceProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Validated,
    RepoCreated,
    SourcesIntegrated,
    Scaffolded,
    BoardAttempted,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Validated => "validated",
            PipelineState::RepoCreated => "repo_created",
            PipelineState::SourcesIntegrated => "sources_integrated",
            PipelineState::Scaffolded => "scaffolded",
            PipelineState::BoardAttempted => "board_attempted",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether an error while entering this state fails the run.
    pub fn is_fatal_on_error(&self) -> bool {
        !matches!(self, PipelineState::BoardAttempted) && !self.is_terminal()
    }

    /// The state that follows on success.
    pub fn next(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Validated => Some(PipelineState::RepoCreated),
            PipelineState::RepoCreated => Some(PipelineState::SourcesIntegrated),
            PipelineState::SourcesIntegrated => Some(PipelineState::Scaffolded),
            PipelineState::Scaffolded => Some(PipelineState::BoardAttempted),
            PipelineState::BoardAttempted => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error tagged with the stage it interrupted.
struct StageFailed {
    stage: PipelineState,
    started: Instant,
    error: ProvisionError,
}

/// How a stage that returned normally ended.
struct StageDone {
    status: StageStatus,
    detail: String,
}

impl StageDone {
    fn completed(detail: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Completed,
            detail: detail.into(),
        }
    }
}

/// Resources handed from one stage to the next. Dropping it releases the
/// workspace.
#[derive(Default)]
struct Run {
    repo: Option<RepoHandle>,
    ws: Option<Box<dyn Workspace>>,
}

impl Run {
    fn repo(&self) -> Result<&RepoHandle> {
        self.repo.as_ref().ok_or_else(|| not_ready("repository"))
    }

    fn workspace(&mut self) -> Result<&mut (dyn Workspace + 'static)> {
        match self.ws.as_deref_mut() {
            Some(ws) => Ok(ws),
            None => Err(not_ready("workspace")),
        }
    }
}

fn not_ready(what: &str) -> ProvisionError {
    GitOperationError::new("acquire", what, "stage entered before its inputs exist").into()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Drives one provisioning run end to end.
pub struct Orchestrator {
    hosting: Arc<dyn HostingClient>,
    workspaces: Arc<dyn WorkspaceProvider>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        hosting: Arc<dyn HostingClient>,
        workspaces: Arc<dyn WorkspaceProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            hosting,
            workspaces,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the pipeline. Always returns a report; check
    /// [`ProvisioningReport::succeeded`] for the outcome.
    pub async fn run(&self, request: ProvisioningRequest) -> ProvisioningReport {
        let mut report = ProvisioningReport::new(request.target_repo_name.trim());
        let span = obs::pipeline_span(&report.run_id.to_string(), &report.target);
        self.drive(request, &mut report).instrument(span).await;
        report
    }

    async fn drive(&self, request: ProvisioningRequest, report: &mut ProvisioningReport) {
        let run_started = Instant::now();

        let started = self.enter(PipelineState::Validated);
        match request.validate(&self.settings.validation_rules()) {
            Ok(validated) => {
                report.request_digest = Some(validated.digest());
                report.embedding_mode = Some(validated.mode());
                obs::emit_pipeline_started(
                    &report.run_id.to_string(),
                    validated.target_repo_name(),
                    validated.sources().len(),
                    validated.mode().as_str(),
                );
                let detail = format!(
                    "{} source(s), {} auditor(s), {} mode",
                    validated.sources().len(),
                    validated.auditors().len(),
                    validated.mode()
                );
                self.settle(report, PipelineState::Validated, started, StageDone::completed(detail));

                match self.execute(&validated, report).await {
                    Ok(()) => report.finish(PipelineState::Done),
                    Err(failed) => self.fail(report, failed),
                }
            }
            Err(e) => self.fail(
                report,
                StageFailed {
                    stage: PipelineState::Validated,
                    started,
                    error: e.into(),
                },
            ),
        }

        obs::emit_pipeline_finished(
            &report.run_id.to_string(),
            report.final_state.as_str(),
            elapsed_ms(run_started),
        );
    }

    /// Walk the states after `Validated`. An error in a fatal stage stops the
    /// run; an error in a tolerant one degrades that stage and moves on.
    async fn execute(
        &self,
        request: &ValidatedRequest,
        report: &mut ProvisioningReport,
    ) -> std::result::Result<(), StageFailed> {
        let mut run = Run::default();
        let mut state = PipelineState::Validated;
        while let Some(stage) = state.next().filter(|s| !s.is_terminal()) {
            let started = self.enter(stage);
            match self.step(stage, request, &mut run, report).await {
                Ok(done) => self.settle(report, stage, started, done),
                Err(error) if stage.is_fatal_on_error() => {
                    return Err(StageFailed {
                        stage,
                        started,
                        error,
                    })
                }
                Err(error) => {
                    let message = error.to_string();
                    obs::emit_warning(stage.as_str(), &message);
                    report.warn(stage, Some(error.kind()), message.clone());
                    report.record(stage, StageStatus::Degraded, message, elapsed_ms(started));
                }
            }
            state = stage;
        }
        Ok(())
    }

    async fn step(
        &self,
        stage: PipelineState,
        request: &ValidatedRequest,
        run: &mut Run,
        report: &mut ProvisioningReport,
    ) -> Result<StageDone> {
        match stage {
            PipelineState::RepoCreated => self.create_repository(request, run, report).await,
            PipelineState::SourcesIntegrated => self.integrate_sources(request, run, report).await,
            PipelineState::Scaffolded => self.scaffold(request, run, report).await,
            PipelineState::BoardAttempted => self.attempt_board(request, run, report).await,
            PipelineState::Validated | PipelineState::Done | PipelineState::Failed => {
                Ok(StageDone::completed(String::new()))
            }
        }
    }

    async fn create_repository(
        &self,
        request: &ValidatedRequest,
        run: &mut Run,
        report: &mut ProvisioningReport,
    ) -> Result<StageDone> {
        let branch = self.settings.default_branch.as_str();
        let mut repo = self
            .hosting
            .create_repository(request.target_repo_name(), self.settings.private)
            .await?;
        // The target is empty until the push below, which creates its default branch.
        repo.default_branch = branch.to_string();
        report.repository = Some(repo.clone_url.clone());

        let mut ws = self.workspaces.acquire(&repo).await?;
        ws.write_file("README.md", &render_readme(request)).await?;
        ws.commit_all("Initial commit").await?;
        ws.push(branch).await?;

        let detail = repo.full_name();
        run.repo = Some(repo);
        run.ws = Some(ws);
        Ok(StageDone::completed(detail))
    }

    async fn integrate_sources(
        &self,
        request: &ValidatedRequest,
        run: &mut Run,
        report: &mut ProvisioningReport,
    ) -> Result<StageDone> {
        let sources = SourceIntegrator::new(&self.settings.default_branch)
            .integrate_all(run.workspace()?, request)
            .await?;
        let stripped: usize = sources.iter().map(|s| s.stripped.len()).sum();
        let detail = format!(
            "{} source(s) embedded, {} CI definition dir(s) removed",
            sources.len(),
            stripped
        );
        report.sources = sources;
        Ok(StageDone::completed(detail))
    }

    async fn scaffold(
        &self,
        request: &ValidatedRequest,
        run: &mut Run,
        report: &mut ProvisioningReport,
    ) -> Result<StageDone> {
        let repo = run.repo()?.clone();
        let scaffold = AuditScaffolder::new(self.hosting.as_ref(), &self.settings)
            .scaffold(&repo, run.workspace()?, request)
            .await?;
        // Nothing after scaffolding touches the working copy.
        run.ws = None;

        for warning in &scaffold.warnings {
            obs::emit_warning(PipelineState::Scaffolded.as_str(), warning);
            report.warn(PipelineState::Scaffolded, None, warning.clone());
        }
        report.branches = scaffold.branches.iter().map(|b| b.name.clone()).collect();
        Ok(StageDone::completed(format!(
            "{} label(s) created, {} branch(es) at {}",
            scaffold.labels.created.len(),
            scaffold.branches.len(),
            &scaffold.baseline[..scaffold.baseline.len().min(8)]
        )))
    }

    async fn attempt_board(
        &self,
        request: &ValidatedRequest,
        run: &mut Run,
        report: &mut ProvisioningReport,
    ) -> Result<StageDone> {
        let outcome = ProjectBoardProvisioner::new(self.settings.board_template.clone())
            .provision(self.hosting.as_ref(), run.repo()?, request.project_title())
            .await;
        report.board = Some(match &outcome {
            Ok(board) => board.clone(),
            Err(e) => BoardOutcome::failed(e),
        });
        Ok(match outcome? {
            BoardOutcome::Linked { board } => StageDone::completed(board.url),
            BoardOutcome::Skipped { reason } => StageDone {
                status: StageStatus::Skipped,
                detail: reason,
            },
            BoardOutcome::Failed { error, .. } => StageDone {
                status: StageStatus::Degraded,
                detail: error,
            },
        })
    }

    fn enter(&self, stage: PipelineState) -> Instant {
        obs::emit_stage_entered(stage.as_str());
        Instant::now()
    }

    fn settle(
        &self,
        report: &mut ProvisioningReport,
        stage: PipelineState,
        started: Instant,
        done: StageDone,
    ) {
        let duration_ms = elapsed_ms(started);
        if done.status == StageStatus::Completed {
            obs::emit_stage_completed(stage.as_str(), duration_ms, &done.detail);
        }
        report.record(stage, done.status, done.detail, duration_ms);
    }

    fn fail(&self, report: &mut ProvisioningReport, failed: StageFailed) {
        obs::emit_pipeline_failed(failed.stage.as_str(), failed.error.kind(), &failed.error);
        report.fail(failed.stage, &failed.error, elapsed_ms(failed.started));
    }
}
