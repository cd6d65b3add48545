//! End-to-end pipeline runs against the in-memory hosting service and
//! workspace. Covers the happy path, validation, unresolvable sources and
//! the best-effort board step.

use std::sync::Arc;

use async_trait::async_trait;
use auditrepo_core::fakes::{MemoryRemote, MemoryWorkspaceProvider};
use auditrepo_core::{
    BoardOutcome, Orchestrator, PipelineSettings, PipelineState, ProvisioningReport,
    ProvisioningRequest, StageStatus,
};
use auditrepo_hosting::fakes::MemoryHostingClient;
use auditrepo_hosting::{
    BoardHandle, BoardTemplate, HostingClient, HostingError, HostingErrorKind, HostingResult,
    IssueTemplate, LabelSpec, LabelSyncOutcome, RefOutcome, RepoHandle, TagSpec, TemplateOutcome,
};

const VAULT: &str = "https://github.com/acme/vault";
const TARGET: &str = "acme-audit";

const TEMPLATE_FILES: &[(&str, &str)] = &[
    (
        "source/summary_information.conf",
        "project_github = x\ncommit_hash = y\nprivate_github = z\n",
    ),
    (".github/workflows/main.yml", "on: workflow_call"),
    ("main.py", "print('report')"),
];

struct Harness {
    hosting: Arc<MemoryHostingClient>,
    remote: MemoryRemote,
    orchestrator: Orchestrator,
}

fn harness_with(hosting: MemoryHostingClient, settings: PipelineSettings) -> Harness {
    let hosting = Arc::new(hosting);
    let remote = MemoryRemote::new();
    let sha = remote.add_source(&settings.report_template.url, TEMPLATE_FILES);
    remote.set_source_ref(&settings.report_template.url, &settings.report_template.revision, &sha);
    let orchestrator = Orchestrator::new(
        hosting.clone(),
        Arc::new(MemoryWorkspaceProvider::new(remote.clone())),
        settings,
    );
    Harness {
        hosting,
        remote,
        orchestrator,
    }
}

/// Hosting service whose contents-API commits land on the git remote, so a
/// workspace has to pull them before building on top.
struct PublishingHosting {
    inner: Arc<MemoryHostingClient>,
    remote: MemoryRemote,
}

#[async_trait]
impl HostingClient for PublishingHosting {
    async fn create_repository(&self, name: &str, private: bool) -> HostingResult<RepoHandle> {
        self.inner.create_repository(name, private).await
    }

    async fn set_issue_template(
        &self,
        repo: &RepoHandle,
        template: &IssueTemplate,
    ) -> HostingResult<TemplateOutcome> {
        let outcome = self.inner.set_issue_template(repo, template).await?;
        if outcome == TemplateOutcome::Created {
            self.remote
                .commit_file(
                    &repo.default_branch,
                    &template.path,
                    &template.body,
                    &template.commit_message,
                )
                .ok_or_else(|| {
                    HostingError::new(
                        "set_issue_template",
                        HostingErrorKind::NotFound,
                        format!("no branch `{}`", repo.default_branch),
                    )
                })?;
        }
        Ok(outcome)
    }

    async fn ensure_labels(
        &self,
        repo: &RepoHandle,
        labels: &[LabelSpec],
    ) -> HostingResult<LabelSyncOutcome> {
        self.inner.ensure_labels(repo, labels).await
    }

    async fn delete_label(&self, repo: &RepoHandle, name: &str) -> HostingResult<bool> {
        self.inner.delete_label(repo, name).await
    }

    async fn create_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        from_sha: &str,
    ) -> HostingResult<RefOutcome> {
        self.inner.create_branch(repo, name, from_sha).await
    }

    async fn create_tag(&self, repo: &RepoHandle, tag: &TagSpec) -> HostingResult<RefOutcome> {
        self.inner.create_tag(repo, tag).await
    }

    async fn clone_project_board(
        &self,
        template: &BoardTemplate,
        title: &str,
    ) -> HostingResult<BoardHandle> {
        self.inner.clone_project_board(template, title).await
    }

    async fn link_board(&self, repo: &RepoHandle, board: &BoardHandle) -> HostingResult<()> {
        self.inner.link_board(repo, board).await
    }
}

fn publishing_harness(settings: PipelineSettings) -> Harness {
    let hosting = Arc::new(MemoryHostingClient::default());
    let remote = MemoryRemote::new();
    let sha = remote.add_source(&settings.report_template.url, TEMPLATE_FILES);
    remote.set_source_ref(&settings.report_template.url, &settings.report_template.revision, &sha);
    let publishing = PublishingHosting {
        inner: hosting.clone(),
        remote: remote.clone(),
    };
    let workspaces =
        MemoryWorkspaceProvider::new(remote.clone()).with_default_branch(&settings.default_branch);
    let orchestrator = Orchestrator::new(Arc::new(publishing), Arc::new(workspaces), settings);
    Harness {
        hosting,
        remote,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(MemoryHostingClient::default(), PipelineSettings::for_organization("acme"))
}

fn request(json: serde_json::Value) -> ProvisioningRequest {
    serde_json::from_value(json).expect("valid request json")
}

fn single_source_request(commit: &str) -> ProvisioningRequest {
    request(serde_json::json!({
        "targetRepoName": TARGET,
        "projectTitle": "Acme Vault",
        "auditors": "auditor1 auditor2",
        "embeddingMode": "subtree",
        "repositories": [{ "sourceUrl": VAULT, "commitHash": commit }],
    }))
}

fn assert_released(h: &Harness) {
    assert_eq!(h.remote.acquired(), h.remote.released(), "workspace leaked");
}

#[tokio::test]
async fn scenario_a_single_source_at_root() {
    let h = harness();
    let commit = "a".repeat(40);
    h.remote.add_source_commit(
        VAULT,
        &commit,
        &[
            ("src/Vault.sol", "contract Vault {}"),
            (".github/workflows/ci.yml", "on: push"),
        ],
    );

    let report = h.orchestrator.run(single_source_request(&commit)).await;

    assert!(report.succeeded(), "{}", report.render_markdown());
    assert_eq!(report.final_state, PipelineState::Done);
    assert!(report.failure.is_none());

    let tree = h.remote.tree("main");
    assert_eq!(tree["src/Vault.sol"], "contract Vault {}");
    assert!(tree.contains_key("README.md"));

    let tags = h.remote.tags();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags["vault-audit"].target, commit);

    let branches = h.hosting.repository(TARGET).expect("target exists").branches;
    let names: Vec<&str> = branches.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["auditor1", "auditor2", "report"]);
    assert_eq!(report.branches, vec!["auditor1", "auditor2", "report"]);
    assert_released(&h);
}

#[tokio::test]
async fn scenario_b_two_root_sources_fail_validation_without_side_effects() {
    let h = harness();
    let req = request(serde_json::json!({
        "targetRepoName": TARGET,
        "auditors": ["alice"],
        "embeddingMode": "subtree",
        "repositories": [
            { "sourceUrl": VAULT, "commitHash": "a".repeat(40) },
            { "sourceUrl": "https://github.com/acme/token", "commitHash": "b".repeat(40) },
        ],
    }));

    let report = h.orchestrator.run(req).await;

    assert_eq!(report.final_state, PipelineState::Failed);
    let failure = report.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.stage, PipelineState::Validated);
    assert_eq!(failure.kind, "ConfigurationError");
    assert!(h.hosting.calls().is_empty());
    assert!(h.remote.journal().is_empty());
    assert_eq!(h.remote.acquired(), 0);
}

#[tokio::test]
async fn scenario_c_unresolvable_commit_stops_before_scaffolding() {
    let h = harness();
    h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report = h.orchestrator.run(single_source_request(&"c".repeat(40))).await;

    assert_eq!(report.final_state, PipelineState::Failed);
    let failure = report.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.stage, PipelineState::SourcesIntegrated);
    assert_eq!(failure.kind, "SourceResolutionError");
    assert_eq!(
        report.stage(PipelineState::RepoCreated).map(|r| r.status),
        Some(StageStatus::Completed)
    );

    let repo = h.hosting.repository(TARGET).expect("target was created");
    assert!(repo.branches.is_empty());
    assert!(h.hosting.call_index("set_issue_template").is_none());
    assert!(h.hosting.call_index("ensure_labels").is_none());
    assert!(h.remote.tags().is_empty());
    assert_released(&h);
}

#[tokio::test]
async fn scenario_d_missing_board_template_is_best_effort() {
    let mut settings = PipelineSettings::for_organization("acme");
    settings.board_template = Some(BoardTemplate {
        owner: "acme".to_string(),
        number: 404,
    });
    let h = harness_with(MemoryHostingClient::default(), settings);
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report = h.orchestrator.run(single_source_request(&commit)).await;

    assert!(report.succeeded());
    assert!(report.failure.is_none());
    assert!(matches!(report.board, Some(BoardOutcome::Failed { .. })));
    assert_eq!(
        report.stage(PipelineState::BoardAttempted).map(|r| r.status),
        Some(StageStatus::Degraded)
    );

    let best_effort: Vec<_> = report.best_effort_errors().collect();
    assert_eq!(best_effort.len(), 1);
    assert_eq!(best_effort[0].stage, PipelineState::BoardAttempted);
    assert!(report.render_markdown().contains("BestEffortError"));
}

#[tokio::test]
async fn board_is_linked_when_template_exists() {
    let mut settings = PipelineSettings::for_organization("acme");
    settings.board_template = Some(BoardTemplate {
        owner: "acme".to_string(),
        number: 7,
    });
    let h = harness_with(MemoryHostingClient::default().with_board_template("acme", 7), settings);
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report = h.orchestrator.run(single_source_request(&commit)).await;

    match &report.board {
        Some(BoardOutcome::Linked { board }) => assert_eq!(board.title, "Acme Vault"),
        other => panic!("expected linked board, got {other:?}"),
    }
    assert_eq!(h.hosting.repository(TARGET).expect("target").boards.len(), 1);
}

#[tokio::test]
async fn branches_start_from_the_complete_baseline() {
    let h = harness();
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report = h.orchestrator.run(single_source_request(&commit)).await;
    assert!(report.succeeded());

    let head = h.remote.branch_head("main").expect("main pushed");
    let tree = h.remote.tree("main");
    assert!(tree.contains_key("cyfrin-report/report-generator-template/main.py"));
    assert!(tree.contains_key("src/Vault.sol"));

    let repo = h.hosting.repository(TARGET).expect("target");
    assert!(repo.branches.values().all(|sha| *sha == head));

    let first_branch = h.hosting.call_index("create_branch").expect("branches created");
    assert!(h.hosting.call_index("set_issue_template").expect("template set") < first_branch);
    assert!(h.hosting.call_index("ensure_labels").expect("labels applied") < first_branch);
}

#[tokio::test]
async fn no_inherited_ci_definitions_survive() {
    let h = harness();
    let req = request(serde_json::json!({
        "targetRepoName": TARGET,
        "auditors": ["alice"],
        "embeddingMode": "subtree",
        "repositories": [
            { "sourceUrl": VAULT, "commitHash": "a".repeat(40), "subFolder": "vault" },
            { "sourceUrl": "https://github.com/acme/token", "commitHash": "b".repeat(40), "subFolder": "token" },
        ],
    }));
    h.remote.add_source_commit(
        VAULT,
        &"a".repeat(40),
        &[
            ("src/Vault.sol", "contract Vault {}"),
            (".github/workflows/ci.yml", "on: push"),
            (".github/actions/setup/action.yml", "runs: {}"),
        ],
    );
    h.remote.add_source_commit(
        "https://github.com/acme/token",
        &"b".repeat(40),
        &[
            ("src/Token.sol", "contract Token {}"),
            ("lib/dep/.github/workflows/release.yml", "on: push"),
        ],
    );

    let report = h.orchestrator.run(req).await;
    assert!(report.succeeded(), "{}", report.render_markdown());

    let ci_files: Vec<String> = h
        .remote
        .tree("main")
        .keys()
        .filter(|p| p.contains(".github/workflows") || p.contains(".github/action"))
        .cloned()
        .collect();
    assert_eq!(
        ci_files,
        vec![
            ".github/workflows/generate-report.yml".to_string(),
            ".github/workflows/report-generator.yml".to_string(),
        ]
    );
    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.sources[0].stripped.len(), 2);
    assert_eq!(report.sources[1].stripped.len(), 1);
    assert_eq!(h.remote.tags()["token-audit"].target, "b".repeat(40));
}

#[tokio::test]
async fn existing_target_is_never_overwritten() {
    let h = harness_with(
        MemoryHostingClient::default().with_existing_repository(TARGET),
        PipelineSettings::for_organization("acme"),
    );
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report = h.orchestrator.run(single_source_request(&commit)).await;

    let failure = report.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.stage, PipelineState::RepoCreated);
    assert_eq!(failure.kind, "HostingError");
    assert_eq!(h.remote.acquired(), 0);
}

#[tokio::test]
async fn push_failure_is_a_git_error_and_releases_workspace() {
    let h = harness();
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);
    h.remote.fail_operation("push");

    let report = h.orchestrator.run(single_source_request(&commit)).await;

    let failure = report.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.stage, PipelineState::RepoCreated);
    assert_eq!(failure.kind, "GitOperationError");
    assert_eq!(h.remote.acquired(), 1);
    assert_released(&h);
}

#[tokio::test]
async fn label_failure_aborts_at_scaffolding() {
    let h = harness();
    h.hosting.fail_operation("ensure_labels", HostingErrorKind::Unauthorized);
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report: ProvisioningReport = h.orchestrator.run(single_source_request(&commit)).await;

    let failure = report.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.stage, PipelineState::Scaffolded);
    assert!(h.hosting.call_index("create_branch").is_none());
    assert_eq!(h.remote.tags().len(), 1, "sources stay integrated");
}

#[tokio::test]
async fn report_round_trips_through_json() {
    let h = harness();
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);
    let report = h.orchestrator.run(single_source_request(&commit)).await;

    let json = serde_json::to_string_pretty(&report).expect("serialize");
    let back: ProvisioningReport = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, report);
    assert_eq!(back.request_digest.as_deref().map(str::len), Some(64));
}

#[tokio::test]
async fn every_branch_head_carries_the_issue_template() {
    let settings = PipelineSettings::for_organization("acme");
    let template_path = settings.issue_template.path.clone();
    let h = publishing_harness(settings);
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report = h.orchestrator.run(single_source_request(&commit)).await;
    assert!(report.succeeded(), "{}", report.render_markdown());

    let journal = h.remote.journal();
    let published = journal
        .iter()
        .position(|c| c.starts_with("remote_commit:"))
        .expect("template committed by the service");
    assert!(journal[published..].iter().any(|c| c == "pull:main"));

    let branches = h.hosting.repository(TARGET).expect("target").branches;
    assert_eq!(branches.len(), 3);
    for (name, sha) in &branches {
        let tree = h.remote.commit(sha).expect("branch commit pushed").tree;
        assert!(tree.contains_key(&template_path), "{name} lacks the issue template");
        assert!(tree.contains_key("cyfrin-report/report-generator-template/main.py"));
    }
}

#[tokio::test]
async fn configured_default_branch_receives_service_commits() {
    let mut settings = PipelineSettings::for_organization("acme");
    settings.default_branch = "trunk".to_string();
    let template_path = settings.issue_template.path.clone();
    let h = publishing_harness(settings);
    let commit = h.remote.add_source(VAULT, &[("src/Vault.sol", "contract Vault {}")]);

    let report = h.orchestrator.run(single_source_request(&commit)).await;
    assert!(report.succeeded(), "{}", report.render_markdown());

    assert!(h.remote.branch_head("main").is_none());
    assert!(h.remote.tree("trunk").contains_key(&template_path));
}
