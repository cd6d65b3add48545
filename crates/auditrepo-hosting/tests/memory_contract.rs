//! Behavioural contract every `HostingClient` must honour, checked against
//! the in-memory implementation through the trait object.

use auditrepo_hosting::fakes::MemoryHostingClient;
use auditrepo_hosting::{
    BoardTemplate, HostingClient, HostingErrorKind, IssueTemplate, LabelSpec, RefOutcome, TagSpec,
    TemplateOutcome,
};

fn issue_template() -> IssueTemplate {
    IssueTemplate {
        path: ".github/ISSUE_TEMPLATE/finding.md".to_string(),
        body: "## Description\n".to_string(),
        commit_message: "Add finding issue template".to_string(),
    }
}

#[tokio::test]
async fn repository_names_are_never_reused() {
    let client = MemoryHostingClient::new("acme");
    let hosting: &dyn HostingClient = &client;

    let repo = hosting.create_repository("audit", true).await.unwrap();
    assert_eq!(repo.full_name(), "acme/audit");
    assert_eq!(repo.clone_url, "https://github.com/acme/audit.git");

    let err = hosting.create_repository("audit", true).await.unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(err.operation, "create_repository");
}

#[tokio::test]
async fn issue_template_and_labels_are_idempotent() {
    let client = MemoryHostingClient::default();
    let hosting: &dyn HostingClient = &client;
    let repo = hosting.create_repository("audit", true).await.unwrap();

    assert_eq!(
        hosting.set_issue_template(&repo, &issue_template()).await.unwrap(),
        TemplateOutcome::Created
    );
    assert_eq!(
        hosting.set_issue_template(&repo, &issue_template()).await.unwrap(),
        TemplateOutcome::AlreadyPresent
    );

    let labels = vec![
        LabelSpec::new("Severity: High Risk", "ff3300", ""),
        LabelSpec::new("bug", "d73a4a", ""),
    ];
    let first = hosting.ensure_labels(&repo, &labels).await.unwrap();
    assert_eq!(first.created, vec!["Severity: High Risk"]);
    assert_eq!(first.existing, vec!["bug"]);

    let second = hosting.ensure_labels(&repo, &labels).await.unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.existing.len(), 2);

    assert!(hosting.delete_label(&repo, "BUG").await.unwrap());
    assert!(!hosting.delete_label(&repo, "bug").await.unwrap());
}

#[tokio::test]
async fn existing_refs_are_left_untouched() {
    let client = MemoryHostingClient::default();
    let hosting: &dyn HostingClient = &client;
    let repo = hosting.create_repository("audit", true).await.unwrap();
    let first = "a".repeat(40);
    let second = "b".repeat(40);

    assert_eq!(
        hosting.create_branch(&repo, "alice", &first).await.unwrap(),
        RefOutcome::Created
    );
    assert_eq!(
        hosting.create_branch(&repo, "alice", &second).await.unwrap(),
        RefOutcome::AlreadyExists
    );
    assert_eq!(client.repository("audit").unwrap().branches["alice"], first);

    let tag = TagSpec {
        name: "vault-audit".to_string(),
        target: first.clone(),
        message: "scope".to_string(),
    };
    assert_eq!(hosting.create_tag(&repo, &tag).await.unwrap(), RefOutcome::Created);
    assert_eq!(hosting.create_tag(&repo, &tag).await.unwrap(), RefOutcome::AlreadyExists);
}

#[tokio::test]
async fn boards_are_copied_then_linked_once() {
    let client = MemoryHostingClient::default().with_board_template("acme", 3);
    let hosting: &dyn HostingClient = &client;
    let repo = hosting.create_repository("audit", true).await.unwrap();
    let template = BoardTemplate {
        owner: "acme".to_string(),
        number: 3,
    };

    let board = hosting.clone_project_board(&template, "Acme").await.unwrap();
    assert_eq!(board.title, "Acme");
    hosting.link_board(&repo, &board).await.unwrap();
    hosting.link_board(&repo, &board).await.unwrap();
    assert_eq!(client.repository("audit").unwrap().boards.len(), 1);

    let missing = BoardTemplate {
        owner: "acme".to_string(),
        number: 4,
    };
    let err = hosting.clone_project_board(&missing, "Acme").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn calls_against_unknown_repository_are_not_found() {
    let other = MemoryHostingClient::default();
    let repo = other.create_repository("elsewhere", true).await.unwrap();

    let client = MemoryHostingClient::default();
    let err = client.ensure_labels(&repo, &[]).await.unwrap_err();
    assert_eq!(err.kind, HostingErrorKind::NotFound);
    assert_eq!(client.calls(), vec!["ensure_labels:0"]);
}
