//! In-memory fake of [`HostingClient`] (testing only)
//!
//! `MemoryHostingClient` keeps repositories, labels, refs and boards in a
//! `Mutex`-guarded map and journals every call, so pipeline tests can assert
//! both end state and call ordering without network access.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::HostingClient;
use crate::error::{HostingError, HostingErrorKind, HostingResult};
use crate::types::{
    BoardHandle, BoardTemplate, IssueTemplate, LabelSpec, LabelSyncOutcome, RefOutcome,
    RepoHandle, TagSpec, TemplateOutcome,
};

/// Labels GitHub seeds into every new repository.
pub const SEEDED_LABELS: &[&str] = &[
    "bug",
    "documentation",
    "duplicate",
    "enhancement",
    "good first issue",
    "help wanted",
    "invalid",
    "question",
    "wontfix",
];

/// Snapshot of one fake repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepo {
    pub handle: Option<RepoHandle>,
    pub files: BTreeMap<String, String>,
    pub labels: Vec<LabelSpec>,
    pub branches: BTreeMap<String, String>,
    pub tags: BTreeMap<String, TagSpec>,
    pub boards: Vec<BoardHandle>,
}

#[derive(Debug, Default)]
struct State {
    repos: BTreeMap<String, MemoryRepo>,
    board_templates: BTreeSet<(String, u64)>,
    boards_created: u64,
    failures: HashMap<&'static str, HostingErrorKind>,
    calls: Vec<String>,
}

/// In-memory hosting service.
#[derive(Debug)]
pub struct MemoryHostingClient {
    organization: String,
    clone_url_base: String,
    state: Mutex<State>,
}

impl Default for MemoryHostingClient {
    fn default() -> Self {
        Self::new("acme")
    }
}

impl MemoryHostingClient {
    pub fn new(organization: &str) -> Self {
        Self {
            organization: organization.to_string(),
            clone_url_base: format!("https://github.com/{organization}"),
            state: Mutex::new(State::default()),
        }
    }

    /// Clone URLs become `<base>/<name>.git`; point this at a directory of
    /// bare repositories to drive a real git workspace against the fake.
    pub fn with_clone_url_base(mut self, base: &str) -> Self {
        self.clone_url_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Register a template board that `clone_project_board` can copy.
    pub fn with_board_template(self, owner: &str, number: u64) -> Self {
        self.state
            .lock()
            .unwrap()
            .board_templates
            .insert((owner.to_string(), number));
        self
    }

    /// Pretend a repository with `name` already exists.
    pub fn with_existing_repository(self, name: &str) -> Self {
        let handle = self.handle_for(name);
        self.state.lock().unwrap().repos.insert(
            name.to_string(),
            MemoryRepo {
                handle: Some(handle),
                ..MemoryRepo::default()
            },
        );
        self
    }

    /// Make every call of `operation` fail with `kind`.
    pub fn fail_operation(&self, operation: &'static str, kind: HostingErrorKind) {
        self.state.lock().unwrap().failures.insert(operation, kind);
    }

    /// Journal of calls, formatted as `operation:detail`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Position of the first journal entry starting with `prefix`.
    pub fn call_index(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub fn repository(&self, name: &str) -> Option<MemoryRepo> {
        self.state.lock().unwrap().repos.get(name).cloned()
    }

    fn handle_for(&self, name: &str) -> RepoHandle {
        RepoHandle {
            owner: self.organization.clone(),
            name: name.to_string(),
            node_id: format!("R_{name}"),
            clone_url: format!("{}/{name}.git", self.clone_url_base),
            default_branch: "main".to_string(),
        }
    }

    /// Record the call and apply any injected failure.
    fn enter(&self, state: &mut State, operation: &'static str, detail: &str) -> HostingResult<()> {
        state.calls.push(format!("{operation}:{detail}"));
        match state.failures.get(operation) {
            Some(kind) => Err(HostingError::new(
                operation,
                *kind,
                format!("injected failure for {detail}"),
            )),
            None => Ok(()),
        }
    }

    fn repo_mut<'a>(
        state: &'a mut State,
        operation: &'static str,
        repo: &RepoHandle,
    ) -> HostingResult<&'a mut MemoryRepo> {
        state.repos.get_mut(&repo.name).ok_or_else(|| {
            HostingError::new(
                operation,
                HostingErrorKind::NotFound,
                format!("repository {} not found", repo.full_name()),
            )
        })
    }
}

#[async_trait]
impl HostingClient for MemoryHostingClient {
    async fn create_repository(&self, name: &str, _private: bool) -> HostingResult<RepoHandle> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, "create_repository", name)?;
        if state.repos.contains_key(name) {
            return Err(HostingError::new(
                "create_repository",
                HostingErrorKind::AlreadyExists,
                format!("repository {}/{name} already exists", self.organization),
            ));
        }
        let handle = self.handle_for(name);
        state.repos.insert(
            name.to_string(),
            MemoryRepo {
                handle: Some(handle.clone()),
                labels: SEEDED_LABELS
                    .iter()
                    .map(|n| LabelSpec::new(n, "ededed", ""))
                    .collect(),
                ..MemoryRepo::default()
            },
        );
        Ok(handle)
    }

    async fn set_issue_template(
        &self,
        repo: &RepoHandle,
        template: &IssueTemplate,
    ) -> HostingResult<TemplateOutcome> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, "set_issue_template", &template.path)?;
        let entry = Self::repo_mut(&mut state, "set_issue_template", repo)?;
        if entry.files.contains_key(&template.path) {
            return Ok(TemplateOutcome::AlreadyPresent);
        }
        entry
            .files
            .insert(template.path.clone(), template.body.clone());
        Ok(TemplateOutcome::Created)
    }

    async fn ensure_labels(
        &self,
        repo: &RepoHandle,
        labels: &[LabelSpec],
    ) -> HostingResult<LabelSyncOutcome> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, "ensure_labels", &labels.len().to_string())?;
        let entry = Self::repo_mut(&mut state, "ensure_labels", repo)?;
        let mut outcome = LabelSyncOutcome::default();
        for label in labels {
            let exists = entry
                .labels
                .iter()
                .any(|l| l.name.eq_ignore_ascii_case(&label.name));
            if exists {
                outcome.existing.push(label.name.clone());
            } else {
                entry.labels.push(label.clone());
                outcome.created.push(label.name.clone());
            }
        }
        Ok(outcome)
    }

    async fn delete_label(&self, repo: &RepoHandle, name: &str) -> HostingResult<bool> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, "delete_label", name)?;
        let entry = Self::repo_mut(&mut state, "delete_label", repo)?;
        let before = entry.labels.len();
        entry.labels.retain(|l| !l.name.eq_ignore_ascii_case(name));
        Ok(entry.labels.len() != before)
    }

    async fn create_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        from_sha: &str,
    ) -> HostingResult<RefOutcome> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, "create_branch", name)?;
        let entry = Self::repo_mut(&mut state, "create_branch", repo)?;
        if entry.branches.contains_key(name) {
            return Ok(RefOutcome::AlreadyExists);
        }
        entry.branches.insert(name.to_string(), from_sha.to_string());
        Ok(RefOutcome::Created)
    }

    async fn create_tag(&self, repo: &RepoHandle, tag: &TagSpec) -> HostingResult<RefOutcome> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, "create_tag", &tag.name)?;
        let entry = Self::repo_mut(&mut state, "create_tag", repo)?;
        if entry.tags.contains_key(&tag.name) {
            return Ok(RefOutcome::AlreadyExists);
        }
        entry.tags.insert(tag.name.clone(), tag.clone());
        Ok(RefOutcome::Created)
    }

    async fn clone_project_board(
        &self,
        template: &BoardTemplate,
        title: &str,
    ) -> HostingResult<BoardHandle> {
        let mut state = self.state.lock().unwrap();
        self.enter(
            &mut state,
            "clone_project_board",
            &format!("{}#{}", template.owner, template.number),
        )?;
        if !state
            .board_templates
            .contains(&(template.owner.clone(), template.number))
        {
            return Err(HostingError::new(
                "clone_project_board",
                HostingErrorKind::NotFound,
                format!(
                    "project template #{} not found in {}",
                    template.number, template.owner
                ),
            ));
        }
        state.boards_created += 1;
        let number = 1000 + state.boards_created;
        Ok(BoardHandle {
            id: format!("PVT_{number}"),
            number,
            title: title.to_string(),
            url: format!("https://github.com/orgs/{}/projects/{number}", template.owner),
        })
    }

    async fn link_board(&self, repo: &RepoHandle, board: &BoardHandle) -> HostingResult<()> {
        let mut state = self.state.lock().unwrap();
        self.enter(&mut state, "link_board", &board.id)?;
        let entry = Self::repo_mut(&mut state, "link_board", repo)?;
        if !entry.boards.iter().any(|b| b.id == board.id) {
            entry.boards.push(board.clone());
        }
        Ok(())
    }
}
