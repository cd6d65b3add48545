//! Best-effort project board provisioning.

use auditrepo_hosting::{BoardHandle, BoardTemplate, HostingClient, HostingError, RepoHandle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::error::BestEffortError;

/// Title used when the request carries none.
pub const DEFAULT_BOARD_TITLE: &str = "DEFAULT PROJECT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BoardOutcome {
    Linked { board: BoardHandle },
    /// No template configured.
    Skipped { reason: String },
    Failed { error: String, step: String },
}

impl BoardOutcome {
    pub(crate) fn failed(error: &BestEffortError) -> Self {
        BoardOutcome::Failed {
            step: error.step.to_string(),
            error: error.to_string(),
        }
    }
}

/// Copies a template board and links the copy to the target repository.
#[derive(Debug, Clone, Default)]
pub struct ProjectBoardProvisioner {
    template: Option<BoardTemplate>,
}

impl ProjectBoardProvisioner {
    pub fn new(template: Option<BoardTemplate>) -> Self {
        Self { template }
    }

    /// Copy and link the board. `Ok` is either [`BoardOutcome::Linked`] or
    /// [`BoardOutcome::Skipped`]; the caller decides what a failure costs.
    pub async fn provision(
        &self,
        hosting: &dyn HostingClient,
        repo: &RepoHandle,
        title: &str,
    ) -> Result<BoardOutcome, BestEffortError> {
        let Some(template) = &self.template else {
            return Ok(BoardOutcome::Skipped {
                reason: "no board template configured".to_string(),
            });
        };
        let title = if title.trim().is_empty() {
            DEFAULT_BOARD_TITLE
        } else {
            title.trim()
        };

        let board = hosting
            .clone_project_board(template, title)
            .await
            .map_err(|e| step_failed("clone_project_board", e))?;
        hosting
            .link_board(repo, &board)
            .await
            .map_err(|e| step_failed("link_board", e))?;
        info!(board = %board.url, title = %board.title, "project board linked");
        Ok(BoardOutcome::Linked { board })
    }
}

fn step_failed(step: &'static str, error: HostingError) -> BestEffortError {
    warn!(step, reason = %error, "project board step failed");
    BestEffortError {
        step,
        reason: error.to_string(),
    }
}
