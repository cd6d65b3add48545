//! Source integration: embed, sanitize, commit, push and tag each source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::error::{GitOperationError, ProvisionError, Result};
use crate::domain::remote::RemoteUrl;
use crate::domain::request::{EmbeddingMode, PlannedSource, ValidatedRequest};
use crate::gitmodules;
use crate::workspace::{ci_dirs_in, Workspace};

/// What landed in the target for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegratedSource {
    pub name: String,
    pub url: String,
    pub commit: String,
    /// Empty for the repository root.
    pub destination: String,
    pub tag: String,
    /// Commit the tag points at.
    pub tag_target: String,
    /// Target-repository commit that introduced the source.
    pub embedding_commit: String,
    /// CI definition directories removed from the embedded tree.
    pub stripped: Vec<String>,
}

/// Embeds every source of a request, in request order.
#[derive(Debug, Clone)]
pub struct SourceIntegrator {
    default_branch: String,
}

impl SourceIntegrator {
    pub fn new(default_branch: &str) -> Self {
        Self {
            default_branch: default_branch.to_string(),
        }
    }

    /// Integrate all sources. Stops at the first failure; sources already
    /// integrated stay committed and pushed.
    pub async fn integrate_all(
        &self,
        ws: &mut dyn Workspace,
        request: &ValidatedRequest,
    ) -> Result<Vec<IntegratedSource>> {
        let mut integrated = Vec::with_capacity(request.sources().len());
        for source in request.sources() {
            integrated.push(self.integrate(ws, request.mode(), source).await?);
        }
        Ok(integrated)
    }

    pub async fn integrate(
        &self,
        ws: &mut dyn Workspace,
        mode: EmbeddingMode,
        source: &PlannedSource,
    ) -> Result<IntegratedSource> {
        let url = RemoteUrl::new(&source.url, None);
        let destination = source.destination.as_str();
        info!(
            source = %source.url,
            commit = %source.commit,
            destination = %source.destination_label(),
            mode = %mode,
            "embedding source"
        );

        let before = visible_contents(ws, destination).await?;

        let resolved = match mode {
            EmbeddingMode::Subtree => ws.merge_subtree(&url, destination, &source.commit).await?,
            EmbeddingMode::Submodule => ws.add_submodule(&url, destination, &source.commit).await?,
        };

        let after = visible_contents(ws, destination).await?;
        if !after.iter().any(|(path, contents)| before.get(path) != Some(contents)) {
            return Err(ProvisionError::source_resolution(
                &source.url,
                &source.commit,
                format!("no files found under {}", source.destination_label()),
            ));
        }

        // A submodule commits only a pointer; its checked-out files never
        // reach the target's tree, so there is nothing of it to strip.
        let stripped = match mode {
            EmbeddingMode::Subtree => {
                let stripped = strip_ci_definitions(ws, destination).await?;
                fold_nested_gitmodules(ws, destination).await?;
                stripped
            }
            EmbeddingMode::Submodule => Vec::new(),
        };

        let short = &source.commit[..8.min(source.commit.len())];
        let message = format!("Add {} at commit {}", source.name, short);
        let embedding_commit = match ws.commit_all(&message).await? {
            Some(sha) => sha,
            None => ws.head_commit().await?,
        };
        ws.push(&self.default_branch).await?;

        // Subtree merges bring the source commit into the target's history;
        // a submodule only records a pointer, so the tag marks the embedding.
        let tag_target = match mode {
            EmbeddingMode::Subtree => resolved,
            EmbeddingMode::Submodule => embedding_commit.clone(),
        };
        let tag_message = format!(
            "Audit scope: {} at {} ({})",
            source.url,
            source.commit,
            source.destination_label()
        );
        ws.tag(&source.tag, &tag_target, &tag_message).await?;
        ws.push_tag(&source.tag).await?;

        info!(
            source = %source.url,
            tag = %source.tag,
            commit = %embedding_commit,
            stripped = stripped.len(),
            "source integrated"
        );

        Ok(IntegratedSource {
            name: source.name.clone(),
            url: source.url.clone(),
            commit: source.commit.clone(),
            destination: source.destination.clone(),
            tag: source.tag.clone(),
            tag_target,
            embedding_commit,
            stripped,
        })
    }
}

/// A file counts when no path component below `root` is hidden.
fn is_visible(path: &str, root: &str) -> bool {
    let relative = if root.is_empty() {
        path
    } else {
        path.strip_prefix(root)
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(path)
    };
    !relative.is_empty() && relative.split('/').all(|c| !c.starts_with('.'))
}

/// Visible files under `root` with their contents.
async fn visible_contents(ws: &mut dyn Workspace, root: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for file in ws.list_files(root).await? {
        if !is_visible(&file, root) {
            continue;
        }
        if let Some(contents) = ws.read_file(&file).await? {
            out.insert(file, contents);
        }
    }
    Ok(out)
}

/// Remove every CI definition directory under `root` and check none remain.
pub async fn strip_ci_definitions(ws: &mut dyn Workspace, root: &str) -> Result<Vec<String>> {
    let files = ws.list_files(root).await?;
    let dirs = ci_dirs_in(&files, root);
    for dir in &dirs {
        debug!(path = %dir, "stripping CI definitions");
        ws.strip_path(dir).await?;
    }

    let remaining = ci_dirs_in(&ws.list_files(root).await?, root);
    if let Some(dir) = remaining.first() {
        return Err(GitOperationError::new(
            "strip_path",
            dir.as_str(),
            "CI definitions still present after stripping",
        )
        .into());
    }
    Ok(dirs)
}

async fn fold_nested_gitmodules(ws: &mut dyn Workspace, root: &str) -> Result<()> {
    let mut nested = Vec::new();
    for file in ws.list_files(root).await? {
        let Some(dir) = file.strip_suffix("/.gitmodules") else {
            continue;
        };
        if let Some(contents) = ws.read_file(&file).await? {
            nested.push((dir.to_string(), contents));
        }
    }
    if nested.is_empty() {
        return Ok(());
    }

    let root_file = ws.read_file(".gitmodules").await?;
    let folded = gitmodules::fold_nested(root_file.as_deref(), &nested);
    if root_file.as_deref() != Some(folded.as_str()) {
        debug!(count = nested.len(), "folding nested .gitmodules into root");
        ws.write_file(".gitmodules", &folded).await?;
    }
    Ok(())
}
