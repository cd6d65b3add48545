//! Text artifacts written into the target repository.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::request::{PlannedSource, ValidatedRequest};

/// Where the finding issue template lives.
pub const ISSUE_TEMPLATE_PATH: &str = ".github/ISSUE_TEMPLATE/finding.md";

/// Default finding template body.
pub const FINDING_TEMPLATE: &str = "---
name: Finding
about: Description of the finding
title: ''
labels: ''
assignees: ''
---

**Description:**

**Impact:**

**Proof of Concept:**

**Recommended Mitigation:**

**[Project]:**

**Auditor:**
";

/// Directories holding CI definitions, relative to an embedded tree.
pub const CI_DEFINITION_DIRS: &[&str] = &[".github/workflows", ".github/actions", ".github/action"];

/// Reusable report workflow inside the report template.
pub const TEMPLATE_WORKFLOW: &str = ".github/workflows/main.yml";

/// Where the reusable report workflow is relocated at the target root.
pub const RELOCATED_WORKFLOW: &str = ".github/workflows/report-generator.yml";

/// Summary file inside the report template.
pub const SUMMARY_CONF: &str = "source/summary_information.conf";

/// Sources recorded in the summary file.
pub const SUMMARY_SOURCE_SLOTS: usize = 3;

/// README committed as the first commit of the target.
pub fn render_readme(request: &ValidatedRequest) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", request.target_repo_name()));
    if !request.project_title().is_empty() {
        out.push_str(&format!("Audit of **{}**.\n\n", request.project_title()));
    }
    out.push_str(&format!(
        "Sources are embedded as {}s and pinned at the commits below. CI definitions \
         shipped by the sources have been removed.\n\n",
        request.mode()
    ));
    out.push_str("| Source | Commit | Path | Tag |\n");
    out.push_str("|--------|--------|------|-----|\n");
    for source in request.sources() {
        out.push_str(&format!(
            "| {} | `{}` | `{}` | `{}` |\n",
            source.url,
            source.commit,
            source.destination_label(),
            source.tag
        ));
    }
    if !request.auditors().is_empty() {
        out.push_str("\n## Auditors\n\n");
        for auditor in request.auditors() {
            out.push_str(&format!("- {auditor}\n"));
        }
    }
    out
}

/// On-demand workflow that runs the relocated report generator.
pub fn render_report_workflow(workflow_name: &str, report_branch: &str, generator_path: &str) -> String {
    format!(
        "name: {workflow_name}

on:
  workflow_dispatch:
    inputs:
      time:
        description: Report date (YYYY-MM-DD)
        required: false
  push:
    branches:
      - {report_branch}

jobs:
  generate-report:
    uses: ./{RELOCATED_WORKFLOW}
    with:
      generator-path: {generator_path}
      output-path: ./
      time: ${{{{ github.event.inputs.time }}}}
"
    )
}

fn summary_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(project_github(?:_\d+)?|commit_hash(?:_\d+)?|private_github)[ \t]*=.*$")
            .expect("static regex")
    })
}

/// Rewrite `project_github[_N]`, `commit_hash[_N]` and `private_github` in
/// the report template's summary file. Keys absent from the file are left out.
pub fn rewrite_summary_conf(contents: &str, sources: &[PlannedSource], private_url: &str) -> String {
    let mut values: HashMap<String, String> = HashMap::new();
    for (i, source) in sources.iter().take(SUMMARY_SOURCE_SLOTS).enumerate() {
        let suffix = if i == 0 { String::new() } else { format!("_{}", i + 1) };
        values.insert(format!("project_github{suffix}"), source.url.clone());
        values.insert(format!("commit_hash{suffix}"), source.commit.clone());
    }
    values.insert("private_github".to_string(), private_url.to_string());

    summary_key()
        .replace_all(contents, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match values.get(key) {
                Some(value) => format!("{key} = {value}"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::{EmbeddingMode, ProvisioningRequest, SourceSpec, ValidationRules};

    fn validated() -> ValidatedRequest {
        ProvisioningRequest {
            target_repo_name: "acme-audit".to_string(),
            project_title: "Acme".to_string(),
            auditors: vec!["alice".to_string()],
            source_repos: vec![
                SourceSpec::new("https://github.com/acme/core", &"a".repeat(40), Some("core")),
                SourceSpec::new("https://github.com/acme/periphery", &"b".repeat(40), Some("periphery")),
            ],
            embedding_mode: Some(EmbeddingMode::Subtree),
        }
        .validate(&ValidationRules::default())
        .unwrap()
    }

    #[test]
    fn test_readme_lists_every_source() {
        let readme = render_readme(&validated());
        assert!(readme.starts_with("# acme-audit"));
        assert!(readme.contains("embedded as subtrees"));
        assert!(readme.contains(&"a".repeat(40)));
        assert!(readme.contains("`periphery-audit`"));
        assert!(readme.contains("- alice"));
    }

    #[test]
    fn test_workflow_triggers() {
        let yaml = render_report_workflow("generate-report", "report", "cyfrin-report/report-generator-template");
        assert!(yaml.contains("workflow_dispatch:"));
        assert!(yaml.contains("      - report\n"));
        assert!(yaml.contains("uses: ./.github/workflows/report-generator.yml"));
        assert!(yaml.contains("${{ github.event.inputs.time }}"));
    }

    #[test]
    fn test_summary_conf_rewrite() {
        let conf = "project_name = X\nproject_github = old\ncommit_hash = old\nproject_github_2 =\ncommit_hash_2 = \nprivate_github = old\n";
        let request = validated();
        let out = rewrite_summary_conf(conf, request.sources(), "https://github.com/acme/acme-audit.git");
        assert!(out.contains("project_name = X"));
        assert!(out.contains("project_github = https://github.com/acme/core\n"));
        assert!(out.contains(&format!("commit_hash = {}\n", "a".repeat(40))));
        assert!(out.contains("project_github_2 = https://github.com/acme/periphery\n"));
        assert!(out.contains(&format!("commit_hash_2 = {}\n", "b".repeat(40))));
        assert!(out.contains("private_github = https://github.com/acme/acme-audit.git\n"));
    }
}
