//! auditrepo - provision audit-ready repositories
//!
//! Reads a provisioning request (default `config.json`), creates the target
//! repository in the configured organization, embeds every pinned source,
//! scaffolds audit tooling and prints a Markdown report.
//!
//! Exit codes: `0` done, `1` failed, `2` usage error, `130` interrupted.

use anyhow::{Context, Result};
use auditrepo_core::{
    write_report_json, write_report_md, EmbeddingMode, GitWorkspaceProvider, Orchestrator,
    PipelineSettings, ProvisioningRequest,
};
use auditrepo_hosting::{BoardTemplate, GitHubClient, GitHubConfig};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "auditrepo")]
#[command(author = "Stevedores Org")]
#[command(version = auditrepo_core::VERSION)]
#[command(about = "Provision an audit-ready repository from pinned source repositories", long_about = None)]
struct Cli {
    /// Provisioning request (JSON)
    #[arg(short, long, default_value = "config.json")]
    config_file: PathBuf,

    /// Hosting access token with repo and project scopes
    #[arg(long, env = "GITHUB_ACCESS_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Organization that will own the target repository
    #[arg(long, env = "GITHUB_ORGANIZATION")]
    organization: Option<String>,

    /// Override the request's embedding mode (subtree or submodule)
    #[arg(long)]
    embedding_mode: Option<EmbeddingMode>,

    /// Project number of the board template in the organization
    #[arg(long, env = "AUDITREPO_BOARD_TEMPLATE")]
    board_template: Option<u64>,

    /// Hosting API root (GitHub Enterprise)
    #[arg(long)]
    api_url: Option<String>,

    /// JSON overlay for pipeline settings
    #[arg(long)]
    settings_file: Option<PathBuf>,

    /// Also write the report as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Also write the Markdown report to this path
    #[arg(long)]
    report_md: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Token and organization are required; interactive prompting is not offered.
    fn credentials(&self) -> std::result::Result<(String, String), clap::Error> {
        let missing = |what: &str, flag: &str, env: &str| {
            Cli::command().error(
                clap::error::ErrorKind::MissingRequiredArgument,
                format!("{what} is required: pass {flag} or set {env}"),
            )
        };
        let token = self
            .github_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| missing("an access token", "--github-token", "GITHUB_ACCESS_TOKEN"))?;
        let organization = self
            .organization
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| missing("an organization", "--organization", "GITHUB_ORGANIZATION"))?;
        Ok((token.to_string(), organization.to_string()))
    }
}

fn load_request(path: &Path, mode: Option<EmbeddingMode>) -> Result<ProvisioningRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let mut request: ProvisioningRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid request JSON in {}", path.display()))?;
    if mode.is_some() {
        request.embedding_mode = mode;
    }
    Ok(request)
}

fn load_settings(
    path: Option<&Path>,
    organization: &str,
    board_template: Option<u64>,
    api_url: Option<&str>,
) -> Result<PipelineSettings> {
    let mut settings = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid settings JSON in {}", path.display()))?
        }
        None => PipelineSettings::default(),
    };
    settings.organization = organization.to_string();
    if let Some(number) = board_template {
        settings.board_template = Some(BoardTemplate {
            owner: organization.to_string(),
            number,
        });
    }
    if let Some(api_url) = api_url {
        settings.api_url = api_url.to_string();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    auditrepo_core::init_tracing(cli.json, level);

    let (token, organization) = cli.credentials().unwrap_or_else(|e| e.exit());
    let request = load_request(&cli.config_file, cli.embedding_mode)?;
    let settings = load_settings(
        cli.settings_file.as_deref(),
        &organization,
        cli.board_template,
        cli.api_url.as_deref(),
    )?;

    let hosting = GitHubClient::new(
        GitHubConfig::new(&settings.organization, &token).with_api_url(&settings.api_url),
    )
    .context("Failed to build hosting client")?;
    let workspaces = GitWorkspaceProvider::new(settings.identity.clone(), &settings.default_branch)
        .with_token(&token);
    let orchestrator = Orchestrator::new(Arc::new(hosting), Arc::new(workspaces), settings);

    info!(
        config = %cli.config_file.display(),
        organization = %organization,
        version = auditrepo_core::VERSION,
        "starting provisioning run"
    );

    // Dropping the run future releases the workspace and kills any git child.
    let report = tokio::select! {
        report = orchestrator.run(request) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; anything already created remotely is left in place");
            return Ok(ExitCode::from(130));
        }
    };

    print!("{}", report.render_markdown());
    if let Some(path) = &cli.report_json {
        write_report_json(path, &report)?;
        info!(path = %path.display(), "report written");
    }
    if let Some(path) = &cli.report_md {
        write_report_md(path, &report)?;
        info!(path = %path.display(), "report written");
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
