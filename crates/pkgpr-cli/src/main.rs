//! pkgpr - package submissions to pull requests
//!
//! ## Commands
//!
//! - `reconcile`: turn a fetch result into branches, PRs and merges
//! - `cursor show` / `cursor set`: inspect or move the run cursor
//! - `preview`: print the PR title and body for a set of package files
//! - `branch-name`: print the branch a package id is published on

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use pkgpr_core::{
    branch_name, render_body, run_batch, BatchContext, BatchReport, ClassifiedDocuments,
    CommandValidator, FetchResult, FileRunCursor, OutcomeStatus, ReconcileConfig, RunCursor,
    SubmissionFile, VariableRunCursor, WorkingTree,
};
use pkgpr_tracker::{GithubConfig, GithubTracker, PullRequestTracker};

#[derive(Parser)]
#[command(name = "pkgpr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconcile package submissions into validated pull requests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every submission of a fetch result, then advance the cursor
    Reconcile(ReconcileArgs),

    /// Inspect or move the run cursor
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },

    /// Print the PR title and body derived from package files
    Preview {
        /// Package id (`<group>:<name>`)
        #[arg(long)]
        id: String,

        /// Package YAML files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the branch a package id is published on
    BranchName {
        /// Package id (`<group>:<name>`)
        id: String,
    },
}

#[derive(Subcommand)]
enum CursorAction {
    /// Print the current cursor mark
    Show {
        #[command(flatten)]
        store: CursorArgs,
    },
    /// Overwrite the cursor mark
    Set {
        /// New mark
        mark: String,

        #[command(flatten)]
        store: CursorArgs,
    },
}

#[derive(Args)]
struct TrackerArgs {
    /// Repository as owner/repo
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitHub REST API root
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,
}

#[derive(Args)]
struct CursorArgs {
    /// Keep the cursor in a JSON file instead of the LAST_RUN repository variable
    #[arg(long, env = "PKGPR_CURSOR_FILE")]
    cursor_file: Option<PathBuf>,

    #[command(flatten)]
    tracker: TrackerArgs,
}

#[derive(Args)]
struct ReconcileArgs {
    /// Fetch result JSON (`{timestamp, packages}`)
    #[arg(short, long)]
    input: PathBuf,

    /// Working tree to reconcile in
    #[arg(long, env = "GITHUB_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Write the batch report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Validator command line, split with shell quoting (`'my dir/lint.py'`);
    /// the validate path is appended
    #[arg(long, env = "PKGPR_VALIDATOR")]
    validator: Option<String>,

    /// Kill the validator after this many seconds
    #[arg(long)]
    validator_timeout: Option<u64>,

    /// Path handed to the validator, relative to the workspace
    #[arg(long)]
    validate_path: Option<PathBuf>,

    /// Trunk branch
    #[arg(long)]
    trunk: Option<String>,

    /// Git remote
    #[arg(long)]
    remote: Option<String>,

    /// Label for newly created pull requests
    #[arg(long)]
    label: Option<String>,

    #[command(flatten)]
    store: CursorArgs,
}

impl ReconcileArgs {
    fn config(&self) -> ReconcileConfig {
        let mut config = ReconcileConfig::from_env();
        if let Some(trunk) = &self.trunk {
            config = config.with_trunk(trunk);
        }
        if let Some(remote) = &self.remote {
            config = config.with_remote(remote);
        }
        if let Some(label) = &self.label {
            config = config.with_label(label);
        }
        if let Some(path) = &self.validate_path {
            config = config.with_validate_path(path);
        }
        if let Some(validator) = &self.validator {
            config = config.with_validator(validator);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pkgpr_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Reconcile(args) => cmd_reconcile(&args).await,
        Commands::Cursor { action } => match action {
            CursorAction::Show { store } => cmd_cursor_show(&store).await,
            CursorAction::Set { mark, store } => cmd_cursor_set(&store, &mark).await,
        },
        Commands::Preview { id, files } => cmd_preview(&id, &files),
        Commands::BranchName { id } => {
            println!("{}", branch_name(&id));
            Ok(())
        }
    }
}

fn github_tracker(args: &TrackerArgs) -> Result<Arc<dyn PullRequestTracker>> {
    let mut config = match &args.repository {
        Some(slug) => GithubConfig::from_slug(slug)?,
        None => GithubConfig::from_env(),
    };
    if let Some(token) = &args.token {
        config = config.with_token(token);
    }
    if let Some(api_url) = &args.api_url {
        config = config.with_api_url(api_url);
    }
    let tracker = GithubTracker::new(config).context("Failed to configure GitHub client")?;
    Ok(Arc::new(tracker))
}

fn run_cursor(
    store: &CursorArgs,
    tracker: Option<Arc<dyn PullRequestTracker>>,
) -> Result<Box<dyn RunCursor>> {
    if let Some(path) = &store.cursor_file {
        return Ok(Box::new(FileRunCursor::new(path)));
    }
    let tracker = match tracker {
        Some(tracker) => tracker,
        None => github_tracker(&store.tracker)?,
    };
    Ok(Box::new(VariableRunCursor::new(tracker)))
}

async fn cmd_reconcile(args: &ReconcileArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {:?}", args.input))?;
    let fetch = FetchResult::from_json(&text)
        .with_context(|| format!("Invalid fetch result in {:?}", args.input))?;

    let config = args.config();
    let tracker = github_tracker(&args.store.tracker)?;
    let cursor = run_cursor(&args.store, Some(tracker.clone()))?;
    let mut validator = CommandValidator::from_command_line(&config.validator)?;
    if let Some(secs) = args.validator_timeout {
        validator = validator.with_timeout(Duration::from_secs(secs));
    }
    let mut tree = WorkingTree::open(&args.workspace, &config.trunk, &config.remote)
        .await
        .with_context(|| format!("Not a git checkout: {:?}", args.workspace))?;

    info!(
        run_id = %config.run_id,
        packages = fetch.packages.len(),
        "reconciling batch"
    );
    let report = run_batch(
        BatchContext {
            tree: &mut tree,
            tracker: tracker.as_ref(),
            validator: &validator,
            cursor: cursor.as_ref(),
            config: &config,
        },
        &fetch,
    )
    .await
    .context("Batch aborted before any package was reconciled")?;

    write_report(&report, args.output.as_deref())?;
    print_summary(&report);

    if !report.cursor_advanced {
        anyhow::bail!(
            "Run cursor not advanced past {}; the batch will be reconsidered next run",
            report.timestamp
        );
    }
    Ok(())
}

fn write_report(report: &BatchReport, output: Option<&Path>) -> Result<()> {
    let json = report.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn print_summary(report: &BatchReport) {
    for outcome in &report.outcomes {
        let number = outcome
            .number
            .map(|n| format!("#{n}"))
            .unwrap_or_else(|| "-".to_string());
        eprintln!(
            "{:<24} {:<6} {}",
            outcome.status.as_str(),
            number,
            outcome.package_id
        );
    }
    eprintln!(
        "{} merged, {} failed validation, {} conflicted, {} malformed, {} aborted",
        report.count(OutcomeStatus::ValidatedMerged),
        report.count(OutcomeStatus::ValidationFailed),
        report.count(OutcomeStatus::MergeConflictAborted),
        report.count(OutcomeStatus::MalformedSubmission),
        report.count(OutcomeStatus::Aborted),
    );
}

async fn cmd_cursor_show(store: &CursorArgs) -> Result<()> {
    let cursor = run_cursor(store, None)?;
    match cursor.read().await.context("Failed to read run cursor")? {
        Some(mark) => println!("{mark}"),
        None => eprintln!("Run cursor has not been set"),
    }
    Ok(())
}

async fn cmd_cursor_set(store: &CursorArgs, mark: &str) -> Result<()> {
    let cursor = run_cursor(store, None)?;
    cursor
        .advance(mark)
        .await
        .context("Failed to write run cursor")?;
    println!("Run cursor set to {mark}");
    Ok(())
}

fn preview(id: &str, files: &[PathBuf]) -> Result<(String, String)> {
    let files = files
        .iter()
        .map(|path| {
            let contents =
                std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
            Ok(SubmissionFile::new(&path.to_string_lossy(), contents))
        })
        .collect::<Result<Vec<_>>>()?;
    let docs = ClassifiedDocuments::from_files(id, &files)?;
    Ok((docs.title(), render_body(&docs)))
}

fn cmd_preview(id: &str, files: &[PathBuf]) -> Result<()> {
    let (title, body) = preview(id, files)?;
    println!("{title}\n\n{body}");
    Ok(())
}
