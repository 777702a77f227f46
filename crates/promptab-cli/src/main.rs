//! promptab - prompt version control with statistical A/B testing
//!
//! ## Commands
//!
//! - `init`: Create a prompt repository in the current directory
//! - `add`: Stage a prompt file for commit
//! - `commit`: Snapshot the staging area as an immutable commit
//! - `log`: Show commit history
//! - `diff`: Compare two committed versions of a prompt
//! - `test`: Run an A/B comparison of two versions over a dataset
//! - `test-log` / `test-show`: Inspect persisted comparison runs

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use promptab_core::{
    compare_versions, load_dataset, Commit, DiffLine, OpenAiProvider, PricingTable, PromptabError,
    Repository, RunConfig, RunResults, TTestResult, TestExecutionEngine, TestRun, TestRunStore,
    VersionResult,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "promptab")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Version text prompts and A/B test them with statistical rigor", long_about = None)]
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
    /// Initialize a prompt repository in the current directory
    Init,

    /// Stage a prompt file for the next commit
    Add {
        /// Path to the prompt file
        path: PathBuf,
    },

    /// Create a commit from the staged prompts
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show commit history, newest first
    Log {
        /// Maximum number of commits to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the diff between two committed versions
    Diff {
        /// Old version (commit digest or prefix; defaults to HEAD's parent)
        a: Option<String>,

        /// New version (defaults to HEAD)
        b: Option<String>,
    },

    /// Run both versions against a dataset and compare them statistically
    Test {
        /// Version A (commit reference)
        a: String,

        /// Version B (commit reference)
        b: String,

        /// Dataset file (JSON or CSV)
        #[arg(long)]
        dataset: PathBuf,

        /// Prompt path inside the commits (required when a commit holds
        /// more than one prompt)
        #[arg(long)]
        path: Option<String>,

        /// Maximum concurrent provider requests
        #[arg(long, default_value = "5")]
        concurrency: usize,

        /// Model to test against
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,

        /// Additional attempts after a failed provider call
        #[arg(long, default_value = "2")]
        max_retries: u32,

        /// Optional pricing table override (JSON)
        #[arg(long)]
        pricing: Option<PathBuf>,

        /// Persist the comparison record
        #[arg(long)]
        save: bool,
    },

    /// List persisted comparison runs, newest first
    TestLog {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show one persisted comparison run in full
    TestShow {
        /// Run id as printed by `test --save`
        id: String,
    },
}

/// CLI failure: either a domain error or the dedicated nothing-to-commit
/// outcome, which shares its exit code with missing credentials.
#[derive(Debug)]
enum CliError {
    NothingToCommit,
    Core(PromptabError),
}

impl From<PromptabError> for CliError {
    fn from(err: PromptabError) -> Self {
        CliError::Core(err)
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::NothingToCommit => write!(f, "nothing to commit (staging area is empty)"),
            CliError::Core(e) => write!(f, "{e}"),
        }
    }
}

/// Exit codes: 0 ok, 1 general/usage, 2 repository not initialized,
/// 3 nothing-to-commit or missing credential, 4 not-found/invalid
/// reference or dataset, 5 execution failure.
fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::NothingToCommit => 3,
        CliError::Core(e) => match e {
            PromptabError::NotInitialized(_) => 2,
            PromptabError::Auth(_) => 3,
            PromptabError::NotFound(_) | PromptabError::Parse(_) => 4,
            PromptabError::Provider(_) => 5,
            _ => 1,
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    promptab_core::init_tracing(cli.json, level);

    if let Err(e) = run(cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(exit_code_for(&e));
    }
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Init => cmd_init(),
        Commands::Add { path } => cmd_add(&path),
        Commands::Commit { message } => cmd_commit(&message),
        Commands::Log { limit } => cmd_log(limit),
        Commands::Diff { a, b } => cmd_diff(a.as_deref(), b.as_deref()),
        Commands::Test {
            a,
            b,
            dataset,
            path,
            concurrency,
            model,
            max_retries,
            pricing,
            save,
        } => {
            cmd_test(
                &a,
                &b,
                &dataset,
                path.as_deref(),
                concurrency,
                &model,
                max_retries,
                pricing.as_deref(),
                save,
            )
            .await
        }
        Commands::TestLog { limit } => cmd_test_log(limit),
        Commands::TestShow { id } => cmd_test_show(&id),
    }
}

fn open_repo() -> Result<Repository, CliError> {
    Ok(Repository::open(".")?)
}

fn cmd_init() -> Result<(), CliError> {
    Repository::init(".")?;
    println!("Initialized prompt repository in ./{}", promptab_core::REPO_DIR);
    Ok(())
}

fn cmd_add(path: &PathBuf) -> Result<(), CliError> {
    let repo = open_repo()?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PromptabError::NotFound(format!("file: {}", path.display()))
        } else {
            PromptabError::Io(e)
        }
    })?;

    let key = path.to_string_lossy().to_string();
    let digest = repo.stage(&key, &content)?;
    println!("Staged {} ({})", key, digest.short());
    Ok(())
}

fn cmd_commit(message: &str) -> Result<(), CliError> {
    let repo = open_repo()?;
    if repo.staged()?.is_empty() {
        return Err(CliError::NothingToCommit);
    }

    let digest = repo.commit(message)?;
    println!("[{}] {}", digest.short(), message);
    Ok(())
}

fn cmd_log(limit: usize) -> Result<(), CliError> {
    let repo = open_repo()?;
    let history = repo.log(limit)?;

    if history.is_empty() {
        println!("No commits yet.");
        return Ok(());
    }

    for (digest, commit) in history {
        println!("commit {digest}");
        println!("Date:   {}", commit.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        println!();
        println!("    {}", commit.message);
        println!();
    }
    Ok(())
}

fn cmd_diff(a: Option<&str>, b: Option<&str>) -> Result<(), CliError> {
    let repo = open_repo()?;

    let digest_b = repo.resolve(b.unwrap_or("HEAD"))?;
    let commit_b = require_commit(&repo, &digest_b)?;

    let (digest_a, commit_a) = match a {
        Some(reference) => {
            let digest = repo.resolve(reference)?;
            (digest, require_commit(&repo, &digest)?)
        }
        None => {
            let parent = commit_b.parent.ok_or_else(|| {
                PromptabError::NotFound("HEAD has no parent to diff against".to_string())
            })?;
            (parent, require_commit(&repo, &parent)?)
        }
    };

    println!("diff {} -> {}", digest_a.short(), digest_b.short());

    // Union of paths across both trees, in order.
    let mut paths: Vec<&String> = commit_a.tree.keys().chain(commit_b.tree.keys()).collect();
    paths.sort();
    paths.dedup();

    for path in paths {
        let old = match commit_a.tree.get(path) {
            Some(d) => repo.read_blob(d)?,
            None => String::new(),
        };
        let new = match commit_b.tree.get(path) {
            Some(d) => repo.read_blob(d)?,
            None => String::new(),
        };

        let diff = promptab_core::diff_lines(&old, &new);
        if promptab_core::is_identical(&diff) {
            continue;
        }

        println!("--- {path}");
        for line in diff {
            match line {
                DiffLine::Context(l) => println!("  {l}"),
                DiffLine::Removed(l) => println!("- {l}"),
                DiffLine::Added(l) => println!("+ {l}"),
            }
        }
        println!();
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_test(
    a: &str,
    b: &str,
    dataset_path: &std::path::Path,
    prompt_path: Option<&str>,
    concurrency: usize,
    model: &str,
    max_retries: u32,
    pricing_path: Option<&std::path::Path>,
    save: bool,
) -> Result<(), CliError> {
    let repo = open_repo()?;

    let digest_a = repo.resolve(a)?;
    let digest_b = repo.resolve(b)?;
    let commit_a = require_commit(&repo, &digest_a)?;
    let commit_b = require_commit(&repo, &digest_b)?;

    let path = resolve_prompt_path(&commit_a, &commit_b, prompt_path)?;
    let template_a = repo.blob_at(&commit_a, &path)?;
    let template_b = repo.blob_at(&commit_b, &path)?;

    let cases = load_dataset(dataset_path)?;

    // Credential check is fatal before any execution begins.
    let provider = Arc::new(OpenAiProvider::from_env()?);
    let pricing = Arc::new(match pricing_path {
        Some(p) => PricingTable::from_file(p)?,
        None => PricingTable::default(),
    });

    let config = RunConfig {
        model: model.to_string(),
        concurrency,
        max_retries,
        ..RunConfig::default()
    };

    println!(
        "Testing {} ({}) vs {} ({}) over {} cases [model={}, concurrency={}]",
        a,
        digest_a.short(),
        b,
        digest_b.short(),
        cases.len(),
        model,
        concurrency
    );

    let progress: promptab_core::ProgressCallback =
        Arc::new(|done, total, name: &str| eprintln!("  [{done}/{total}] {name}"));

    // Version A and version B each run independently over the identical
    // dataset; nothing is shared between the two result sets.
    let engine = TestExecutionEngine::new(provider.clone(), pricing.clone(), config.clone())
        .with_progress(progress.clone());
    println!("\nRunning version A ({})...", digest_a.short());
    let results_a = engine.run(&template_a, &cases).await?;

    let engine = TestExecutionEngine::new(provider, pricing, config).with_progress(progress);
    println!("Running version B ({})...", digest_b.short());
    let results_b = engine.run(&template_b, &cases).await?;

    let version_a = VersionResult::new(results_a);
    let version_b = VersionResult::new(results_b);
    let statistics = compare_versions(&version_a.test_cases, &version_b.test_cases);

    print_summary("A", &digest_a.short(), &version_a);
    print_summary("B", &digest_b.short(), &version_b);

    println!("\nStatistical comparison (Welch's t-test, 95% confidence)");
    println!("========================================================");
    print_t_test("latency (ms)", &statistics.latency);
    print_t_test("cost ($)", &statistics.cost);
    print_t_test("tokens", &statistics.tokens);

    if version_a.summary.success_count == 0 && version_b.summary.success_count == 0 {
        return Err(CliError::Core(PromptabError::Provider(
            "all test cases failed on both versions".to_string(),
        )));
    }

    if save {
        let timestamp = chrono::Utc::now();
        let run = TestRun {
            id: TestRun::make_id(&digest_a, &digest_b, timestamp),
            timestamp,
            commit_a: digest_a,
            commit_b: digest_b,
            dataset: dataset_path.display().to_string(),
            model: model.to_string(),
            results: RunResults {
                a: version_a,
                b: version_b,
            },
            statistics,
        };
        let store = TestRunStore::open(repo.test_runs_dir())?;
        store.save(&run)?;
        println!("\nSaved test run: {}", run.id);
    }

    Ok(())
}

fn cmd_test_log(limit: usize) -> Result<(), CliError> {
    let repo = open_repo()?;
    let store = TestRunStore::open(repo.test_runs_dir())?;
    let runs = store.list(limit)?;

    if runs.is_empty() {
        println!("No test runs recorded. Run 'promptab test --save' first.");
        return Ok(());
    }

    for run in runs {
        let sig = [
            ("latency", run.statistics.latency.significant),
            ("cost", run.statistics.cost.significant),
            ("tokens", run.statistics.tokens.significant),
        ]
        .iter()
        .filter(|(_, s)| *s)
        .map(|(n, _)| *n)
        .collect::<Vec<_>>()
        .join(",");

        println!(
            "{}  {}  {} vs {}  model={}  significant=[{}]",
            run.id,
            run.timestamp.format("%Y-%m-%d %H:%M:%S"),
            run.commit_a.short(),
            run.commit_b.short(),
            run.model,
            sig
        );
    }
    Ok(())
}

fn cmd_test_show(id: &str) -> Result<(), CliError> {
    let repo = open_repo()?;
    let store = TestRunStore::open(repo.test_runs_dir())?;
    let run = store.load(id)?;

    println!("Test run {}", run.id);
    println!("Date:    {}", run.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Model:   {}", run.model);
    println!("Dataset: {}", run.dataset);

    print_summary("A", &run.commit_a.short(), &run.results.a);
    print_summary("B", &run.commit_b.short(), &run.results.b);

    println!("\nStatistical comparison");
    println!("======================");
    print_t_test("latency (ms)", &run.statistics.latency);
    print_t_test("cost ($)", &run.statistics.cost);
    print_t_test("tokens", &run.statistics.tokens);
    Ok(())
}

/// Pick the prompt path for a comparison: an explicit `--path`, or the
/// single path both commits agree on.
fn resolve_prompt_path(
    commit_a: &Commit,
    commit_b: &Commit,
    explicit: Option<&str>,
) -> Result<String, CliError> {
    if let Some(path) = explicit {
        return Ok(path.to_string());
    }
    if commit_a.tree.len() == 1 && commit_b.tree.len() == 1 {
        let path_a = commit_a.tree.keys().next().expect("len checked");
        let path_b = commit_b.tree.keys().next().expect("len checked");
        if path_a == path_b {
            return Ok(path_a.clone());
        }
    }
    Err(CliError::Core(PromptabError::Validation(
        "commits hold multiple prompts; pass --path to choose one".to_string(),
    )))
}

fn require_commit(repo: &Repository, digest: &promptab_core::Digest) -> Result<Commit, CliError> {
    repo.get_commit(digest)?
        .ok_or_else(|| CliError::Core(PromptabError::NotFound(format!("commit {digest}"))))
}

fn print_summary(label: &str, short: &str, version: &VersionResult) {
    let s = &version.summary;
    println!("\nVersion {label} ({short})");
    println!("  cases:        {}/{} succeeded", s.success_count, s.total_count);
    println!("  success rate: {:.1}%", s.success_rate * 100.0);
    println!("  avg latency:  {:.1} ms", s.avg_latency_ms);
    println!(
        "  avg tokens:   {:.1} in / {:.1} out",
        s.avg_input_tokens, s.avg_output_tokens
    );
    println!("  avg cost:     ${:.6}", s.avg_cost);
}

fn print_t_test(metric: &str, t: &TTestResult) {
    let marker = if t.significant { "*" } else { " " };
    println!(
        "{marker} {metric:<12} A={:.4} B={:.4} diff={:+.4} p={:.4} CI=[{:.4}, {:.4}] (n={}/{})",
        t.mean_a,
        t.mean_b,
        t.difference,
        t.p_value,
        t.confidence_interval.0,
        t.confidence_interval.1,
        t.sample_size_a,
        t.sample_size_b
    );
}
