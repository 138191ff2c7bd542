//! Coleta main entry point
//!
//! This is the command-line interface running the configured extraction
//! tasks through the fetch layer.

use anyhow::{anyhow, Context};
use clap::Parser;
use coleta::config::{load_config_with_hash, Config, StoreKind, TaskConfig};
use coleta::fetch::{FetchJob, FetchResults, Fetcher, SinkMode};
use coleta::output::{load_statistics, print_statistics, save_ndjson};
use coleta::storage::{open_shared_storage, BatchStatus, FailureStore, SharedStore, SqliteStorage};
use coleta::ColetaError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard};
use tracing_subscriber::EnvFilter;

/// Coleta: resumable fetching of legislative open data
///
/// Coleta downloads the JSON and HTML resources of every configured task,
/// follows `pagina` pagination, retries failed requests and records the
/// URLs that still failed so the next run resumes them.
#[derive(Parser, Debug)]
#[command(name = "coleta")]
#[command(version)]
#[command(about = "Resumable fetching of legislative open data", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only run (or inspect) these tasks
    #[arg(long = "task", value_name = "NAME")]
    tasks: Vec<String>,

    /// Skip these tasks
    #[arg(long = "ignore-task", value_name = "NAME")]
    ignore_tasks: Vec<String>,

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with_all = ["pending", "stats", "clear_pending"])]
    dry_run: bool,

    /// List pending failures and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "clear_pending"])]
    pending: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "pending", "clear_pending"])]
    stats: bool,

    /// Delete every pending failure of a task and exit
    #[arg(long, value_name = "TASK", conflicts_with_all = ["dry_run", "pending", "stats"])]
    clear_pending: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.pending {
        handle_pending(&config, &cli)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(task) = &cli.clear_pending {
        handle_clear_pending(&config, task)
    } else {
        handle_run(&config, &config_hash, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("coleta=info,warn"),
            1 => EnvFilter::new("coleta=debug,info"),
            2 => EnvFilter::new("coleta=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies `--task` and `--ignore-task` to the configured tasks
fn select_tasks<'a>(config: &'a Config, cli: &Cli) -> Result<Vec<&'a TaskConfig>, ColetaError> {
    for name in cli.tasks.iter().chain(&cli.ignore_tasks) {
        if config.task(name).is_none() {
            return Err(ColetaError::UnknownTask(name.clone()));
        }
    }

    Ok(config
        .tasks
        .iter()
        .filter(|task| cli.tasks.is_empty() || cli.tasks.contains(&task.name))
        .filter(|task| !cli.ignore_tasks.contains(&task.name))
        .collect())
}

fn lock_store(store: &SharedStore) -> anyhow::Result<MutexGuard<'_, dyn FailureStore + Send + 'static>> {
    store
        .lock()
        .map_err(|_| anyhow!("failure store lock poisoned"))
}

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let tasks = select_tasks(config, cli)?;

    println!("=== Coleta Dry Run ===\n");

    println!("Fetcher Configuration:");
    println!("  Concurrency: {}", config.fetcher.concurrency);
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    println!("  Max attempts: {}", config.fetcher.max_attempts);
    println!("  Retry delay: {}ms", config.fetcher.retry_delay_ms);
    println!("  Follow pagination: {}", config.fetcher.follow_pagination);
    println!("  Page parameter: {}", config.fetcher.page_parameter);
    println!("  Resolve on success: {}", config.fetcher.resolve_on_success);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Extract dir: {}", config.output.extract_dir);

    println!("\nTasks ({}):", tasks.len());
    for task in &tasks {
        println!(
            "  - {} ({:?}, {:?}, pagination: {}, {} URLs)",
            task.name,
            task.kind,
            task.store,
            task.follow_pagination
                .unwrap_or(config.fetcher.follow_pagination),
            task.urls.len()
        );
        for url in &task.urls {
            println!("    * {}", url);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would fetch {} seed URLs",
        tasks.iter().map(|t| t.urls.len()).sum::<usize>()
    );

    Ok(())
}

/// Handles the --pending mode: lists pending failure records
fn handle_pending(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    let mut tasks: Vec<String> = if cli.tasks.is_empty() {
        storage.pending_by_task()?.into_keys().collect()
    } else {
        cli.tasks.clone()
    };
    tasks.sort();

    if tasks.is_empty() {
        println!("No pending failures.");
        return Ok(());
    }

    for task in tasks {
        let records = storage.load_pending(&task)?;
        println!("{} ({} pending):", task, records.len());
        for record in records {
            println!(
                "  {} [{}; {} attempt(s); failed in {} run(s); batches {}..{}]",
                record.url,
                record.error_kind,
                record.attempts,
                record.failure_count,
                record.batch_id,
                record.last_batch_id
            );
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    // Open the database
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    // Load statistics
    let stats = load_statistics(&storage)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the --clear-pending mode: drops a task's pending failures
fn handle_clear_pending(config: &Config, task: &str) -> anyhow::Result<()> {
    let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let removed = storage.clear_pending(task)?;
    println!("Removed {} pending failure(s) of {}", removed, task);
    Ok(())
}

/// Handles the main fetch operation: one batch running every selected task
async fn handle_run(config: &Config, config_hash: &str, cli: &Cli) -> anyhow::Result<()> {
    let tasks = select_tasks(config, cli)?;
    if tasks.is_empty() {
        tracing::warn!("No tasks selected, nothing to do");
        return Ok(());
    }

    let store = open_shared_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open {}", config.output.database_path))?;
    let batch_id = lock_store(&store)?.create_batch(config_hash)?;
    tracing::info!("Starting batch {} with {} task(s)", batch_id, tasks.len());

    let fetcher = Fetcher::new(config, Arc::clone(&store))?;
    let extract_dir = PathBuf::from(&config.output.extract_dir);

    for task in tasks {
        if let Err(e) = run_task(&fetcher, config, task, batch_id, &extract_dir).await {
            tracing::error!("Task {} failed: {:#}", task.name, e);
            lock_store(&store)?.update_batch_status(batch_id, BatchStatus::Failed)?;
            return Err(e.context(format!("batch {} aborted", batch_id)));
        }
    }

    lock_store(&store)?.complete_batch(batch_id)?;
    tracing::info!("Batch {} completed", batch_id);
    Ok(())
}

async fn run_task(
    fetcher: &Fetcher,
    config: &Config,
    task: &TaskConfig,
    batch_id: i64,
    extract_dir: &Path,
) -> anyhow::Result<()> {
    let mode = match task.store {
        StoreKind::Memory => SinkMode::Memory,
        StoreKind::Files => SinkMode::Files {
            dir: extract_dir.join(&task.name),
        },
    };
    let job = FetchJob::new(task.name.clone(), batch_id, task.urls.clone())
        .kind(task.kind)
        .follow_pagination(
            task.follow_pagination
                .unwrap_or(config.fetcher.follow_pagination),
        )
        .mode(mode);

    let report = fetcher
        .fetch(job)
        .await
        .with_context(|| format!("fetching {}", task.name))?;

    if let FetchResults::Payloads(payloads) = &report.results {
        let dest = extract_dir.join(format!("{}.ndjson", task.name));
        save_ndjson(payloads, &dest).with_context(|| format!("writing {}", dest.display()))?;
    }

    tracing::info!(
        "{}: {} fetched, {} failed ({} seed URL(s), {} resumed from pending)",
        task.name,
        report.results.len(),
        report.failures.len(),
        report.requested,
        report.pending_loaded
    );
    Ok(())
}
