//! job-crawler main entry point
//!
//! This is the command-line interface for the job-posting crawler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use job_crawler::config::{expand_search_entries, load_config_with_hash, Config};
use job_crawler::crawler::{CrawlController, RunOptions};
use job_crawler::lifecycle::LifecycleMaintainer;
use job_crawler::output::{load_run_report, print_run_report};
use job_crawler::storage::{open_storage, SqliteStorage};
use job_crawler::{RunStatus, Trigger};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

/// job-crawler: job-posting discovery and lifecycle engine
///
/// Discovers postings through paginated searches on configured job boards,
/// refreshes their details, and expires postings that stop appearing.
#[derive(Parser, Debug)]
#[command(name = "job-crawler")]
#[command(version = "1.0.0")]
#[command(about = "Job-posting crawl orchestration and lifecycle engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a crawl for one or all platforms
    Crawl {
        /// Only crawl this platform
        #[arg(long)]
        platform: Option<String>,

        /// What started this run
        #[arg(long, value_enum, default_value_t = TriggerArg::Manual)]
        trigger: TriggerArg,

        /// Do not upsert search definitions from the configuration
        #[arg(long)]
        no_sync: bool,

        /// Skip the details phase
        #[arg(long)]
        no_details: bool,

        /// Skip discovery and only refresh details
        #[arg(long)]
        no_discovery: bool,
    },

    /// Expire and delete postings that stopped appearing
    Lifecycle {
        /// Count candidates without mutating anything
        #[arg(long)]
        dry_run: bool,

        /// What started this run
        #[arg(long, value_enum, default_value_t = TriggerArg::Manual)]
        trigger: TriggerArg,
    },

    /// Show the latest crawl run of one or all platforms
    Report {
        #[arg(long)]
        platform: Option<String>,
    },

    /// Validate the configuration and list the search definitions it expands to
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TriggerArg {
    Schedule,
    Manual,
}

impl From<TriggerArg> for Trigger {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Schedule => Trigger::Schedule,
            TriggerArg::Manual => Trigger::Manual,
        }
    }
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

    match cli.command {
        Command::Crawl {
            platform,
            trigger,
            no_sync,
            no_details,
            no_discovery,
        } => {
            let options = RunOptions {
                trigger: trigger.into(),
                sync_definitions: !no_sync,
                discovery: !no_discovery,
                details: !no_details,
            };
            handle_crawl(config, config_hash, platform, options).await
        }
        Command::Lifecycle { dry_run, trigger } => handle_lifecycle(&config, dry_run, trigger.into()),
        Command::Report { platform } => handle_report(&config, platform.as_deref()),
        Command::Check => handle_check(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("job_crawler=info,warn"),
            1 => EnvFilter::new("job_crawler=debug,info"),
            2 => EnvFilter::new("job_crawler=trace,debug"),
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

fn open_shared_storage(config: &Config) -> anyhow::Result<Arc<Mutex<SqliteStorage>>> {
    let storage = open_storage(Path::new(&config.database.path))
        .with_context(|| format!("failed to open database {}", config.database.path))?;
    Ok(Arc::new(Mutex::new(storage)))
}

/// Platform names to act on, validated against the configuration
fn selected_platforms(config: &Config, platform: Option<&str>) -> anyhow::Result<Vec<String>> {
    match platform {
        Some(name) if config.platform(name).is_none() => bail!("unknown platform '{}'", name),
        Some(name) => Ok(vec![name.to_string()]),
        None => Ok(config.platforms.iter().map(|p| p.name.clone()).collect()),
    }
}

/// Crawls every selected platform concurrently
///
/// Each platform runs on its own task with its own database connection.
async fn handle_crawl(
    config: Config,
    config_hash: String,
    platform: Option<String>,
    options: RunOptions,
) -> anyhow::Result<()> {
    let platforms = selected_platforms(&config, platform.as_deref())?;
    let config = Arc::new(config);
    let mut join_set = JoinSet::new();

    for name in platforms {
        let config = Arc::clone(&config);
        let config_hash = config_hash.clone();
        let options = options.clone();
        join_set.spawn(async move {
            let storage = open_shared_storage(&config)?;
            let controller = CrawlController::from_config(&config, &name, &config_hash, storage)?;
            let summary = controller.run(&options).await?;
            anyhow::Ok(summary)
        });
    }

    let mut failures = 0;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(summary)) => {
                println!(
                    "{}: crawl run {} {} ({} postings discovered, {} new, {} details)",
                    summary.platform,
                    summary.crawl_run_id,
                    summary.status,
                    summary.stats.discovery.jobs_discovered,
                    summary.stats.discovery.new_postings,
                    summary.stats.details.ok
                );
                if summary.status == RunStatus::Failed {
                    failures += 1;
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Crawl failed: {:#}", e);
                failures += 1;
            }
            Err(e) => {
                tracing::error!("Crawl task panicked: {}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} crawl run(s) failed", failures);
    }
    Ok(())
}

fn handle_lifecycle(config: &Config, dry_run: bool, trigger: Trigger) -> anyhow::Result<()> {
    let storage = open_shared_storage(config)?;
    let maintainer = LifecycleMaintainer::from_config(config, storage)
        .with_dry_run(dry_run || config.lifecycle.dry_run);
    let summary = maintainer.run(trigger, chrono::Utc::now())?;

    println!(
        "=== Lifecycle run {}{} ===\n",
        summary.run_id,
        if summary.dry_run { " (dry run)" } else { "" }
    );
    for platform in &summary.platforms {
        println!("{}: {}", platform.platform, platform.action);
        if let Some(note) = &platform.note {
            println!("  Note: {}", note);
        }
        let c = &platform.counts;
        println!("  Marked stale: {}", c.stale_marked_count);
        println!("  Hard-delete candidates: {}", c.hard_delete_candidate_count);
        println!(
            "  Deleted: {} postings, {} hits, {} details",
            c.deleted_jobs_count, c.deleted_hits_count, c.deleted_details_count
        );
    }
    println!("\nStatus: {}", summary.status);

    if summary.status == RunStatus::Failed {
        bail!("lifecycle run {} failed", summary.run_id);
    }
    Ok(())
}

fn handle_report(config: &Config, platform: Option<&str>) -> anyhow::Result<()> {
    let platforms = selected_platforms(config, platform)?;
    let storage = open_storage(Path::new(&config.database.path))
        .with_context(|| format!("failed to open database {}", config.database.path))?;

    println!("Database: {}\n", config.database.path);
    for name in platforms {
        match load_run_report(&storage, &name)? {
            Some(report) => print_run_report(&report),
            None => println!("{}: no crawl runs recorded", name),
        }
        println!();
    }
    Ok(())
}

/// Validates the configuration and shows what a crawl would search for
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== job-crawler configuration ===\n");

    println!("Database: {}", config.database.path);
    println!(
        "User agent: {}/{}",
        config.user_agent.crawler_name, config.user_agent.crawler_version
    );

    let b = &config.budgets;
    println!("\nBudgets:");
    println!("  Max pages per search: {}", b.max_pages_per_search);
    println!("  Max postings per search: {}", b.max_jobs_discovered_per_search);
    println!("  Duplicate page limit: {}", b.duplicate_page_limit);
    println!("  Circuit breaker blocks: {}", b.circuit_breaker_blocks);
    println!("  Max run seconds: {}", b.max_run_seconds);

    let definitions = expand_search_entries(&config.searches);
    for platform in &config.platforms {
        let defs: Vec<_> = definitions
            .iter()
            .filter(|d| d.platform == platform.name)
            .collect();
        println!("\n{} ({} search definitions):", platform.name, defs.len());
        for def in defs {
            println!(
                "  - {} [{}{}]{}",
                def.name,
                def.keywords,
                def.location
                    .as_deref()
                    .map(|l| format!(" @ {}", l))
                    .unwrap_or_default(),
                if def.enabled { "" } else { " (disabled)" }
            );
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}
