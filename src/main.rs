//! listing-harvest main entry point
//!
//! This is the command-line interface for running the harvest service.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use listing_harvest::config::{load_config_with_hash, ServiceConfig};
use listing_harvest::output::print_statistics;
use listing_harvest::storage::{open_storage, share};
use listing_harvest::HarvestService;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for cancelled jobs to record their final status
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// listing-harvest: a scheduled listing scraping engine
///
/// Runs every tenant configuration with auto-scrape enabled on its interval,
/// fetching search pages from the registered sources and storing the
/// normalized listings as job results.
#[derive(Parser, Debug)]
#[command(name = "listing-harvest")]
#[command(version = "0.1.0")]
#[command(about = "A scheduled listing scraping engine", long_about = None)]
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

    /// Create the [[tenant]] configurations from the config file before running
    #[arg(long)]
    seed: bool,

    /// Validate config and show what would be scheduled without scraping
    #[arg(long, conflicts_with_all = ["once", "stats"])]
    dry_run: bool,

    /// Run a single scheduler tick and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    once: bool,

    /// Show job statistics for a configuration and exit
    #[arg(long, value_name = "CONFIGURATION_ID", conflicts_with_all = ["dry_run", "once"])]
    stats: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let storage = open_storage(Path::new(&config.service.database_path))
        .with_context(|| format!("failed to open {}", config.service.database_path))?;
    let service = HarvestService::from_config(&config, share(storage))?;

    if cli.seed {
        let created = service.seed_tenants(&config.tenants)?;
        tracing::info!("Seeded {} tenant configuration(s)", created.len());
    }

    if let Some(configuration_id) = cli.stats {
        handle_stats(&service, configuration_id)?;
    } else if cli.once {
        handle_once(&service).await?;
    } else {
        handle_run(&service).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvest=info,warn"),
            1 => EnvFilter::new("listing_harvest=debug,info"),
            2 => EnvFilter::new("listing_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would run
fn handle_dry_run(config: &ServiceConfig) {
    println!("=== listing-harvest Dry Run ===\n");

    println!("Service:");
    println!("  Database: {}", config.service.database_path);
    println!("  Tick: {}s", config.service.tick_seconds);
    println!("  Max concurrent jobs: {}", config.service.max_concurrent_jobs);

    println!("\nFetch:");
    println!(
        "  Rate limit: {} requests / {}s per domain",
        config.fetch.requests_per_window, config.fetch.window_seconds
    );
    println!("  Timeout: {}s", config.fetch.timeout_seconds);
    println!("  User agents: {}", config.fetch.user_agents.len());
    println!("  Proxies: {}", config.fetch.proxies.len());

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        println!("  - {} ({:?}) {}", source.name, source.kind, source.base_url);
    }

    println!("\nTenants ({}):", config.tenants.len());
    for tenant in &config.tenants {
        let settings = &tenant.settings;
        println!(
            "  - {}: {} work item(s), auto-scrape {}",
            tenant.tenant_id,
            settings.work_item_count(),
            if settings.auto_scrape_enabled {
                format!("every {}h", settings.auto_scrape_interval_hours)
            } else {
                "off".to_string()
            }
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics for one configuration
fn handle_stats(service: &HarvestService, configuration_id: i64) -> anyhow::Result<()> {
    let stats = service.get_stats(configuration_id)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --once mode: runs every due configuration and exits
async fn handle_once(service: &HarvestService) -> anyhow::Result<()> {
    let scheduled = service.scheduler().bootstrap()?;
    tracing::info!("Evaluating {} scheduled configuration(s)", scheduled);

    let report = service.scheduler().tick(Utc::now()).await?;
    tracing::info!(
        "Tick finished: {} configuration(s) run, {} job(s) created, {} completed, {} failed, {} cancelled",
        report.configurations_run,
        report.jobs_created,
        report.jobs_completed,
        report.jobs_failed,
        report.jobs_cancelled
    );
    Ok(())
}

/// Handles the default mode: runs the scheduler until Ctrl-C
async fn handle_run(service: &HarvestService) -> anyhow::Result<()> {
    let scheduled = service.scheduler().bootstrap()?;
    tracing::info!("Scheduler starting with {} configuration(s)", scheduled);
    service.scheduler().start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutdown requested");
    service.scheduler().stop().await;

    let controller = service.controller();
    controller.cancel_all();
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while controller.active_jobs() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if controller.active_jobs() > 0 {
        tracing::warn!(
            "{} job(s) still running after {}s, exiting anyway",
            controller.active_jobs(),
            SHUTDOWN_GRACE.as_secs()
        );
    }

    Ok(())
}
