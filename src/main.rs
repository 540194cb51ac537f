//! Sumi-Frontier main entry point
//!
//! Command-line front end: fetches the configured seed URLs through the
//! scheduler and fetcher and reports what came back.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_frontier::config::{load_config_with_hash, Config};
use sumi_frontier::crawler::Crawler;
use sumi_frontier::output::print_statistics;
use sumi_frontier::{Request, Response};
use tracing_subscriber::EnvFilter;

/// Sumi-Frontier: a polite scheduling and fetching core
///
/// Sumi-Frontier deduplicates and prioritizes requests, fetches them with
/// a bounded pool of workers and retries transient failures with
/// exponential backoff.
#[derive(Parser, Debug)]
#[command(name = "sumi-frontier")]
#[command(version)]
#[command(about = "A polite crawl scheduler and fetcher", long_about = None)]
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

    /// Validate config and show what would be fetched without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_frontier=info,warn"),
            1 => EnvFilter::new("sumi_frontier=debug,info"),
            2 => EnvFilter::new("sumi_frontier=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Frontier Dry Run ===\n");

    println!("Scheduler:");
    println!("  Allowed schemes: {}", config.scheduler.allowed_schemes.join(", "));
    println!("  Allowed domains: {}", list_or_any(&config.scheduler.allowed_domains));
    println!("  Denied domains: {}", list_or_none(&config.scheduler.denied_domains));
    println!(
        "  Strip tracking params: {}",
        config.scheduler.strip_tracking_params
    );
    for (name, value) in &config.scheduler.default_headers {
        println!("  Default header: {}: {}", name, value);
    }

    println!("\nFetcher:");
    println!("  Concurrency: {}", config.fetcher.concurrency);
    println!("  Delay: {}ms", config.fetcher.delay_ms);
    println!("  Max retries: {}", config.fetcher.max_retries);
    println!("  Default timeout: {}ms", config.fetcher.default_timeout_ms);
    println!(
        "  Backoff: {}ms doubling up to {}ms",
        config.fetcher.backoff_base_ms, config.fetcher.backoff_cap_ms
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.user_agent_string());

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start fetching {} seed URLs", config.seeds.len());
}

fn list_or_any(items: &[String]) -> String {
    if items.is_empty() {
        "(any)".to_string()
    } else {
        items.join(", ")
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    if config.seeds.is_empty() {
        bail!("no seeds configured; add a top-level `seeds` list to the config");
    }

    let crawler = Crawler::new(&config, Arc::new(log_response))?;

    for seed in &config.seeds {
        let request = Request::new(seed).with_context(|| format!("invalid seed {}", seed))?;
        crawler.enqueue_raw(request)?;
    }
    tracing::info!("Total seed URLs: {}", config.seeds.len());

    let shutdown = crawler.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping workers");
            shutdown.stop();
        }
    });

    let stats = crawler.run().await.context("crawl failed")?;
    println!();
    print_statistics(&stats);

    Ok(())
}

fn log_response(response: Response) {
    match &response.error {
        None => tracing::info!(
            "{} {} ({} bytes, {:?})",
            response.status_code,
            response.url(),
            response.body.len(),
            response.elapsed
        ),
        Some(error) => tracing::warn!(
            "{} failed after {} attempt(s): {}",
            response.url(),
            response.attempts(),
            error
        ),
    }
}
