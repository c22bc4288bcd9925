//! Feedcrawl main entry point
//!
//! This is the command-line interface for running a configured spider.

use clap::Parser;
use feedcrawl::config::{load_config_with_hash, Config};
use feedcrawl::engine::{Engine, HttpFetcher};
use feedcrawl::output::print_summary;
use feedcrawl::spider::ConfiguredSpider;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Feedcrawl: a three-stage crawl-and-process engine
///
/// Feedcrawl turns the seeds of a TOML crawl file into requests, fetches
/// them, extracts the configured fields from each response and writes the
/// resulting records as JSON Lines or SQLite rows.
#[derive(Parser, Debug)]
#[command(name = "feedcrawl")]
#[command(version = "1.0.0")]
#[command(about = "A three-stage crawl-and-process engine", long_about = None)]
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

    /// Validate config and show the seed requests without fetching anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_crawl(&config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("feedcrawl=info,warn"),
            1 => EnvFilter::new("feedcrawl=debug,info"),
            2 => EnvFilter::new("feedcrawl=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Feedcrawl Dry Run ===\n");

    println!("Engine Configuration:");
    println!("  Max retries: {}", config.engine.max_retries);
    println!("  Pacing interval: {}ms", config.engine.pacing_interval_ms);
    println!("  Fetch concurrency: {}", config.engine.fetch_concurrency);
    println!("  Worker threads: {}", config.engine.worker_threads);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nHTTP:");
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);

    println!("\nSpider: {}", config.spider.name);
    println!("  Mode: {:?}", config.spider.mode);
    println!("  Fields ({}):", config.spider.fields.len());
    for (name, expression) in &config.spider.fields {
        println!("    {} <- {}", name, expression);
    }
    if let Some(follow) = &config.spider.follow {
        println!(
            "  Follow: {} (max depth {})",
            follow, config.spider.max_follow_depth
        );
    }

    println!("\nOutput:");
    println!("  {:?}: {}", config.output.kind, config.output.path);

    let requests = ConfiguredSpider::seed_requests(&config.spider)?;
    println!("\nSeed Requests ({}):", requests.len());
    for request in &requests {
        println!("  - {}", request);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed requests", requests.len());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = HttpFetcher::from_config(&config.user_agent, &config.http)?;
    let spider = ConfiguredSpider::from_config(config)?;

    let mut engine = Engine::new(spider, Arc::new(fetcher), config.engine_config())?;

    match engine.run().await {
        Ok(summary) => {
            tracing::info!("Crawl completed successfully");
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
