//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest page harvester.

use anyhow::Context;
use catalog_harvest::config::{load_config_with_hash, validate, Config};
use catalog_harvest::crawler::{Coordinator, PageRange};
use catalog_harvest::output::{load_statistics, print_statistics, print_summary};
use catalog_harvest::ConfigError;
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a polite catalog page harvester
///
/// Catalog-Harvest fetches numbered listing pages with a bounded worker pool
/// under a global rate limit, validates every item it finds, and writes the
/// results to a CSV file once the run is done.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A polite catalog page harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults if omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Number of pages to fetch, or "unbounded" to follow "next" links
    #[arg(long, value_name = "N|unbounded", value_parser = parse_page_count)]
    pages: Option<PageCount>,

    /// First page number
    #[arg(long, value_name = "N")]
    start_page: Option<u32>,

    /// Number of concurrent workers
    #[arg(short, long, value_name = "N")]
    workers: Option<u32>,

    /// Output CSV path
    #[arg(short, long, value_name = "PATH")]
    output: Option<String>,

    /// Listing URL template with a {} page placeholder
    #[arg(long, value_name = "URL")]
    url_template: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Maximum attempts per request
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Minimum spacing between requests in milliseconds
    #[arg(long, value_name = "MS")]
    rate_limit_ms: Option<u64>,

    /// Fetch each item's detail page for title and availability
    #[arg(long)]
    fetch_details: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Also append log output to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics for an existing output file and exit
    #[arg(long, value_name = "CSV", conflicts_with = "dry_run")]
    stats: Option<PathBuf>,
}

/// Page count as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageCount {
    Fixed(u32),
    Unbounded,
}

fn parse_page_count(value: &str) -> Result<PageCount, String> {
    if value.eq_ignore_ascii_case("unbounded") {
        return Ok(PageCount::Unbounded);
    }
    value
        .parse::<u32>()
        .map(PageCount::Fixed)
        .map_err(|_| format!("expected a page count or \"unbounded\", got '{}'", value))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    if let Err(e) = setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Cannot open log file: {}", e);
        return ExitCode::from(2);
    }

    if let Some(path) = &cli.stats {
        return match handle_stats(path) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("Failed to read statistics: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return ExitCode::SUCCESS;
    }

    match handle_harvest(config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("Harvest failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set. With a log file, the same events are
/// appended to it without ANSI colors.
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let default_filter = if quiet {
        // Only show errors
        "error"
    } else {
        match verbose {
            0 => "catalog_harvest=info,warn",
            1 => "catalog_harvest=debug,info",
            2 => "catalog_harvest=trace,debug",
            _ => "trace",
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(Mutex::new(open_log_file(path)?))
                .with_target(false)
                .with_ansi(false),
        ),
        None => None,
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// Opens the log file for appending, creating it if needed
fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Loads the config file, applies command-line overrides, then validates
fn load(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    apply_overrides(cli, &mut config);
    validate(&config)?;

    Ok(config)
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    match cli.pages {
        Some(PageCount::Fixed(count)) => config.crawler.page_count = Some(count),
        Some(PageCount::Unbounded) => config.crawler.page_count = None,
        None => {}
    }
    if let Some(start_page) = cli.start_page {
        config.crawler.start_page = start_page;
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    if let Some(url_template) = &cli.url_template {
        config.crawler.url_template = url_template.clone();
    }
    if cli.fetch_details {
        config.crawler.fetch_details = true;
    }
    if let Some(timeout) = cli.timeout {
        config.http.timeout_secs = timeout;
    }
    if let Some(max_retries) = cli.max_retries {
        config.http.max_retries = max_retries;
    }
    if let Some(rate_limit_ms) = cli.rate_limit_ms {
        config.http.rate_limit_ms = rate_limit_ms;
    }
    if let Some(output) = &cli.output {
        config.output.path = output.clone();
    }
}

/// Handles the --dry-run mode: shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Pages:");
    println!("  URL template: {}", config.crawler.url_template);
    match PageRange::from_config(&config.crawler) {
        PageRange::Fixed { start, count } => {
            println!("  Range: {} pages starting at {}", count, start);
        }
        PageRange::Adaptive {
            start,
            max_pages,
            lookahead,
        } => {
            println!("  Range: from page {} until no next page", start);
            if let Some(max_pages) = max_pages {
                println!("  Max pages: {}", max_pages);
            }
            println!("  Lookahead: {}", lookahead);
        }
    }
    println!("  Fetch detail pages: {}", config.crawler.fetch_details);

    println!("\nWorkers & HTTP:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Rate limit: one request per {}ms", config.http.rate_limit_ms);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Max attempts: {}", config.http.max_retries);
    println!(
        "  Backoff: {:?} ({}ms base, {}ms max)",
        config.http.backoff, config.http.backoff_base_ms, config.http.backoff_max_ms
    );
    println!("  User agent: {}", config.http.user_agent);

    println!("\nLimits:");
    println!(
        "  Max consecutive failures: {}",
        config.limits.max_consecutive_failures
    );
    println!(
        "  Max failure ratio: {:.0}% (after {} pages)",
        config.limits.max_failure_ratio * 100.0,
        config.limits.min_pages_for_ratio
    );

    println!("\nOutput:");
    println!("  CSV: {}", config.output.path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics for an output file
fn handle_stats(path: &Path) -> anyhow::Result<()> {
    println!("Output file: {}\n", path.display());

    let stats = load_statistics(path)
        .with_context(|| format!("cannot read output file {}", path.display()))?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
///
/// Returns whether the run finalized.
async fn handle_harvest(config: Config) -> anyhow::Result<bool> {
    let mut coordinator = Coordinator::new(config).context("cannot set up harvest")?;

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl-C, stopping after in-flight pages");
            token.cancel();
        }
    });

    let summary = coordinator.run().await.context("harvest run failed")?;

    println!();
    print_summary(&summary);

    Ok(summary.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_page_count() {
        assert_eq!(parse_page_count("50"), Ok(PageCount::Fixed(50)));
        assert_eq!(parse_page_count("unbounded"), Ok(PageCount::Unbounded));
        assert_eq!(parse_page_count("Unbounded"), Ok(PageCount::Unbounded));
        assert!(parse_page_count("lots").is_err());
        assert!(parse_page_count("-1").is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let cli = Cli::parse_from([
            "catalog-harvest",
            "--pages",
            "3",
            "--workers",
            "2",
            "--output",
            "out.csv",
            "--rate-limit-ms",
            "0",
            "--fetch-details",
        ]);

        let mut config = Config::default();
        apply_overrides(&cli, &mut config);

        assert_eq!(config.crawler.page_count, Some(3));
        assert_eq!(config.crawler.workers, 2);
        assert_eq!(config.output.path, "out.csv");
        assert_eq!(config.http.rate_limit_ms, 0);
        assert!(config.crawler.fetch_details);
    }

    #[test]
    fn test_unbounded_clears_configured_count() {
        let cli = Cli::parse_from(["catalog-harvest", "--pages", "unbounded"]);

        let mut config = Config::default();
        config.crawler.page_count = Some(10);
        apply_overrides(&cli, &mut config);

        assert_eq!(config.crawler.page_count, None);
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let cli = Cli::parse_from(["catalog-harvest", "--workers", "0"]);
        assert!(load(&cli).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_file_option() {
        let cli = Cli::parse_from(["catalog-harvest", "--log-file", "harvest.log"]);
        assert_eq!(cli.log_file, Some(PathBuf::from("harvest.log")));

        let cli = Cli::parse_from(["catalog-harvest"]);
        assert_eq!(cli.log_file, None);
    }

    #[test]
    fn test_log_file_is_appended() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("harvest.log");

        writeln!(open_log_file(&path).unwrap(), "first run").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second run").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first run\nsecond run\n");
    }
}
