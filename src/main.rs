//! CLI entry point for the ETSI mirror tool.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use etsi_sync::download::DEFAULT_MAX_RETRIES;
use etsi_sync::{CrawlConfig, CrawlReport, Crawler, RateLimiter, RetryPolicy};
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, LoadedConfig};
use cli::{Args, DEFAULT_RATE_LIMIT_MS};

/// Exit code when at least one file or branch failed.
const EXIT_PARTIAL_FAILURE: u8 = 2;

/// Exit code after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = match app_config::load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let file_config = loaded.file_config();

    init_tracing(&args, &file_config);
    debug!(?args, config_path = ?loaded.path, "CLI arguments parsed");

    match run(args, &loaded).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Priority: RUST_LOG env var > quiet flag > verbose flag > config file > info.
fn init_tracing(args: &Args, file_config: &FileConfig) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", app_config::VerbositySetting::default_filter),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout is reserved for the --json report.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args, loaded: &LoadedConfig) -> Result<ExitCode> {
    let file_config = loaded.file_config();
    let config = build_crawl_config(&args, &file_config);

    let max_retries = args
        .max_retries
        .map(u32::from)
        .or(file_config.max_retries)
        .unwrap_or(DEFAULT_MAX_RETRIES);
    let retry_policy = RetryPolicy::with_max_attempts(max_retries + 1);

    let rate_limit = args
        .rate_limit
        .or(file_config.rate_limit)
        .unwrap_or(DEFAULT_RATE_LIMIT_MS);
    let rate_limiter = if rate_limit == 0 {
        debug!("rate limiting disabled");
        Arc::new(RateLimiter::disabled())
    } else {
        debug!(rate_limit_ms = rate_limit, "rate limiting enabled");
        Arc::new(RateLimiter::new(Duration::from_millis(rate_limit)))
    };

    let crawler =
        Crawler::new(config, rate_limiter, retry_policy).context("Invalid crawl configuration")?;
    info!(
        host = %crawler.config().host,
        output_root = %crawler.config().output_root.display(),
        dry_run = crawler.config().dry_run,
        "etsi-sync starting"
    );

    let report = tokio::select! {
        result = crawler.run() => result.context("Crawl failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; in-flight transfers abandoned");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        print_summary(&report);
    }

    if report.has_failures() {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// CLI flags override file values, which override built-in defaults.
fn build_crawl_config(args: &Args, file_config: &FileConfig) -> CrawlConfig {
    let defaults = CrawlConfig::default();

    let document_types = if args.types.is_empty() {
        file_config
            .types
            .clone()
            .unwrap_or(defaults.document_types)
    } else {
        args.types.clone()
    };

    CrawlConfig {
        host: args
            .host
            .clone()
            .or_else(|| file_config.host.clone())
            .unwrap_or(defaults.host),
        document_types,
        series_groups: args
            .series
            .clone()
            .map(|series| series.0)
            .or_else(|| file_config.series.clone())
            .unwrap_or(defaults.series_groups),
        output_root: args
            .output_dir
            .clone()
            .or_else(|| file_config.output_dir.clone())
            .unwrap_or(defaults.output_root),
        listing_concurrency: args
            .listing_concurrency
            .map(usize::from)
            .or(file_config.listing_concurrency)
            .unwrap_or(defaults.listing_concurrency),
        transfer_concurrency: args
            .concurrency
            .map(usize::from)
            .or(file_config.concurrency)
            .unwrap_or(defaults.transfer_concurrency),
        dry_run: args.dry_run,
    }
}

fn print_summary(report: &CrawlReport) {
    let totals = &report.totals;
    if report.dry_run {
        for file in report.resolved_files() {
            println!("{}", file.remote_path);
        }
        println!("{} documents resolved (dry run)", totals.resolved);
    } else {
        println!(
            "{} resolved, {} completed, {} skipped, {} failed",
            totals.resolved, totals.completed, totals.skipped, totals.failed
        );
    }
    if totals.branch_failures > 0 {
        println!("{} branches abandoned", totals.branch_failures);
    }
}
