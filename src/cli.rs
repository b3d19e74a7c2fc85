//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use etsi_sync::DocumentType;
use etsi_sync::crawl::parse_series_groups;
use url::Url;

/// Default per-host request spacing in milliseconds.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 250;

/// Mirror the latest ETSI TS/TR deliverables into a local tree.
///
/// Walks `deliver/etsi_ts` and `deliver/etsi_tr` on the configured host,
/// picks the newest version of every document in the selected series
/// groups and stores it as `series_NN/<type>_<number>v<version>p.pdf`.
#[derive(Parser, Debug)]
#[command(name = "etsi-sync")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Remote host to mirror from [default: http://www.etsi.org/]
    #[arg(long)]
    pub host: Option<Url>,

    /// Document type to crawl (ts or tr); repeat for several [default: ts, tr]
    #[arg(short = 't', long = "type", value_parser = parse_document_type)]
    pub types: Vec<DocumentType>,

    /// Series groups to scan, e.g. `21-38,41` [default: 21-38]
    #[arg(short = 's', long, value_parser = parse_series)]
    pub series: Option<SeriesList>,

    /// Directory under which `series_NN` directories are created [default: .]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Listing pages fetched in parallel within one tree level (1-32) [default: 4]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub listing_concurrency: Option<u8>,

    /// Maximum concurrent file transfers (1-32) [default: 4]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Maximum retry attempts for transient listing failures (0-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Minimum delay between requests to the same host in milliseconds (0 to disable, max 60000) [default: 250]
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: Option<u64>,

    /// Resolve the tree and report what would be retrieved without transferring
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Read defaults from this config file instead of the XDG location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Parsed `--series` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesList(pub Vec<u8>);

fn parse_series(value: &str) -> Result<SeriesList, String> {
    parse_series_groups(value).map(SeriesList)
}

fn parse_document_type(value: &str) -> Result<DocumentType, String> {
    value.parse()
}
