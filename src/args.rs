use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "trackscope",
    about = "Scan websites for third-party trackers and aggregate the findings",
    version,
    long_about = None
)]
pub struct Args {
    /// Path to the tracker registry JSON file
    #[arg(short, long, default_value = "trackers.json")]
    pub registry: PathBuf,

    /// Sites file (JSON array) to scan
    #[arg(short, long)]
    pub sites: Option<PathBuf>,

    /// Directory of capture manifests for the replay collector
    #[arg(long, default_value = "captures")]
    pub captures: PathBuf,

    /// Analyze previously saved raw scan results instead of scanning
    #[arg(short, long)]
    pub analyze: Option<PathBuf>,

    /// Where to write the normalized dataset
    #[arg(short, long, default_value = "results.json")]
    pub output: PathBuf,

    /// Cache ledger path
    #[arg(long, default_value = "scan_cache.json")]
    pub cache: PathBuf,

    /// Ignore the cache ledger and rescan everything
    #[arg(long)]
    pub no_cache: bool,

    /// Number of rows to display per ranking
    #[arg(short, long, default_value_t = 20)]
    pub top: usize,

    /// Also write the analytics report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
