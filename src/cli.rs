//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ipinformer")]
#[command(author, version, about = "Cross-reference IP addresses against threat lists")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (YAML, or a legacy .json list map).
    /// Defaults to ./ipinformer.yaml, then to the built-in lists
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match a feed of candidate IPs against every list and write a CSV report
    Scan(ScanArgs),

    /// Fetch every configured list and show its status
    Sources,

    /// Show version
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Candidate feed, one IP per line (- for stdin)
    #[arg(short, long, default_value = "ip.txt")]
    pub input: PathBuf,

    /// CSV report path (- for stdout)
    #[arg(short, long, default_value = "ipinformer.csv")]
    pub output: PathBuf,

    /// GeoLite2 Country database, overriding the config
    #[arg(short, long, conflicts_with = "no_geoip")]
    pub geoip: Option<PathBuf>,

    /// Do not resolve countries (no Country column)
    #[arg(long)]
    pub no_geoip: bool,

    /// Legacy VirusTotal config ({"apikey": ..., "delay": ...}); enables lookups
    #[arg(long)]
    pub vt_config: Option<PathBuf>,

    /// Candidates evaluated concurrently
    #[arg(short = 'j', long, default_value = "1", value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,
}
