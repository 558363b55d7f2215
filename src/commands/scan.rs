//! Scan command implementation.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::annotator::Annotator;
use crate::cli::ScanArgs;
use crate::config::{Config, ReputationConfig};
use crate::fetcher::Fetcher;
use crate::geo::{locate_database, GeoLookup, MaxMindGeo};
use crate::reader::open_feed;
use crate::registry::Registry;
use crate::report::{create_output, CsvReport};
use crate::reputation::{ReputationLookup, VirusTotalClient};
use crate::scanner::{ScanSummary, Scanner};
use crate::signal::{listen_for_shutdown, ShutdownToken};
use crate::utils::{format_bytes, format_count};

/// Resolved scan parameters
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Database path overriding `geoip.database`
    pub geoip: Option<PathBuf>,
    pub no_geoip: bool,
    /// Legacy reputation file; enables lookups when readable
    pub vt_config: Option<PathBuf>,
    pub workers: usize,
}

impl From<ScanArgs> for ScanOptions {
    fn from(args: ScanArgs) -> Self {
        Self {
            input: args.input,
            output: args.output,
            geoip: args.geoip,
            no_geoip: args.no_geoip,
            vt_config: args.vt_config,
            workers: usize::from(args.workers),
        }
    }
}

/// Run the scan command
pub async fn run(args: ScanArgs, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let options = ScanOptions::from(args);

    let shutdown = ShutdownToken::new();
    listen_for_shutdown(shutdown.clone());

    let summary = execute(&config, &options, Some(shutdown)).await?;

    let line = format!(
        "Processed {} IPs, {} IPs in malware lists.",
        summary.processed, summary.flagged
    );
    // Keep stdout clean when the report itself goes there
    if options.output == Path::new("-") {
        eprintln!("{}", line);
    } else {
        println!("{}", line);
    }

    Ok(())
}

/// Load the lists, stream the feed and write the report.
///
/// The feed is opened before anything is fetched so that a bad input path
/// fails fast.
pub async fn execute(
    config: &Config,
    options: &ScanOptions,
    shutdown: Option<ShutdownToken>,
) -> Result<ScanSummary> {
    let mut feed = open_feed(&options.input).await?;

    let mut annotator = Annotator::new();
    if let Some(geo) = build_geo(config, options) {
        annotator = annotator.with_geo(geo);
    }
    if let Some(reputation) = build_reputation(config, options) {
        annotator = annotator.with_reputation(reputation);
    }

    let fetcher = Fetcher::new(&config.fetch)?;
    let registry = match &shutdown {
        Some(token) => tokio::select! {
            registry = Registry::load(&config.sources, &fetcher) => registry?,
            _ = token.cancelled() => anyhow::bail!("Interrupted while fetching the lists"),
        },
        None => Registry::load(&config.sources, &fetcher).await?,
    };
    info!(
        "{} of {} lists loaded ({})",
        registry.loaded_count(),
        registry.source_count(),
        format_bytes(fetcher.total_downloaded() as u64)
    );

    let output = create_output(&options.output)?;
    let mut report = CsvReport::new(
        output,
        &registry,
        annotator.has_geo(),
        annotator.has_reputation(),
    )?;

    let mut scanner = Scanner::new(&registry, &annotator).with_workers(options.workers);
    if let Some(token) = shutdown {
        scanner = scanner.with_shutdown(token);
    }
    let result = scanner.run(&mut feed, &mut report).await;

    // Flush whatever was written, even when the feed broke mid-way
    let flushed = report
        .finish()
        .and_then(|mut output| output.flush().context("Failed to flush report"));

    let summary = settle(result, flushed)?;
    info!(
        "Processed {} lines: {} IPs, {} flagged, {} skipped",
        format_count(summary.lines),
        format_count(summary.processed),
        format_count(summary.flagged),
        format_count(summary.skipped)
    );
    if summary.interrupted {
        warn!("Scan interrupted, the report only covers the lines read so far");
    }

    Ok(summary)
}

/// A scan error wins over a flush error, which is only logged then
fn settle(result: Result<ScanSummary>, flushed: Result<()>) -> Result<ScanSummary> {
    match (result, flushed) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Ok(_), Err(flush)) => Err(flush),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(flush)) => {
            warn!("{:#}", flush);
            Err(e)
        }
    }
}

/// Open the country database, or degrade to no Country column
fn build_geo(config: &Config, options: &ScanOptions) -> Option<Box<dyn GeoLookup>> {
    if options.no_geoip || (options.geoip.is_none() && !config.geoip.enabled) {
        return None;
    }

    let path = locate_database(options.geoip.as_deref().unwrap_or(&config.geoip.database));
    match MaxMindGeo::open(&path) {
        Ok(geo) => Some(Box::new(geo)),
        Err(e) => {
            warn!("{:#}; the Country column is omitted", e);
            None
        }
    }
}

/// Build the reputation client, or degrade to no reputation columns
fn build_reputation(config: &Config, options: &ScanOptions) -> Option<Box<dyn ReputationLookup>> {
    let reputation = match &options.vt_config {
        Some(path) => match ReputationConfig::load_legacy(path) {
            Ok(legacy) => ReputationConfig {
                endpoint: config.reputation.endpoint.clone(),
                ..legacy
            },
            Err(e) => {
                warn!("{:#}; reputation lookups disabled", e);
                return None;
            }
        },
        None if config.reputation.enabled => config.reputation.clone(),
        None => return None,
    };

    if reputation.get_api_key().is_empty() {
        warn!("No reputation API key configured; reputation lookups disabled");
        return None;
    }

    let timeout = Duration::from_secs(config.fetch.timeout_secs);
    match VirusTotalClient::new(&reputation, timeout) {
        Ok(client) => {
            info!(
                "Reputation lookups enabled ({}s between requests)",
                reputation.delay_secs
            );
            Some(Box::new(client))
        }
        Err(e) => {
            warn!("{:#}; reputation lookups disabled", e);
            None
        }
    }
}
