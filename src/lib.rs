//! # ipinformer - IP threat-list cross-referencing
//!
//! Matches a feed of candidate IP addresses, of any size, against several
//! independently published malware and botnet blocklists and writes one CSV
//! row per IP that at least one list flags.
//!
//! ## Features
//!
//! - **Streaming** - The candidate feed is read line by line, never loaded whole
//! - **Fault Tolerant** - An unreachable list only leaves its column empty
//! - **Deterministic** - Columns follow list declaration order, rows follow feed order
//! - **Country Resolution** - Optional MaxMind GeoLite2 lookup
//! - **Reputation** - Optional VirusTotal lookups with mandatory request pacing
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ipinformer                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: scan, sources, version                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml, legacy JSON map)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls) ──► Registry (HashSet per list) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scanner                                                    │
//! │    reader ──► matcher ──► annotator (geo, reputation)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Report (csv)                                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use ipinformer::annotator::Annotator;
//! use ipinformer::config::Config;
//! use ipinformer::fetcher::Fetcher;
//! use ipinformer::reader::open_feed;
//! use ipinformer::registry::Registry;
//! use ipinformer::report::{create_output, CsvReport};
//! use ipinformer::scanner::Scanner;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("ipinformer.yaml")?;
//!
//!     let fetcher = Fetcher::new(&config.fetch)?;
//!     let registry = Registry::load(&config.sources, &fetcher).await?;
//!
//!     let mut feed = open_feed(Path::new("ip.txt")).await?;
//!     let output = create_output(Path::new("report.csv"))?;
//!     let mut report = CsvReport::new(output, &registry, false, false)?;
//!
//!     let annotator = Annotator::new();
//!     let summary = Scanner::new(&registry, &annotator)
//!         .run(&mut feed, &mut report)
//!         .await?;
//!     report.finish()?;
//!
//!     println!("{} of {} IPs flagged", summary.flagged, summary.processed);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`annotator`] - Inclusion policy and country / reputation annotation
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Typed domain errors
//! - [`fetcher`] - List download and parsing
//! - [`geo`] - MaxMind country lookups
//! - [`matcher`] - Per-candidate membership vectors
//! - [`reader`] - Candidate feed reading and IP extraction
//! - [`registry`] - Ordered collection of fetched lists
//! - [`report`] - CSV report sink
//! - [`reputation`] - VirusTotal client
//! - [`scanner`] - The streaming match pipeline
//! - [`signal`] - Graceful shutdown signal handling
//! - [`utils`] - Common utility functions (formatting, truncation)

pub mod annotator;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod geo;
pub mod matcher;
pub mod reader;
pub mod registry;
pub mod report;
pub mod reputation;
pub mod scanner;
pub mod signal;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::InformerError;
