//! Sources command implementation.

use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::registry::Registry;
use crate::utils::{format_bytes, format_count, truncate};

/// Run the sources command
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let fetcher = Fetcher::new(&config.fetch)?;
    let registry = Registry::load(&config.sources, &fetcher).await?;

    println!();
    println!("List Sources ({} total):", registry.source_count());
    println!();
    print!("{}", render_table(&registry));
    println!();
    println!(
        "  Loaded: {}, Failed: {}, Downloaded: {}",
        registry.loaded_count(),
        registry.source_count() - registry.loaded_count(),
        format_bytes(fetcher.total_downloaded() as u64)
    );

    Ok(())
}

fn render_table(registry: &Registry) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<16} {:<32} {:<6} {:<7} {:>10}",
        "SHORT NAME", "NAME", "METHOD", "STATUS", "MEMBERS"
    );
    for source in registry.sources() {
        let (status, members) = if source.is_loaded() {
            ("OK", format_count(source.member_count()))
        } else {
            ("FAILED", "-".to_string())
        };
        let _ = writeln!(
            out,
            "  {:<16} {:<32} {:<6} {:<7} {:>10}",
            truncate(&source.short_name, 16),
            truncate(&source.name, 32),
            source.method.to_string(),
            status,
            members
        );
    }
    out
}
