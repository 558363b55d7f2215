//! List fetcher: downloads or reads threat lists and parses them into
//! member sets.

use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{FetchConfig, ListMethod, ListSourceConfig};
use crate::error::InformerError;
use crate::utils::format_count;

const RETRY_DELAY_MS: u64 = 2000;

/// Maximum size per list (10 MB)
const MAX_LIST_SIZE: usize = 10 * 1024 * 1024;

/// Maximum total size for all lists combined (100 MB)
const MAX_TOTAL_SIZE: usize = 100 * 1024 * 1024;

/// Fetches lists over HTTP or from disk
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    concurrency: usize,
    retry_delay: Duration,
    /// Cumulative download size tracker (thread-safe for concurrent fetches)
    total_downloaded: AtomicUsize,
}

impl Fetcher {
    /// Create a fetcher from the `fetch` config section
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("ipinformer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
            concurrency: config.concurrency.max(1),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            total_downloaded: AtomicUsize::new(0),
        })
    }

    /// Override the base backoff between retries
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Get the total bytes read so far
    pub fn total_downloaded(&self) -> usize {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// Fetch and parse a single list
    pub async fn fetch_list(&self, source: &ListSourceConfig) -> Result<HashSet<String>> {
        debug!("Fetching {} ({} {})", source.name, source.method, source.target);

        let content = match source.method {
            ListMethod::Url => self.fetch_url(&source.target).await,
            ListMethod::File => self.read_file(&source.target).await,
        }
        .with_context(|| format!("Failed to fetch {}", source.name))?;

        let members = parse_list(&content);
        info!("List: {}: {} elements", source.name, format_count(members.len()));

        Ok(members)
    }

    /// Fetch every list with limited parallelism.
    ///
    /// Returns once all fetches have settled, one result per source in
    /// declaration order.
    pub async fn fetch_lists(&self, sources: &[ListSourceConfig]) -> Vec<Result<HashSet<String>>> {
        use futures::stream::{self, StreamExt};

        stream::iter(sources.iter().map(|source| self.fetch_list(source)))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Cannot open {}", path))?;
        if metadata.len() as usize > MAX_LIST_SIZE {
            return Err(InformerError::Fetch(format!(
                "List file too large: {} bytes (max: {} bytes)",
                metadata.len(),
                MAX_LIST_SIZE
            ))
            .into());
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read {}", path))?;
        self.account(bytes.len())?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// GET with retry, exponential backoff and size validation
    async fn fetch_url(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay * (1 << (attempt - 1));
                debug!("Retry {} after {:?} for {}", attempt, delay, url);
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        last_error = Some(anyhow::anyhow!("HTTP {}", response.status()));
                        continue;
                    }

                    if let Some(content_length) = response.content_length() {
                        if content_length as usize > MAX_LIST_SIZE {
                            return Err(InformerError::Fetch(format!(
                                "Response too large: {} bytes (max: {} bytes)",
                                content_length, MAX_LIST_SIZE
                            ))
                            .into());
                        }
                    }

                    let body = match response.bytes().await {
                        Ok(body) => body,
                        Err(e) => {
                            last_error = Some(e.into());
                            continue;
                        }
                    };

                    if body.len() > MAX_LIST_SIZE {
                        return Err(InformerError::Fetch(format!(
                            "Downloaded content too large: {} bytes (max: {} bytes)",
                            body.len(),
                            MAX_LIST_SIZE
                        ))
                        .into());
                    }
                    self.account(body.len())?;

                    return Ok(String::from_utf8_lossy(&body).into_owned());
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }

    /// Add to the cumulative counter, failing past the global cap
    fn account(&self, len: usize) -> Result<()> {
        let new_total = self.total_downloaded.fetch_add(len, Ordering::Relaxed) + len;
        if new_total > MAX_TOTAL_SIZE {
            return Err(InformerError::Fetch(format!(
                "Cumulative download limit exceeded: {} bytes (max: {} bytes)",
                new_total, MAX_TOTAL_SIZE
            ))
            .into());
        }
        Ok(())
    }
}

// Note: Default is intentionally not implemented for Fetcher
// because new() can fail and we want explicit error handling.

/// Parse list content: one member per non-empty line, `#` comments skipped.
///
/// Members are kept verbatim (after trimming); they are not validated as IPs.
pub fn parse_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn list_line_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
                .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
            Just("# comment".to_string()),
            Just("".to_string()),
            "[ -~]{0,20}",
        ]
    }

    proptest! {
        /// Every parsed member is a trimmed, non-empty, non-comment line
        #[test]
        fn prop_parsed_members_are_clean(lines in prop::collection::vec(list_line_strategy(), 0..50)) {
            let content = lines.join("\n");
            for member in parse_list(&content) {
                prop_assert!(!member.is_empty());
                prop_assert!(!member.starts_with('#'));
                prop_assert_eq!(member.trim(), member.as_str());
            }
        }

        /// Every non-comment line ends up in the set
        #[test]
        fn prop_no_member_lost(lines in prop::collection::vec(list_line_strategy(), 0..50)) {
            let content = lines.join("\n");
            let members = parse_list(&content);
            for line in &lines {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    prop_assert!(members.contains(trimmed));
                }
            }
        }
    }
}
