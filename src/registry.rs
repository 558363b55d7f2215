//! List registry: every configured list with its fetched members, in
//! declaration order.
//!
//! The registry is built once, before the candidate feed is opened, and is
//! only read afterwards. Index `i` everywhere in this module is the list's
//! position in the configuration, which is also its report column.

use anyhow::Result;
use std::collections::HashSet;
use tracing::warn;

use crate::config::{ListMethod, ListSourceConfig};
use crate::error::InformerError;
use crate::fetcher::Fetcher;

/// One threat list and its members
#[derive(Debug, Clone)]
pub struct ListSource {
    pub method: ListMethod,
    pub target: String,
    pub name: String,
    pub short_name: String,
    /// `None` until fetched, and forever if the fetch failed
    members: Option<HashSet<String>>,
}

impl ListSource {
    pub fn from_config(config: &ListSourceConfig) -> Self {
        Self {
            method: config.method,
            target: config.target.clone(),
            name: config.name.clone(),
            short_name: config.short_name.clone(),
            members: None,
        }
    }

    pub fn with_members(mut self, members: HashSet<String>) -> Self {
        self.members = Some(members);
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.members.is_some()
    }

    pub fn member_count(&self) -> usize {
        self.members.as_ref().map_or(0, HashSet::len)
    }

    /// Exact, verbatim membership. An unloaded list contains nothing.
    pub fn contains(&self, ip: &str) -> bool {
        self.members
            .as_ref()
            .is_some_and(|members| members.contains(ip))
    }
}

/// Ordered, read-only collection of lists
#[derive(Debug, Default)]
pub struct Registry {
    sources: Vec<ListSource>,
}

impl Registry {
    /// Build a registry, rejecting duplicate short names
    pub fn new(sources: Vec<ListSource>) -> Result<Self, InformerError> {
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.short_name.as_str()) {
                return Err(InformerError::DuplicateShortName(source.short_name.clone()));
            }
        }
        Ok(Self { sources })
    }

    /// Pair fetch results with their configs. Failed fetches are logged and
    /// leave the list unloaded.
    pub fn from_fetch_results(
        configs: &[ListSourceConfig],
        results: Vec<Result<HashSet<String>>>,
    ) -> Result<Self, InformerError> {
        let sources = configs
            .iter()
            .zip(results)
            .map(|(config, result)| {
                let source = ListSource::from_config(config);
                match result {
                    Ok(members) => source.with_members(members),
                    Err(e) => {
                        warn!("List: {}: unavailable ({:#})", config.name, e);
                        source
                    }
                }
            })
            .collect();
        Self::new(sources)
    }

    /// Fetch every configured list and build the registry once all
    /// fetches have settled
    pub async fn load(configs: &[ListSourceConfig], fetcher: &Fetcher) -> Result<Self> {
        let results = fetcher.fetch_lists(configs).await;
        Ok(Self::from_fetch_results(configs, results)?)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn name_at(&self, i: usize) -> Option<&str> {
        self.sources.get(i).map(|s| s.name.as_str())
    }

    pub fn short_name_at(&self, i: usize) -> Option<&str> {
        self.sources.get(i).map(|s| s.short_name.as_str())
    }

    /// `false` for unloaded lists and out-of-range indexes
    pub fn contains_at(&self, i: usize, ip: &str) -> bool {
        self.sources.get(i).is_some_and(|s| s.contains(ip))
    }

    pub fn member_count_at(&self, i: usize) -> usize {
        self.sources.get(i).map_or(0, ListSource::member_count)
    }

    pub fn is_loaded_at(&self, i: usize) -> bool {
        self.sources.get(i).is_some_and(ListSource::is_loaded)
    }

    /// Number of lists that were fetched successfully
    pub fn loaded_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_loaded()).count()
    }

    pub fn short_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.short_name.as_str())
    }

    pub fn sources(&self) -> &[ListSource] {
        &self.sources
    }
}
