//! Turns a membership vector into a report record.

use tracing::{debug, warn};

use crate::geo::GeoLookup;
use crate::matcher::Membership;
use crate::reputation::{ReputationLookup, ReputationReport};

/// Country cell value when the lookup fails
pub const UNKNOWN_COUNTRY: &str = "???";

/// One flagged candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub ip: String,
    /// `None` when country resolution is disabled
    pub country: Option<String>,
    pub membership: Membership,
    /// `None` when disabled or when the lookup failed
    pub reputation: Option<ReputationReport>,
}

/// Applies the inclusion policy and attaches optional lookups
#[derive(Default)]
pub struct Annotator {
    geo: Option<Box<dyn GeoLookup>>,
    reputation: Option<Box<dyn ReputationLookup>>,
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geo(mut self, geo: Box<dyn GeoLookup>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_reputation(mut self, reputation: Box<dyn ReputationLookup>) -> Self {
        self.reputation = Some(reputation);
        self
    }

    pub fn has_geo(&self) -> bool {
        self.geo.is_some()
    }

    pub fn has_reputation(&self) -> bool {
        self.reputation.is_some()
    }

    /// Build the record for `ip`, or `None` if no list flags it.
    ///
    /// Lookup failures only blank the affected field.
    pub async fn annotate(&self, ip: &str, membership: Membership) -> Option<Record> {
        if !membership.any() {
            return None;
        }
        debug!("{} is present in {} list(s)", ip, membership.hit_count());

        let country = self.geo.as_ref().map(|geo| {
            geo.country(ip)
                .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
        });

        let reputation = match &self.reputation {
            Some(lookup) => match lookup.lookup(ip).await {
                Ok(report) => {
                    if !report.is_known() {
                        debug!("{} is unknown to the reputation service", ip);
                    }
                    Some(report)
                }
                Err(e) => {
                    warn!("Reputation lookup for {} failed: {:#}", ip, e);
                    None
                }
            },
            None => None,
        };

        Some(Record {
            ip: ip.to_string(),
            country,
            membership,
            reputation,
        })
    }
}
