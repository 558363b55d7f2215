//! Membership matching of one candidate against every list.

use crate::registry::Registry;

/// Per-candidate hit vector, aligned with registry order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Membership(Vec<bool>);

impl Membership {
    pub fn new(hits: Vec<bool>) -> Self {
        Self(hits)
    }

    /// True if at least one list flags the candidate
    pub fn any(&self) -> bool {
        self.0.iter().any(|&hit| hit)
    }

    pub fn hit_count(&self) -> usize {
        self.0.iter().filter(|&&hit| hit).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> bool {
        self.0.get(i).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }
}

/// Check `ip` against every list in registry order.
///
/// Pure: the registry is only read, so concurrent calls are safe.
pub fn match_ip(ip: &str, registry: &Registry) -> Membership {
    Membership(
        (0..registry.source_count())
            .map(|i| registry.contains_at(i, ip))
            .collect(),
    )
}
