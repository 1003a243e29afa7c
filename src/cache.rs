//! Result cache.
//!
//! Rollup results are cached per requested level subset for a fixed window.
//! Entries also record the store generation they were computed from, so any
//! mutation to risks, controls, links, or the hierarchy invalidates every
//! entry coarsely. Population is idempotent; concurrent writers overwriting
//! each other recompute the same pure function of current data.

use crate::types::{AggregatedRiskLevels, OrgLevel};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;

/// Cache key: the sorted, deduplicated requested level set plus the
/// validated-variant marker. Distinct subsets cache independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    levels: Vec<OrgLevel>,
    validated_only: bool,
}

impl CacheKey {
    pub fn new(levels: &BTreeSet<OrgLevel>, validated_only: bool) -> Self {
        Self { levels: levels.iter().copied().collect(), validated_only }
    }
}

struct CacheEntry {
    value: AggregatedRiskLevels,
    generation: u64,
    expires_at: DateTime<Utc>,
}

/// Process-wide, time-boxed rollup cache
pub struct ResultCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl ResultCache {
    /// Default entry lifetime
    pub const DEFAULT_TTL_SECS: i64 = 300;

    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(Self::DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    /// Cached result for the key, if fresh and computed from the same store
    /// generation
    pub fn get(&self, key: &CacheKey, generation: u64) -> Option<AggregatedRiskLevels> {
        let entry = self.entries.get(key)?;
        if entry.generation == generation && entry.expires_at > Utc::now() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Store a computed result. Last write wins.
    pub fn put(&self, key: CacheKey, value: AggregatedRiskLevels, generation: u64) {
        self.entries.insert(
            key,
            CacheEntry { value, generation, expires_at: Utc::now() + self.ttl },
        );
    }

    /// Drop every entry
    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::debug!(dropped, "result cache cleared");
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeSummary;
    use uuid::Uuid;

    fn result_with_one_unit() -> AggregatedRiskLevels {
        let mut result = AggregatedRiskLevels::default();
        result.units.insert(
            Uuid::new_v4(),
            NodeSummary { inherent_risk: 4.0, residual_risk: 2.0, risk_count: 1, risk_level_label: None },
        );
        result
    }

    fn key(levels: &[OrgLevel], validated_only: bool) -> CacheKey {
        CacheKey::new(&levels.iter().copied().collect(), validated_only)
    }

    #[test]
    fn test_hit_within_ttl_and_generation() {
        let cache = ResultCache::new();
        let k = key(&OrgLevel::ALL, false);
        cache.put(k.clone(), result_with_one_unit(), 7);
        assert!(cache.get(&k, 7).is_some());
    }

    #[test]
    fn test_generation_mismatch_misses() {
        let cache = ResultCache::new();
        let k = key(&OrgLevel::ALL, false);
        cache.put(k.clone(), result_with_one_unit(), 7);
        assert!(cache.get(&k, 8).is_none());
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = ResultCache::with_ttl(Duration::seconds(-1));
        let k = key(&OrgLevel::ALL, false);
        cache.put(k.clone(), result_with_one_unit(), 1);
        assert!(cache.get(&k, 1).is_none());
    }

    #[test]
    fn test_subsets_and_variants_cache_independently() {
        let cache = ResultCache::new();
        let full = key(&OrgLevel::ALL, false);
        let partial = key(&[OrgLevel::Unit], false);
        let validated = key(&OrgLevel::ALL, true);
        cache.put(full.clone(), result_with_one_unit(), 1);
        assert!(cache.get(&partial, 1).is_none());
        assert!(cache.get(&validated, 1).is_none());
        assert!(cache.get(&full, 1).is_some());
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = ResultCache::new();
        let k = key(&OrgLevel::ALL, false);
        cache.put(k.clone(), result_with_one_unit(), 1);
        cache.clear();
        assert!(cache.get(&k, 1).is_none());
    }
}
