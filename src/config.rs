//! Configuration provider.
//!
//! Tunables come from a key-value configuration store behind a short-lived
//! read cache. Missing or malformed values fall back to documented defaults
//! with a warning, never an error; aggregation keeps working with defaults.

use crate::types::{LevelThresholds, LevelWeights};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Config key for the aggregation method: "average" | "worst_case" | "weighted"
pub const KEY_AGGREGATION_METHOD: &str = "aggregation.method";
/// Config key for per-level weights, JSON `{"low":1,"medium":2,"high":3,"critical":4}`
pub const KEY_AGGREGATION_WEIGHTS: &str = "aggregation.weights";
/// Config key for level thresholds, JSON `{"low_max":6.0,"medium_max":12.0,"high_max":19.0}`
pub const KEY_LEVEL_THRESHOLDS: &str = "aggregation.thresholds";
/// Config key for the system-wide control effectiveness ceiling (percent)
pub const KEY_EFFECTIVENESS_CEILING: &str = "controls.effectiveness_ceiling";

/// Default control effectiveness ceiling; no single control removes more
/// than this share of a risk component
pub const DEFAULT_EFFECTIVENESS_CEILING: u8 = 95;

/// Strategy used to combine many risk values into one summary number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    #[default]
    Average,
    WorstCase,
    Weighted,
}

impl AggregationMethod {
    /// Parse the configured method string; unknown values read as default
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "average" => Some(AggregationMethod::Average),
            "worst_case" => Some(AggregationMethod::WorstCase),
            "weighted" => Some(AggregationMethod::Weighted),
            _ => None,
        }
    }
}

/// Full aggregation configuration consumed by the rollup engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub method: AggregationMethod,
    pub weights: LevelWeights,
    pub thresholds: LevelThresholds,
}

/// Key-value configuration source
pub trait ConfigStore: Send + Sync {
    /// Raw value for a key, if present
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory configuration store
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self { values: RwLock::new(HashMap::new()) }
    }

    /// Set a configuration value
    pub fn set(&self, key: &str, value: &str) {
        self.values.write().insert(key.to_string(), value.to_string());
    }

    /// Remove a configuration value
    pub fn unset(&self, key: &str) {
        self.values.write().remove(key);
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

#[derive(Debug, Clone)]
struct CachedValue {
    value: Option<String>,
    expires_at: DateTime<Utc>,
}

/// Read-through provider over a [`ConfigStore`] with a short-lived cache.
///
/// Negative lookups are cached too, so an absent key does not hit the store
/// on every aggregation run.
pub struct ConfigProvider {
    store: Arc<dyn ConfigStore>,
    cache: DashMap<String, CachedValue>,
    ttl: Duration,
}

impl ConfigProvider {
    /// Default read-cache lifetime
    pub const DEFAULT_TTL_SECS: i64 = 60;

    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_ttl(store, Duration::seconds(Self::DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        Self { store, cache: DashMap::new(), ttl }
    }

    fn raw(&self, key: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(key) {
            if cached.expires_at > Utc::now() {
                return cached.value.clone();
            }
        }
        let value = self.store.get(key);
        self.cache.insert(
            key.to_string(),
            CachedValue { value: value.clone(), expires_at: Utc::now() + self.ttl },
        );
        value
    }

    /// Configured aggregation method, defaulting to `average`
    pub fn aggregation_method(&self) -> AggregationMethod {
        match self.raw(KEY_AGGREGATION_METHOD) {
            None => AggregationMethod::default(),
            Some(s) => AggregationMethod::parse(&s).unwrap_or_else(|| {
                tracing::warn!(value = %s, "unknown aggregation method, using default");
                AggregationMethod::default()
            }),
        }
    }

    /// Configured per-level weights, defaulting to {1, 2, 3, 4}
    pub fn aggregation_weights(&self) -> LevelWeights {
        match self.raw(KEY_AGGREGATION_WEIGHTS) {
            None => LevelWeights::default(),
            Some(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "malformed aggregation weights, using defaults");
                LevelWeights::default()
            }),
        }
    }

    /// Configured level thresholds, defaulting to 6.0 / 12.0 / 19.0.
    /// Non-increasing thresholds cannot partition the scale and also fall
    /// back to defaults.
    pub fn level_thresholds(&self) -> LevelThresholds {
        let thresholds = match self.raw(KEY_LEVEL_THRESHOLDS) {
            None => return LevelThresholds::default(),
            Some(s) => match serde_json::from_str::<LevelThresholds>(&s) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed level thresholds, using defaults");
                    return LevelThresholds::default();
                }
            },
        };
        if !thresholds.is_valid() {
            tracing::warn!(?thresholds, "thresholds not strictly increasing, using defaults");
            return LevelThresholds::default();
        }
        thresholds
    }

    /// System-wide effectiveness ceiling in percent, defaulting to 95
    pub fn effectiveness_ceiling(&self) -> u8 {
        match self.raw(KEY_EFFECTIVENESS_CEILING) {
            None => DEFAULT_EFFECTIVENESS_CEILING,
            Some(s) => match s.parse::<u8>() {
                Ok(v) if v <= 100 => v,
                _ => {
                    tracing::warn!(value = %s, "invalid effectiveness ceiling, using default");
                    DEFAULT_EFFECTIVENESS_CEILING
                }
            },
        }
    }

    /// Snapshot of the full aggregation configuration
    pub fn aggregation_config(&self) -> AggregationConfig {
        AggregationConfig {
            method: self.aggregation_method(),
            weights: self.aggregation_weights(),
            thresholds: self.level_thresholds(),
        }
    }

    /// Drop every cached read so the next lookup hits the store
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(store: MemoryConfigStore) -> ConfigProvider {
        ConfigProvider::new(Arc::new(store))
    }

    #[test]
    fn test_defaults_when_unset() {
        let p = provider(MemoryConfigStore::new());
        assert_eq!(p.aggregation_method(), AggregationMethod::Average);
        assert_eq!(p.aggregation_weights(), LevelWeights::default());
        assert_eq!(p.level_thresholds(), LevelThresholds::default());
        assert_eq!(p.effectiveness_ceiling(), DEFAULT_EFFECTIVENESS_CEILING);
    }

    #[test]
    fn test_parses_configured_values() {
        let store = MemoryConfigStore::new();
        store.set(KEY_AGGREGATION_METHOD, "weighted");
        store.set(KEY_AGGREGATION_WEIGHTS, r#"{"low":1,"medium":1,"high":1,"critical":10}"#);
        store.set(KEY_LEVEL_THRESHOLDS, r#"{"low_max":2.0,"medium_max":8.0,"high_max":15.0}"#);
        store.set(KEY_EFFECTIVENESS_CEILING, "80");
        let p = provider(store);
        assert_eq!(p.aggregation_method(), AggregationMethod::Weighted);
        assert_eq!(p.aggregation_weights().critical, 10);
        assert_eq!(p.level_thresholds().medium_max, 8.0);
        assert_eq!(p.effectiveness_ceiling(), 80);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let store = MemoryConfigStore::new();
        store.set(KEY_AGGREGATION_METHOD, "median");
        store.set(KEY_AGGREGATION_WEIGHTS, "not json");
        store.set(KEY_LEVEL_THRESHOLDS, r#"{"low_max":9.0,"medium_max":3.0,"high_max":1.0}"#);
        store.set(KEY_EFFECTIVENESS_CEILING, "150");
        let p = provider(store);
        assert_eq!(p.aggregation_method(), AggregationMethod::Average);
        assert_eq!(p.aggregation_weights(), LevelWeights::default());
        assert_eq!(p.level_thresholds(), LevelThresholds::default());
        assert_eq!(p.effectiveness_ceiling(), DEFAULT_EFFECTIVENESS_CEILING);
    }

    #[test]
    fn test_read_cache_serves_stale_within_ttl() {
        let store = Arc::new(MemoryConfigStore::new());
        store.set(KEY_AGGREGATION_METHOD, "worst_case");
        let p = ConfigProvider::new(store.clone());
        assert_eq!(p.aggregation_method(), AggregationMethod::WorstCase);

        store.set(KEY_AGGREGATION_METHOD, "average");
        // Still the cached read
        assert_eq!(p.aggregation_method(), AggregationMethod::WorstCase);
        p.invalidate();
        assert_eq!(p.aggregation_method(), AggregationMethod::Average);
    }
}
