//! Hierarchical Risk Aggregation Engine
//!
//! Residual-risk calculation and organizational rollup for an enterprise
//! risk register. Risks carry probability and impact factors; linked controls
//! reduce them under an independent-reduction model; the rollup walks the
//! three-level organizational tree and reduces each node's risk set with a
//! configurable aggregation strategy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        RISK ENGINE                               │
//! │                                                                  │
//! │  ┌────────────┐   ┌──────────────┐   ┌───────────────────────┐  │
//! │  │   Config   │   │   Residual   │   │  Organizational Index │  │
//! │  │  Provider  │   │  Calculator  │   │       Builder         │  │
//! │  └─────┬──────┘   └──────┬───────┘   └──────────┬────────────┘  │
//! │        │                 │                      │               │
//! │  ┌─────▼─────────────────▼──────────────────────▼────────────┐  │
//! │  │                 HIERARCHICAL ROLLUP                       │  │
//! │  │   unit / group / division | dedup by risk id | labels     │  │
//! │  └───────────────────────────┬───────────────────────────────┘  │
//! │                              │                                  │
//! │  ┌───────────────────────────▼───────────────────────────────┐  │
//! │  │        RESULT CACHE (per level subset, TTL-boxed)         │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is synchronous and CPU-bound: every run takes one snapshot of
//! each record collection, then aggregates without further store access.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod index;
pub mod residual;
pub mod rollup;
pub mod store;
pub mod types;

use cache::{CacheKey, ResultCache};
use chrono::Duration;
use config::ConfigProvider;
use rollup::RiskFigures;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use config::{AggregationConfig, AggregationMethod, ConfigStore, MemoryConfigStore};
pub use store::{MemoryStore, RecordStore};
pub use types::{
    AggregatedRiskLevels, Control, EffectTarget, LevelThresholds, LevelWeights, NodeSummary,
    OrgAttachment, OrgDivision, OrgGroup, OrgLevel, OrgUnit, ResidualRisk, Risk, RiskControlLink,
    RiskLevel, RiskLevelSummary, ValidationRecord, ValidationStatus,
};

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// No live risk with this id
    #[error("risk not found: {0}")]
    RiskNotFound(Uuid),
    /// No control with this id
    #[error("control not found: {0}")]
    ControlNotFound(Uuid),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Tunables fixed at engine construction
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Lifetime of cached rollup results
    pub result_cache_ttl: Duration,
    /// Lifetime of cached configuration reads
    pub config_cache_ttl: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            result_cache_ttl: Duration::seconds(ResultCache::DEFAULT_TTL_SECS),
            config_cache_ttl: Duration::seconds(ConfigProvider::DEFAULT_TTL_SECS),
        }
    }
}

/// The aggregation engine: wires the record store, configuration provider
/// and result cache behind the public operations
pub struct RiskEngine {
    store: Arc<dyn RecordStore>,
    config: ConfigProvider,
    cache: ResultCache,
}

impl RiskEngine {
    /// Create an engine with default cache lifetimes
    pub fn new(store: Arc<dyn RecordStore>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self::with_options(store, config_store, EngineOptions::default())
    }

    /// Create an engine with explicit cache lifetimes
    pub fn with_options(
        store: Arc<dyn RecordStore>,
        config_store: Arc<dyn ConfigStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            config: ConfigProvider::with_ttl(config_store, options.config_cache_ttl),
            cache: ResultCache::with_ttl(options.result_cache_ttl),
        }
    }

    /// Compute the residual figures of one risk from its linked controls and
    /// write the residual back onto every link of the risk.
    pub fn compute_residual(&self, risk_id: Uuid) -> EngineResult<ResidualRisk> {
        let risk = self
            .store
            .risk(risk_id)
            .filter(|r| !r.deleted)
            .ok_or(EngineError::RiskNotFound(risk_id))?;
        let links = self.store.links_for_risk(risk_id);
        let controls: Vec<Control> =
            links.iter().filter_map(|l| self.store.control(l.control_id)).collect();
        let refs: Vec<&Control> = controls.iter().collect();

        let figures = residual::compute_residual(&risk, &refs, self.config.effectiveness_ceiling());
        self.store.write_link_residuals(risk_id, figures.risk);
        Ok(figures)
    }

    /// Aggregated {inherent, residual, count} per node for the requested
    /// hierarchy levels. `None` requests all three levels. Served from the
    /// result cache when fresh.
    pub fn aggregated_risk_levels(&self, levels: Option<&[OrgLevel]>) -> AggregatedRiskLevels {
        let requested: BTreeSet<OrgLevel> = match levels {
            Some(levels) => levels.iter().copied().collect(),
            None => OrgLevel::ALL.into_iter().collect(),
        };
        self.cached_rollup(&requested, false)
    }

    /// Dashboard variant: same rollup over all three levels, restricted to
    /// risks whose organizational association is validated, with a risk-level
    /// label per node.
    pub fn validated_aggregated_risk_levels(&self) -> AggregatedRiskLevels {
        let requested: BTreeSet<OrgLevel> = OrgLevel::ALL.into_iter().collect();
        self.cached_rollup(&requested, true)
    }

    /// Batch-recompute the residual of every live risk, refreshing the
    /// denormalized link values. Run after configuration or
    /// control-effectiveness changes. Returns the number of risks processed.
    pub fn recalculate_all_residual_risks(&self) -> usize {
        // Pick up configuration changes immediately rather than after the
        // read-cache window
        self.config.invalidate();
        let ceiling = self.config.effectiveness_ceiling();

        let risks = self.store.risks();
        let controls = self.store.controls();
        let links = self.store.links();
        let controls_by_risk = group_controls_by_risk(&controls, &links);

        let mut count = 0;
        for risk in risks.iter().filter(|r| !r.deleted) {
            let linked = controls_by_risk.get(&risk.id).map(Vec::as_slice).unwrap_or(&[]);
            let figures = residual::compute_residual(risk, linked, ceiling);
            self.store.write_link_residuals(risk.id, figures.risk);
            count += 1;
        }
        tracing::info!(count, "recalculated residual risks");
        self.invalidate_cache();
        count
    }

    /// Drop every cached rollup result and configuration read
    pub fn invalidate_cache(&self) {
        self.cache.clear();
        self.config.invalidate();
    }

    /// Count live risks per classified residual level
    pub fn risk_level_summary(&self) -> RiskLevelSummary {
        let thresholds = self.config.level_thresholds();
        let ceiling = self.config.effectiveness_ceiling();
        let risks = self.store.risks();
        let controls = self.store.controls();
        let links = self.store.links();
        let controls_by_risk = group_controls_by_risk(&controls, &links);

        let mut summary = RiskLevelSummary::default();
        for risk in risks.iter().filter(|r| !r.deleted) {
            let linked = controls_by_risk.get(&risk.id).map(Vec::as_slice).unwrap_or(&[]);
            let figures = residual::compute_residual(risk, linked, ceiling);
            summary.total += 1;
            match RiskLevel::classify(figures.risk, &thresholds) {
                RiskLevel::Low => summary.low += 1,
                RiskLevel::Medium => summary.medium += 1,
                RiskLevel::High => summary.high += 1,
                RiskLevel::Critical => summary.critical += 1,
            }
        }
        summary
    }

    fn cached_rollup(
        &self,
        requested: &BTreeSet<OrgLevel>,
        validated_only: bool,
    ) -> AggregatedRiskLevels {
        let key = CacheKey::new(requested, validated_only);
        let generation = self.store.generation();
        if let Some(hit) = self.cache.get(&key, generation) {
            tracing::debug!(validated_only, "rollup served from cache");
            return hit;
        }
        let result = self.compute_rollup(requested, validated_only);
        self.cache.put(key, result.clone(), generation);
        result
    }

    /// One full rollup run: snapshot every collection once, compute per-risk
    /// figures, build the index, walk the tree.
    fn compute_rollup(
        &self,
        requested: &BTreeSet<OrgLevel>,
        validated_only: bool,
    ) -> AggregatedRiskLevels {
        let risks = self.store.risks();
        let controls = self.store.controls();
        let links = self.store.links();
        let units = self.store.units();
        let groups = self.store.groups();
        let divisions = self.store.divisions();

        let config = self.config.aggregation_config();
        let ceiling = self.config.effectiveness_ceiling();
        let controls_by_risk = group_controls_by_risk(&controls, &links);

        let validated: Option<HashSet<Uuid>> = validated_only.then(|| {
            self.store
                .validations()
                .into_iter()
                .filter(|v| v.status == ValidationStatus::Validated)
                .map(|v| v.risk_id)
                .collect()
        });

        let mut figures = HashMap::new();
        for risk in risks.iter().filter(|r| !r.deleted) {
            if let Some(allowed) = &validated {
                if !allowed.contains(&risk.id) {
                    continue;
                }
            }
            let linked = controls_by_risk.get(&risk.id).map(Vec::as_slice).unwrap_or(&[]);
            let residual = residual::compute_residual(risk, linked, ceiling);
            figures.insert(
                risk.id,
                RiskFigures { inherent: risk.inherent_risk, residual: residual.risk },
            );
        }

        let index = index::OrgIndex::build(&units, &groups, &divisions, &risks);
        rollup::rollup(&index, &figures, &config, requested, validated_only)
    }
}

/// Resolve each risk's linked controls from the link and control snapshots
fn group_controls_by_risk<'a>(
    controls: &'a [Control],
    links: &[RiskControlLink],
) -> HashMap<Uuid, Vec<&'a Control>> {
    let by_id: HashMap<Uuid, &Control> = controls.iter().map(|c| (c.id, c)).collect();
    let mut grouped: HashMap<Uuid, Vec<&Control>> = HashMap::new();
    for link in links {
        if let Some(control) = by_id.get(&link.control_id) {
            grouped.entry(link.risk_id).or_default().push(control);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        config: Arc<MemoryConfigStore>,
        engine: RiskEngine,
        unit: Uuid,
        group: Uuid,
        division: Uuid,
    }

    /// division > group > unit, no risks yet
    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(MemoryConfigStore::new());
        let division = store.upsert_division(OrgDivision {
            id: Uuid::new_v4(),
            name: "d".into(),
            deleted: false,
        });
        let group = store.upsert_group(OrgGroup {
            id: Uuid::new_v4(),
            name: "g".into(),
            division_id: Some(division),
            deleted: false,
        });
        let unit = store.upsert_unit(OrgUnit {
            id: Uuid::new_v4(),
            name: "u".into(),
            group_id: Some(group),
            deleted: false,
        });
        let engine = RiskEngine::new(store.clone(), config.clone());
        Fixture { store, config, engine, unit, group, division }
    }

    fn unit_risk(f: &Fixture, probability: f64, impact: f64) -> Uuid {
        f.store.upsert_risk(Risk::new(
            "r",
            probability,
            impact,
            Some(OrgAttachment { level: OrgLevel::Unit, node_id: f.unit }),
        ))
    }

    #[test]
    fn test_compute_residual_writes_back_to_links() {
        let f = fixture();
        let risk = unit_risk(&f, 4.0, 4.0);
        let control = f.store.upsert_control(Control::new("c", 50, EffectTarget::Both));
        f.store.link_control(risk, control).unwrap();

        let figures = f.engine.compute_residual(risk).unwrap();
        assert_eq!(figures, ResidualRisk { probability: 2.0, impact: 2.0, risk: 4.0 });
        assert_eq!(f.store.links_for_risk(risk)[0].residual_risk, 4.0);
    }

    #[test]
    fn test_compute_residual_unknown_or_deleted_risk() {
        let f = fixture();
        assert!(matches!(
            f.engine.compute_residual(Uuid::new_v4()),
            Err(EngineError::RiskNotFound(_))
        ));
        let risk = unit_risk(&f, 2.0, 2.0);
        f.store.delete_risk(risk);
        assert!(matches!(f.engine.compute_residual(risk), Err(EngineError::RiskNotFound(_))));
    }

    #[test]
    fn test_rollup_worked_example_through_engine() {
        let f = fixture();
        // R1: inherent 10, no controls. R2: p=4 i=4 with a 50% both-target
        // control, residual 4.
        unit_risk(&f, 2.5, 4.0);
        let r2 = unit_risk(&f, 4.0, 4.0);
        let control = f.store.upsert_control(Control::new("c", 50, EffectTarget::Both));
        f.store.link_control(r2, control).unwrap();

        let result = f.engine.aggregated_risk_levels(None);
        let group = &result.groups[&f.group];
        assert_eq!(group.residual_risk, 7.0);
        assert_eq!(group.inherent_risk, 13.0);
        assert_eq!(group.risk_count, 2);
        assert_eq!(result.divisions[&f.division].risk_count, 2);
        assert_eq!(result.units[&f.unit].risk_count, 2);

        f.config.set(config::KEY_AGGREGATION_METHOD, "worst_case");
        f.engine.invalidate_cache();
        let result = f.engine.aggregated_risk_levels(None);
        assert_eq!(result.groups[&f.group].residual_risk, 10.0);
    }

    #[test]
    fn test_requested_subset_skips_other_levels() {
        let f = fixture();
        unit_risk(&f, 2.0, 2.0);
        let result = f.engine.aggregated_risk_levels(Some(&[OrgLevel::Unit, OrgLevel::Division]));
        assert!(!result.units.is_empty());
        assert!(result.groups.is_empty());
        assert!(!result.divisions.is_empty());
    }

    #[test]
    fn test_validated_variant_filters_and_labels() {
        let f = fixture();
        let validated = unit_risk(&f, 5.0, 5.0);
        unit_risk(&f, 1.0, 1.0); // never validated
        f.store.set_validation(validated, "validated");

        let result = f.engine.validated_aggregated_risk_levels();
        let unit = &result.units[&f.unit];
        assert_eq!(unit.risk_count, 1);
        assert_eq!(unit.residual_risk, 25.0);
        assert_eq!(unit.risk_level_label.as_deref(), Some("critical"));

        // The unrestricted rollup still sees both risks and carries no label
        let full = f.engine.aggregated_risk_levels(None);
        assert_eq!(full.units[&f.unit].risk_count, 2);
        assert!(full.units[&f.unit].risk_level_label.is_none());
    }

    #[test]
    fn test_mutation_invalidates_cached_rollup() {
        let f = fixture();
        unit_risk(&f, 2.0, 2.0);
        let before = f.engine.aggregated_risk_levels(None);
        assert_eq!(before.units[&f.unit].risk_count, 1);

        unit_risk(&f, 3.0, 3.0);
        let after = f.engine.aggregated_risk_levels(None);
        assert_eq!(after.units[&f.unit].risk_count, 2);
    }

    #[test]
    fn test_soft_deleted_risk_leaves_aggregates() {
        let f = fixture();
        let keep = unit_risk(&f, 2.0, 2.0);
        let gone = unit_risk(&f, 4.0, 4.0);
        f.store.delete_risk(gone);

        let result = f.engine.aggregated_risk_levels(None);
        assert_eq!(result.units[&f.unit].risk_count, 1);
        assert_eq!(result.units[&f.unit].inherent_risk, f.store.risk(keep).unwrap().inherent_risk);
    }

    #[test]
    fn test_recalculate_all_refreshes_links_and_counts() {
        let f = fixture();
        let r1 = unit_risk(&f, 4.0, 4.0);
        let r2 = unit_risk(&f, 2.0, 2.0);
        let control = f.store.upsert_control(Control::new("c", 50, EffectTarget::Both));
        f.store.link_control(r1, control).unwrap();
        f.store.link_control(r2, control).unwrap();

        let count = f.engine.recalculate_all_residual_risks();
        assert_eq!(count, 2);
        assert_eq!(f.store.links_for_risk(r1)[0].residual_risk, 4.0);
        assert_eq!(f.store.links_for_risk(r2)[0].residual_risk, 1.0);
    }

    #[test]
    fn test_risk_level_summary_classifies_residuals() {
        let f = fixture();
        unit_risk(&f, 1.0, 1.0); // residual 1.0 -> low
        unit_risk(&f, 3.0, 3.0); // residual 9.0 -> medium
        unit_risk(&f, 5.0, 5.0); // residual 25.0 -> critical

        let summary = f.engine.risk_level_summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.medium, 1);
        assert_eq!(summary.high, 0);
        assert_eq!(summary.critical, 1);
    }
}
