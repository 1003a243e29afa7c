//! Hierarchical rollup.
//!
//! Walks the organizational index bottom-up shape-wise (unit, group,
//! division) and reduces each node's risk set with the configured
//! aggregation strategy, once over inherent figures and once over residual
//! figures. Levels the caller did not request are skipped, not computed and
//! discarded.

use crate::aggregate::aggregate;
use crate::config::AggregationConfig;
use crate::index::OrgIndex;
use crate::types::{round1, AggregatedRiskLevels, NodeSummary, OrgLevel, RiskLevel};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Inherent and residual figures of one risk, the rollup's only per-risk input
#[derive(Debug, Clone, Copy)]
pub struct RiskFigures {
    pub inherent: f64,
    pub residual: f64,
}

/// Produce per-node summaries for the requested levels.
///
/// `figures` holds the figure pair per participating risk id; risk ids in the
/// index but absent from `figures` are skipped, which is how the
/// validated-only variant narrows its input. `with_labels` additionally
/// classifies each node's residual aggregate into a display label.
pub fn rollup(
    index: &OrgIndex,
    figures: &HashMap<Uuid, RiskFigures>,
    config: &AggregationConfig,
    levels: &BTreeSet<OrgLevel>,
    with_labels: bool,
) -> AggregatedRiskLevels {
    let mut result = AggregatedRiskLevels::default();

    if levels.contains(&OrgLevel::Unit) {
        for &unit_id in &index.units {
            let ids = index.risks_by_unit.get(&unit_id).map(Vec::as_slice).unwrap_or(&[]);
            result.units.insert(unit_id, summarize(ids, figures, config, with_labels));
        }
    }

    if levels.contains(&OrgLevel::Group) {
        for &group_id in &index.groups {
            let ids = collect_group_risks(index, group_id);
            result.groups.insert(group_id, summarize(&ids, figures, config, with_labels));
        }
    }

    if levels.contains(&OrgLevel::Division) {
        for &division_id in &index.divisions {
            let mut ids = Vec::new();
            extend_from(&mut ids, index.risks_by_division.get(&division_id));
            for group_id in index.division_groups.get(&division_id).into_iter().flatten() {
                ids.extend(collect_group_risks(index, *group_id));
            }
            result.divisions.insert(division_id, summarize(&ids, figures, config, with_labels));
        }
    }

    result
}

/// Direct risks of a group plus the risks of every unit it owns
fn collect_group_risks(index: &OrgIndex, group_id: Uuid) -> Vec<Uuid> {
    let mut ids = Vec::new();
    extend_from(&mut ids, index.risks_by_group.get(&group_id));
    for unit_id in index.group_units.get(&group_id).into_iter().flatten() {
        extend_from(&mut ids, index.risks_by_unit.get(unit_id));
    }
    ids
}

fn extend_from(ids: &mut Vec<Uuid>, partition: Option<&Vec<Uuid>>) {
    if let Some(partition) = partition {
        ids.extend_from_slice(partition);
    }
}

/// Aggregate one node's risk set, deduplicated by risk id. A risk reachable
/// through more than one path counts exactly once.
fn summarize(
    ids: &[Uuid],
    figures: &HashMap<Uuid, RiskFigures>,
    config: &AggregationConfig,
    with_labels: bool,
) -> NodeSummary {
    let mut seen = HashSet::new();
    let mut inherent = Vec::new();
    let mut residual = Vec::new();
    for id in ids {
        if !seen.insert(*id) {
            continue;
        }
        if let Some(f) = figures.get(id) {
            inherent.push(f.inherent);
            residual.push(f.residual);
        }
    }

    // Two independent aggregation runs: the weighted method classifies each
    // run by its own figure, never by the other run's classification.
    let inherent_risk = round1(aggregate(&inherent, config));
    let residual_risk = round1(aggregate(&residual, config));
    let risk_level_label = with_labels
        .then(|| RiskLevel::classify(residual_risk, &config.thresholds).label().to_string());

    NodeSummary { inherent_risk, residual_risk, risk_count: inherent.len(), risk_level_label }
}
