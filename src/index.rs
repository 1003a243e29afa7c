//! Organizational index.
//!
//! One pass over the unit/group/division collections and the risk set builds
//! every lookup the rollup needs, so walking the tree is index lookups only.
//! Without this, "risks of a division" is a triple loop of per-node scans.

use crate::types::{OrgDivision, OrgGroup, OrgLevel, OrgUnit, Risk};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Parent/child maps and risk partitions for one rollup run
#[derive(Debug, Default)]
pub struct OrgIndex {
    /// Non-deleted node ids per level
    pub units: Vec<Uuid>,
    pub groups: Vec<Uuid>,
    pub divisions: Vec<Uuid>,
    /// unit -> owning group (absent for roots and dangling parents)
    pub unit_group: HashMap<Uuid, Uuid>,
    /// group -> owning division (absent for roots and dangling parents)
    pub group_division: HashMap<Uuid, Uuid>,
    /// group -> its units
    pub group_units: HashMap<Uuid, Vec<Uuid>>,
    /// division -> its groups
    pub division_groups: HashMap<Uuid, Vec<Uuid>>,
    /// Risk ids partitioned by direct attachment level
    pub risks_by_unit: HashMap<Uuid, Vec<Uuid>>,
    pub risks_by_group: HashMap<Uuid, Vec<Uuid>>,
    pub risks_by_division: HashMap<Uuid, Vec<Uuid>>,
}

impl OrgIndex {
    /// Build the index from collection snapshots. Deleted nodes and risks are
    /// excluded; a node whose parent does not exist is kept as a root rather
    /// than rejected.
    pub fn build(
        units: &[OrgUnit],
        groups: &[OrgGroup],
        divisions: &[OrgDivision],
        risks: &[Risk],
    ) -> Self {
        let mut index = OrgIndex::default();

        let division_ids: HashSet<Uuid> =
            divisions.iter().filter(|d| !d.deleted).map(|d| d.id).collect();
        for division in divisions.iter().filter(|d| !d.deleted) {
            index.divisions.push(division.id);
        }

        let mut group_ids = HashSet::new();
        for group in groups.iter().filter(|g| !g.deleted) {
            index.groups.push(group.id);
            group_ids.insert(group.id);
            match group.division_id {
                Some(division_id) if division_ids.contains(&division_id) => {
                    index.group_division.insert(group.id, division_id);
                    index.division_groups.entry(division_id).or_default().push(group.id);
                }
                Some(division_id) => {
                    tracing::warn!(group_id = %group.id, %division_id, "group parent missing, treating as root");
                }
                None => {}
            }
        }

        for unit in units.iter().filter(|u| !u.deleted) {
            index.units.push(unit.id);
            match unit.group_id {
                Some(group_id) if group_ids.contains(&group_id) => {
                    index.unit_group.insert(unit.id, group_id);
                    index.group_units.entry(group_id).or_default().push(unit.id);
                }
                Some(group_id) => {
                    tracing::warn!(unit_id = %unit.id, %group_id, "unit parent missing, treating as root");
                }
                None => {}
            }
        }

        let unit_ids: HashSet<Uuid> = index.units.iter().copied().collect();
        for risk in risks.iter().filter(|r| !r.deleted) {
            let Some(attachment) = risk.attachment else { continue };
            let (known, partition) = match attachment.level {
                OrgLevel::Unit => (unit_ids.contains(&attachment.node_id), &mut index.risks_by_unit),
                OrgLevel::Group => (group_ids.contains(&attachment.node_id), &mut index.risks_by_group),
                OrgLevel::Division => {
                    (division_ids.contains(&attachment.node_id), &mut index.risks_by_division)
                }
            };
            if known {
                partition.entry(attachment.node_id).or_default().push(risk.id);
            } else {
                tracing::warn!(
                    risk_id = %risk.id,
                    node_id = %attachment.node_id,
                    level = ?attachment.level,
                    "risk attached to unknown node, excluded from rollup"
                );
            }
        }

        index
    }
}
