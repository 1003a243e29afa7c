//! Record store.
//!
//! One interface over the external record collections, with one concrete
//! implementation per backing store, selected once at process start. This
//! crate ships the in-memory implementation; a database-backed one plugs in
//! behind the same trait.

use crate::types::{
    Control, OrgDivision, OrgGroup, OrgUnit, Risk, RiskControlLink, ValidationRecord,
    ValidationStatus,
};
use crate::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Read surface the engine consumes, plus the one write it owns (the
/// denormalized per-link residual) and a generation counter that advances on
/// every mutation so cached rollups can tell stale data apart.
pub trait RecordStore: Send + Sync {
    fn risk(&self, id: Uuid) -> Option<Risk>;
    fn risks(&self) -> Vec<Risk>;
    fn control(&self, id: Uuid) -> Option<Control>;
    fn controls(&self) -> Vec<Control>;
    fn links(&self) -> Vec<RiskControlLink>;
    fn links_for_risk(&self, risk_id: Uuid) -> Vec<RiskControlLink>;
    fn units(&self) -> Vec<OrgUnit>;
    fn groups(&self) -> Vec<OrgGroup>;
    fn divisions(&self) -> Vec<OrgDivision>;
    fn validations(&self) -> Vec<ValidationRecord>;

    /// Write the recomputed residual onto every link of the risk, in one
    /// unit of work so readers never see a half-updated link set
    fn write_link_residuals(&self, risk_id: Uuid, residual: f64);

    /// Monotonic counter advanced by every mutation
    fn generation(&self) -> u64;
}

/// In-memory record store
pub struct MemoryStore {
    risks: RwLock<HashMap<Uuid, Risk>>,
    controls: RwLock<HashMap<Uuid, Control>>,
    links: RwLock<HashMap<Uuid, RiskControlLink>>,
    units: RwLock<HashMap<Uuid, OrgUnit>>,
    groups: RwLock<HashMap<Uuid, OrgGroup>>,
    divisions: RwLock<HashMap<Uuid, OrgDivision>>,
    validations: RwLock<HashMap<Uuid, ValidationRecord>>,
    generation: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            risks: RwLock::new(HashMap::new()),
            controls: RwLock::new(HashMap::new()),
            links: RwLock::new(HashMap::new()),
            units: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            divisions: RwLock::new(HashMap::new()),
            validations: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Insert or replace a risk
    pub fn upsert_risk(&self, risk: Risk) -> Uuid {
        let id = risk.id;
        self.risks.write().insert(id, risk);
        self.bump();
        id
    }

    /// Soft-delete a risk; it stops aggregating but its record remains
    pub fn delete_risk(&self, id: Uuid) {
        if let Some(risk) = self.risks.write().get_mut(&id) {
            risk.deleted = true;
            risk.updated_at = chrono::Utc::now();
        }
        self.bump();
    }

    /// Insert or replace a control
    pub fn upsert_control(&self, control: Control) -> Uuid {
        let id = control.id;
        self.controls.write().insert(id, control);
        self.bump();
        id
    }

    /// Deactivate a control; existing links keep their rows but stop
    /// qualifying for reduction
    pub fn deactivate_control(&self, id: Uuid) {
        if let Some(control) = self.controls.write().get_mut(&id) {
            control.active = false;
            control.updated_at = chrono::Utc::now();
        }
        self.bump();
    }

    /// Link a control to a risk. Both records must exist.
    pub fn link_control(&self, risk_id: Uuid, control_id: Uuid) -> EngineResult<Uuid> {
        let inherent = self
            .risks
            .read()
            .get(&risk_id)
            .map(|r| r.inherent_risk)
            .ok_or(EngineError::RiskNotFound(risk_id))?;
        if !self.controls.read().contains_key(&control_id) {
            return Err(EngineError::ControlNotFound(control_id));
        }
        let link = RiskControlLink {
            id: Uuid::new_v4(),
            risk_id,
            control_id,
            // Placeholder until the engine recomputes the risk
            residual_risk: inherent,
        };
        let id = link.id;
        self.links.write().insert(id, link);
        self.bump();
        Ok(id)
    }

    /// Remove a risk-control association
    pub fn unlink_control(&self, risk_id: Uuid, control_id: Uuid) {
        self.links
            .write()
            .retain(|_, l| !(l.risk_id == risk_id && l.control_id == control_id));
        self.bump();
    }

    pub fn upsert_unit(&self, unit: OrgUnit) -> Uuid {
        let id = unit.id;
        self.units.write().insert(id, unit);
        self.bump();
        id
    }

    pub fn upsert_group(&self, group: OrgGroup) -> Uuid {
        let id = group.id;
        self.groups.write().insert(id, group);
        self.bump();
        id
    }

    pub fn upsert_division(&self, division: OrgDivision) -> Uuid {
        let id = division.id;
        self.divisions.write().insert(id, division);
        self.bump();
        id
    }

    /// Record the validation status of a risk's organizational association
    pub fn set_validation(&self, risk_id: Uuid, status: &str) {
        let status = ValidationStatus::parse(status);
        self.validations
            .write()
            .insert(risk_id, ValidationRecord { risk_id, status });
        self.bump();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn risk(&self, id: Uuid) -> Option<Risk> {
        self.risks.read().get(&id).cloned()
    }

    fn risks(&self) -> Vec<Risk> {
        self.risks.read().values().cloned().collect()
    }

    fn control(&self, id: Uuid) -> Option<Control> {
        self.controls.read().get(&id).cloned()
    }

    fn controls(&self) -> Vec<Control> {
        self.controls.read().values().cloned().collect()
    }

    fn links(&self) -> Vec<RiskControlLink> {
        self.links.read().values().cloned().collect()
    }

    fn links_for_risk(&self, risk_id: Uuid) -> Vec<RiskControlLink> {
        self.links
            .read()
            .values()
            .filter(|l| l.risk_id == risk_id)
            .cloned()
            .collect()
    }

    fn units(&self) -> Vec<OrgUnit> {
        self.units.read().values().cloned().collect()
    }

    fn groups(&self) -> Vec<OrgGroup> {
        self.groups.read().values().cloned().collect()
    }

    fn divisions(&self) -> Vec<OrgDivision> {
        self.divisions.read().values().cloned().collect()
    }

    fn validations(&self) -> Vec<ValidationRecord> {
        self.validations.read().values().cloned().collect()
    }

    fn write_link_residuals(&self, risk_id: Uuid, residual: f64) {
        let mut links = self.links.write();
        for link in links.values_mut().filter(|l| l.risk_id == risk_id) {
            link.residual_risk = residual;
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffectTarget;

    #[test]
    fn test_mutations_advance_generation() {
        let store = MemoryStore::new();
        let before = store.generation();
        store.upsert_risk(Risk::new("r", 2.0, 2.0, None));
        assert!(store.generation() > before);
    }

    #[test]
    fn test_link_requires_both_records() {
        let store = MemoryStore::new();
        let risk_id = store.upsert_risk(Risk::new("r", 2.0, 2.0, None));
        let control_id = store.upsert_control(Control::new("c", 50, EffectTarget::Both));

        assert!(store.link_control(risk_id, control_id).is_ok());
        assert!(matches!(
            store.link_control(Uuid::new_v4(), control_id),
            Err(EngineError::RiskNotFound(_))
        ));
        assert!(matches!(
            store.link_control(risk_id, Uuid::new_v4()),
            Err(EngineError::ControlNotFound(_))
        ));
    }

    #[test]
    fn test_write_link_residuals_covers_every_link() {
        let store = MemoryStore::new();
        let risk_id = store.upsert_risk(Risk::new("r", 4.0, 4.0, None));
        let c1 = store.upsert_control(Control::new("c1", 30, EffectTarget::Both));
        let c2 = store.upsert_control(Control::new("c2", 40, EffectTarget::Impact));
        store.link_control(risk_id, c1).unwrap();
        store.link_control(risk_id, c2).unwrap();

        store.write_link_residuals(risk_id, 3.1);
        for link in store.links_for_risk(risk_id) {
            assert_eq!(link.residual_risk, 3.1);
        }
    }

    #[test]
    fn test_soft_delete_keeps_record() {
        let store = MemoryStore::new();
        let id = store.upsert_risk(Risk::new("r", 2.0, 2.0, None));
        store.delete_risk(id);
        assert!(store.risk(id).map(|r| r.deleted).unwrap_or(false));
    }
}
