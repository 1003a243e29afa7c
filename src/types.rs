//! Domain model for the risk engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lower bound of the risk factor scale.
pub const RISK_SCALE_MIN: f64 = 0.1;
/// Upper bound of the risk factor scale.
pub const RISK_SCALE_MAX: f64 = 5.0;

/// Round to one decimal place, the resolution of every exposed risk figure.
#[inline]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Clamp a factor onto the [0.1, 5.0] scale.
#[inline]
pub fn clamp_scale(value: f64) -> f64 {
    value.clamp(RISK_SCALE_MIN, RISK_SCALE_MAX)
}

/// Which residual component a control reduces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectTarget {
    Probability,
    Impact,
    Both,
}

impl EffectTarget {
    /// Whether a control with this target reduces residual probability
    pub fn reduces_probability(self) -> bool {
        matches!(self, EffectTarget::Probability | EffectTarget::Both)
    }

    /// Whether a control with this target reduces residual impact
    pub fn reduces_impact(self) -> bool {
        matches!(self, EffectTarget::Impact | EffectTarget::Both)
    }
}

/// Level of the three-tier organizational hierarchy, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrgLevel {
    Unit,
    Group,
    Division,
}

impl OrgLevel {
    /// All three levels, the default request scope
    pub const ALL: [OrgLevel; 3] = [OrgLevel::Unit, OrgLevel::Group, OrgLevel::Division];
}

/// Direct attachment of a risk to one organizational node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAttachment {
    pub level: OrgLevel,
    pub node_id: Uuid,
}

/// Classified severity of a risk figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Classify a risk figure against the configured thresholds
    pub fn classify(value: f64, thresholds: &LevelThresholds) -> Self {
        if value <= thresholds.low_max {
            RiskLevel::Low
        } else if value <= thresholds.medium_max {
            RiskLevel::Medium
        } else if value <= thresholds.high_max {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    /// Display label for dashboards
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// A risk record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub id: Uuid,
    pub name: String,
    /// Likelihood factor on the [0.1, 5.0] scale
    pub probability: f64,
    /// Impact factor on the [0.1, 5.0] scale
    pub impact: f64,
    /// probability x impact, before mitigation
    pub inherent_risk: f64,
    /// Direct attachment to at most one organizational node
    pub attachment: Option<OrgAttachment>,
    /// Soft-delete flag; deleted risks never aggregate
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Risk {
    /// Create a risk, clamping out-of-range factors onto the scale
    pub fn new(name: &str, probability: f64, impact: f64, attachment: Option<OrgAttachment>) -> Self {
        let id = Uuid::new_v4();
        let (probability, impact) = clamp_factors(id, probability, impact);
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            probability,
            impact,
            inherent_risk: round1(probability * impact),
            attachment,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-score the risk with new factor inputs
    pub fn rescore(&mut self, probability: f64, impact: f64) {
        let (probability, impact) = clamp_factors(self.id, probability, impact);
        self.probability = probability;
        self.impact = impact;
        self.inherent_risk = round1(probability * impact);
        self.updated_at = Utc::now();
    }
}

fn clamp_factors(id: Uuid, probability: f64, impact: f64) -> (f64, f64) {
    if !(RISK_SCALE_MIN..=RISK_SCALE_MAX).contains(&probability)
        || !(RISK_SCALE_MIN..=RISK_SCALE_MAX).contains(&impact)
    {
        tracing::warn!(
            risk_id = %id,
            probability,
            impact,
            "risk factors outside [{RISK_SCALE_MIN}, {RISK_SCALE_MAX}], clamping"
        );
    }
    (clamp_scale(probability), clamp_scale(impact))
}

/// A mitigating control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    pub id: Uuid,
    pub name: String,
    /// Effectiveness percent in [0, 100]; a configurable system-wide
    /// ceiling may cap it further at calculation time
    pub effectiveness: u8,
    pub effect_target: EffectTarget,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Control {
    /// Create a control, clamping effectiveness into [0, 100]
    pub fn new(name: &str, effectiveness: u8, effect_target: EffectTarget) -> Self {
        let id = Uuid::new_v4();
        if effectiveness > 100 {
            tracing::warn!(control_id = %id, effectiveness, "effectiveness above 100%, clamping");
        }
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            effectiveness: effectiveness.min(100),
            effect_target,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Many-to-many association between a risk and a control.
///
/// `residual_risk` is a denormalized copy of the owning risk's residual
/// figure, written back by the engine on every recalculation. Every link of
/// the same risk carries the same number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskControlLink {
    pub id: Uuid,
    pub risk_id: Uuid,
    pub control_id: Uuid,
    pub residual_risk: f64,
}

/// Leaf node of the organizational hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnit {
    pub id: Uuid,
    pub name: String,
    pub group_id: Option<Uuid>,
    pub deleted: bool,
}

/// Middle node; owns zero or more units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgGroup {
    pub id: Uuid,
    pub name: String,
    pub division_id: Option<Uuid>,
    pub deleted: bool,
}

/// Top node; owns zero or more groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDivision {
    pub id: Uuid,
    pub name: String,
    pub deleted: bool,
}

/// Validation state of a risk-to-organizational-unit association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Validated,
    Pending,
    Rejected,
}

impl ValidationStatus {
    /// Parse the status string of the external validation collection;
    /// unknown values read as Pending
    pub fn parse(s: &str) -> Self {
        match s {
            "validated" => ValidationStatus::Validated,
            "rejected" => ValidationStatus::Rejected,
            _ => ValidationStatus::Pending,
        }
    }
}

/// Per-risk validation record from the external collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub risk_id: Uuid,
    pub status: ValidationStatus,
}

/// Residual figures of one risk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualRisk {
    pub probability: f64,
    pub impact: f64,
    pub risk: f64,
}

/// Aggregated figures of one organizational node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub inherent_risk: f64,
    pub residual_risk: f64,
    pub risk_count: usize,
    /// Display label for the residual figure; only set by the validated
    /// dashboard variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level_label: Option<String>,
}

/// Rollup result: node summaries per requested hierarchy level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRiskLevels {
    pub divisions: HashMap<Uuid, NodeSummary>,
    pub groups: HashMap<Uuid, NodeSummary>,
    pub units: HashMap<Uuid, NodeSummary>,
}

/// Count of risks per classified residual level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLevelSummary {
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

/// Risk-level classification thresholds; values above `high_max` are critical
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub low_max: f64,
    pub medium_max: f64,
    pub high_max: f64,
}

impl LevelThresholds {
    /// Thresholds must be strictly increasing to partition the scale
    pub fn is_valid(&self) -> bool {
        self.low_max < self.medium_max && self.medium_max < self.high_max
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self { low_max: 6.0, medium_max: 12.0, high_max: 19.0 }
    }
}

/// Per-level weights for the weighted aggregation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelWeights {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl LevelWeights {
    /// Weight of one classified level
    pub fn weight_for(&self, level: RiskLevel) -> u32 {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

impl Default for LevelWeights {
    fn default() -> Self {
        Self { low: 1, medium: 2, high: 3, critical: 4 }
    }
}
