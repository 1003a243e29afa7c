//! Residual risk calculation.
//!
//! Controls are treated as independent chances of catching the risk: the
//! probability that every control fails at once is the product of the
//! individual failure probabilities, so each reduction target gets a factor
//! of `prod(1 - effectiveness/100)` over its qualifying controls.

use crate::types::{clamp_scale, round1, Control, ResidualRisk, Risk};

/// Compute the residual figures for one risk and its linked controls.
///
/// Inactive controls do not qualify. Effectiveness is clamped into
/// `[0, ceiling]` before use; stored data outside [0, 100] is a data error
/// that degrades to a clamp, never a failure. A risk with no qualifying
/// controls keeps residual == inherent.
pub fn compute_residual(risk: &Risk, controls: &[&Control], ceiling: u8) -> ResidualRisk {
    let mut factor_probability = 1.0;
    let mut factor_impact = 1.0;

    for control in controls {
        if !control.active {
            continue;
        }
        let effectiveness = control.effectiveness.min(100).min(ceiling);
        if effectiveness != control.effectiveness {
            tracing::debug!(
                control_id = %control.id,
                stored = control.effectiveness,
                applied = effectiveness,
                "control effectiveness capped"
            );
        }
        let failure = 1.0 - f64::from(effectiveness) / 100.0;
        if control.effect_target.reduces_probability() {
            factor_probability *= failure;
        }
        if control.effect_target.reduces_impact() {
            factor_impact *= failure;
        }
    }

    let probability = round1(clamp_scale(risk.probability * factor_probability));
    let impact = round1(clamp_scale(risk.impact * factor_impact));
    ResidualRisk { probability, impact, risk: round1(probability * impact) }
}
