//! Final accept/reject decision for the chosen candidate.

use crate::debug_dump::BestMetrics;
use crate::detector::config::{CoverageParams, RadialGateParams};

/// Everything the gate looks at, gathered after refinement.
pub(crate) struct ConfidenceInput<'a> {
    pub best: &'a BestMetrics,
    pub strict: bool,
    pub refine_ok: bool,
}

/// Evaluate the confidence gate; `Err` carries the reject reason string
/// used by diagnostics and the log.
pub(crate) fn evaluate(
    input: &ConfidenceInput<'_>,
    coverage: &CoverageParams,
    radial: &RadialGateParams,
) -> Result<(), String> {
    let b = input.best;

    if !input.strict && b.inner_cov < coverage.min_inner_mask_coverage {
        return Err(format!(
            "low-inner-cov (cov<{})",
            coverage.min_inner_mask_coverage
        ));
    }
    if b.hue_cov < coverage.min_hue_coverage {
        return Err(format!("low-hue-cov (cov<{})", coverage.min_hue_coverage));
    }
    if b.v_med < coverage.min_v_median {
        return Err(format!("low-v-med (med<{})", coverage.min_v_median));
    }
    if b.sat_cov < coverage.min_solid_sat_coverage {
        return Err(format!(
            "low-sat-cov (cov<{})",
            coverage.min_solid_sat_coverage
        ));
    }

    // Radial edge symmetry: strict candidates only, and only while the
    // operator toggle is on. Waived when refinement already locked onto a
    // circle, when ring-edge evidence is strong, when color evidence is
    // overwhelming, or when the blob is bright enough that a reflection is
    // implausible.
    if radial.enabled && input.strict {
        let radial_weak = b.radial_score < radial.effective_min_score()
            && b.radial_cov < radial.effective_min_coverage();
        let ring_strong = b.ring_density >= coverage.min_edge_ring_density * 1.25;
        let color_waive = b.hue_cov >= 0.85 && b.inner_cov >= 0.75 && b.circularity >= 0.56;
        let bright_waive = b.v_med >= coverage.v_med_ring_waive;
        if radial_weak && !input.refine_ok && !ring_strong && !color_waive && !bright_waive {
            return Err(format!(
                "weak-radial (score<{} and cov<{})",
                radial.min_score, radial.min_coverage
            ));
        }
    }

    Ok(())
}
