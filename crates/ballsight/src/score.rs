//! Candidate records and composite scoring.

use imageproc::point::Point;

use crate::detector::config::{CoverageParams, ScoreParams};
use crate::metrics::RadialSymmetry;

/// Radial-symmetry numbers kept on a candidate (visualization stripped).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub(crate) struct RadialStats {
    pub score: f32,
    pub coverage: f32,
    pub edge_total: usize,
    pub ring_area: usize,
}

impl From<&RadialSymmetry> for RadialStats {
    fn from(s: &RadialSymmetry) -> Self {
        Self {
            score: s.score,
            coverage: s.coverage,
            edge_total: s.edge_total,
            ring_area: s.ring_area,
        }
    }
}

/// One scored detection candidate (whole contour or split half).
///
/// Every metric is explicit; ranking code never reaches into dynamic
/// storage. Lifetime is one `analyze` call.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub cx: f32,
    pub cy: f32,
    pub r: f32,
    pub area: f32,
    pub circularity: f32,
    /// Disc mask-coverage for split halves, contour fill ratio otherwise.
    pub fill: f32,
    pub ring_density: f32,
    /// Both strict shape thresholds passed.
    pub strict: bool,
    /// Composite score; see [`composite_score`].
    pub score: f32,
    pub v_med: f32,
    pub sat_cov: f32,
    pub hue_cov: f32,
    pub inner_cov: f32,
    /// Produced by the peanut split.
    pub from_split: bool,
    /// Source contour boundary, when one exists.
    pub points: Option<Vec<Point<i32>>>,
}

/// Composite candidate score.
///
/// Area dominates; circularity and fill modulate it softly (offset keeps
/// near-threshold blobs competitive), a strict-pass bonus rewards clean
/// shapes, and brightness/saturation factors push reflections down without
/// hard-rejecting blurred balls.
pub(crate) fn composite_score(
    area: f32,
    circularity: f32,
    fill: f32,
    strict: bool,
    v_med: f32,
    sat_cov: f32,
    coverage: &CoverageParams,
    score_cfg: &ScoreParams,
) -> f32 {
    let mut score = area * (score_cfg.base_offset + circularity) * (score_cfg.base_offset + fill);
    if strict {
        score *= score_cfg.strict_bonus;
    }

    if v_med < coverage.min_v_median {
        score *= score_cfg.dark_penalty;
    } else {
        let span = (255.0 - coverage.min_v_median).max(1e-6);
        let margin = ((v_med - coverage.min_v_median) / span).min(1.0);
        score *= 1.0 + score_cfg.v_boost_span * margin;
    }

    if sat_cov < coverage.min_solid_sat_coverage {
        score *= score_cfg.low_sat_penalty;
    } else {
        let span = (1.0 - coverage.min_solid_sat_coverage).max(1e-6);
        let margin = ((sat_cov - coverage.min_solid_sat_coverage) / span).min(1.0);
        score *= 1.0 + score_cfg.sat_boost_span * margin;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_with(v_med: f32, sat_cov: f32, strict: bool) -> f32 {
        composite_score(
            1000.0,
            0.8,
            0.8,
            strict,
            v_med,
            sat_cov,
            &CoverageParams::default(),
            &ScoreParams::default(),
        )
    }

    #[test]
    fn strict_bonus_multiplies() {
        let loose = score_with(150.0, 0.5, false);
        let strict = score_with(150.0, 0.5, true);
        assert!((strict / loose - 1.35).abs() < 1e-4);
    }

    #[test]
    fn dark_candidates_are_penalized_hard() {
        let bright = score_with(150.0, 0.5, true);
        let dark = score_with(80.0, 0.5, true);
        assert!(dark < bright * 0.35);
    }

    #[test]
    fn brightness_boost_saturates_at_full_scale() {
        let at_floor = score_with(100.0, 0.5, true);
        let full = score_with(255.0, 0.5, true);
        assert!((full / at_floor - 1.35).abs() < 1e-3);
    }

    #[test]
    fn low_saturation_is_penalized() {
        let solid = score_with(150.0, 0.6, true);
        let washed = score_with(150.0, 0.1, true);
        assert!(washed < solid * 0.4);
    }
}
