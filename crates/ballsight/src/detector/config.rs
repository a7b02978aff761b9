//! Detection configuration.
//!
//! All tunables are calibrated defaults recorded from live footage of an
//! orange/red ball on dark reflective wood; they are preserved verbatim as
//! named, overridable fields rather than re-derived.

use std::path::PathBuf;

/// Color gate thresholds (Lab a-channel + HSV).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColorGateParams {
    /// Per-frame percentile of the Lab a-channel used as an adaptive floor.
    pub a_percentile: f32,
    /// Absolute minimum Lab a-channel threshold (8-bit offset units).
    pub a_min: u8,
    /// Minimum HSV saturation.
    pub s_min: u8,
    /// Minimum HSV value.
    pub v_min: u8,
    /// Enable the hue-range gate; when off, only S/V thresholds apply.
    pub hue_enabled: bool,
    /// Upper bound of the low red hue band (H in [0, 180)).
    pub h_red_max: u8,
    /// Lower bound of the wrap-around red hue band.
    pub h_red_min2: u8,
    /// Lower bound of the orange hue band.
    pub h_orange_min: u8,
    /// Upper bound of the orange hue band.
    pub h_orange_max: u8,
}

impl Default for ColorGateParams {
    fn default() -> Self {
        Self {
            a_percentile: 97.0,
            a_min: 135,
            s_min: 60,
            v_min: 40,
            hue_enabled: true,
            h_red_max: 12,
            h_red_min2: 155,
            h_orange_min: 6,
            h_orange_max: 40,
        }
    }
}

/// Candidate shape gating.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ShapeGateParams {
    /// Minimum contour area (pixels²).
    pub min_area: f32,
    /// Maximum contour area as a fraction of the frame area.
    pub max_area_ratio: f32,
    /// Strict circularity threshold.
    pub min_circularity: f32,
    /// Strict fill-ratio threshold.
    pub min_fill: f32,
    /// Minimum enclosing-circle radius (pixels).
    pub min_radius: f32,
    /// Maximum radius as a fraction of `min(H, W)`.
    pub max_radius_ratio: f32,
    /// Loose circularity floor; a peanut-shaped ball+reflection blob fails
    /// the strict threshold but must still clear this one.
    pub loose_circularity: f32,
    /// Loose fill-ratio floor.
    pub loose_fill: f32,
}

impl Default for ShapeGateParams {
    fn default() -> Self {
        Self {
            min_area: 500.0,
            max_area_ratio: 0.15,
            min_circularity: 0.48,
            min_fill: 0.45,
            min_radius: 10.0,
            max_radius_ratio: 0.40,
            loose_circularity: 0.30,
            loose_fill: 0.30,
        }
    }
}

/// Coverage floors and brightness thresholds used by scoring and the
/// confidence gate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CoverageParams {
    /// Inner-disc radius as a fraction of the candidate radius; all
    /// coverage/brightness metrics sample this disc.
    pub inner_ratio: f32,
    /// Minimum combined-mask coverage of the inner disc (non-strict
    /// candidates and the fallback path).
    pub min_inner_mask_coverage: f32,
    /// Ring-edge-density floor for strict candidates (diagnostics and the
    /// radial waiver only; the hard gate is retired).
    pub min_edge_ring_density: f32,
    /// Ring-edge-density floor for non-strict candidates and the fallback.
    pub min_edge_ring_density_non_strict: f32,
    /// Minimum hue-mask coverage of the inner disc.
    pub min_hue_coverage: f32,
    /// Minimum solid-saturation coverage (S and V above the gate minima).
    pub min_solid_sat_coverage: f32,
    /// Minimum bright-pixel coverage (V ≥ `v_strong`).
    pub min_v_coverage: f32,
    /// V level counted as "bright" by the V-coverage metric.
    pub v_strong: u8,
    /// V-median floor used by scoring and the confidence gate.
    pub min_v_median: f32,
    /// V-median floor below which a candidate is discarded outright.
    pub min_v_median_candidate: f32,
    /// V-median above which the radial gate is waived.
    pub v_med_ring_waive: f32,
}

impl Default for CoverageParams {
    fn default() -> Self {
        Self {
            inner_ratio: 0.5,
            min_inner_mask_coverage: 0.35,
            min_edge_ring_density: 0.012,
            min_edge_ring_density_non_strict: 0.010,
            min_hue_coverage: 0.18,
            min_solid_sat_coverage: 0.22,
            min_v_coverage: 0.28,
            v_strong: 90,
            min_v_median: 100.0,
            min_v_median_candidate: 100.0,
            v_med_ring_waive: 180.0,
        }
    }
}

/// Radial edge-symmetry gate.
///
/// The operator-facing toggle flips `enabled`; the effective thresholds drop
/// to 0.0 while disabled so no other check is affected.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RadialGateParams {
    /// Gate toggle.
    pub enabled: bool,
    /// Minimum fraction of annulus edge gradients aligned with the radial
    /// direction.
    pub min_score: f32,
    /// Minimum sampled-edge coverage of the annulus.
    pub min_coverage: f32,
}

impl RadialGateParams {
    /// Effective score threshold (0.0 while the gate is disabled).
    pub fn effective_min_score(&self) -> f32 {
        if self.enabled {
            self.min_score
        } else {
            0.0
        }
    }

    /// Effective coverage threshold (0.0 while the gate is disabled).
    pub fn effective_min_coverage(&self) -> f32 {
        if self.enabled {
            self.min_coverage
        } else {
            0.0
        }
    }
}

impl Default for RadialGateParams {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 0.55,
            min_coverage: 0.15,
        }
    }
}

/// Peanut-split heuristic tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Distance-transform local maxima below this fraction of the global
    /// maximum are not collected.
    pub peak_collect_frac: f32,
    /// Fraction of the global maximum a peak must reach to support a split.
    pub peak_strong_frac: f32,
    /// Maximum horizontal peak separation as a fraction of the smaller peak
    /// radius (vertically stacked geometry).
    pub max_dx_ratio: f32,
    /// Minimum vertical peak separation as a fraction of the smaller peak
    /// radius.
    pub min_dy_ratio: f32,
    /// Half-length of the separating cut as a multiple of the smaller peak
    /// radius.
    pub cut_length_ratio: f32,
    /// Cut thickness as a fraction of the smaller peak radius.
    pub cut_thickness_ratio: f32,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            peak_collect_frac: 0.70,
            peak_strong_frac: 0.75,
            max_dx_ratio: 0.90,
            min_dy_ratio: 0.50,
            cut_length_ratio: 1.6,
            cut_thickness_ratio: 0.22,
        }
    }
}

/// Ball/reflection pair disambiguation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PairParams {
    /// Maximum radius difference as a fraction of the smaller radius.
    pub max_dr_ratio: f32,
    /// Maximum horizontal offset as a fraction of the smaller radius.
    pub max_dx_ratio: f32,
    /// Minimum vertical offset as a fraction of the smaller radius.
    pub min_dy_ratio: f32,
    /// The upper candidate wins when its V-median is within this many levels
    /// of the lower one.
    pub v_close_margin: f32,
    /// …or when its weighted metric reaches this fraction of the lower's.
    pub metric_ratio: f32,
    /// Weighted-metric coefficients: V/255, sat coverage, hue coverage,
    /// inner-mask coverage.
    pub metric_weights: [f32; 4],
}

impl Default for PairParams {
    fn default() -> Self {
        Self {
            max_dr_ratio: 0.35,
            max_dx_ratio: 0.85,
            min_dy_ratio: 0.45,
            v_close_margin: 12.0,
            metric_ratio: 0.90,
            metric_weights: [0.45, 0.25, 0.20, 0.10],
        }
    }
}

/// Composite-score shaping.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoreParams {
    /// Additive offset keeping circularity/fill factors away from zero.
    pub base_offset: f32,
    /// Multiplier applied when both strict shape thresholds pass.
    pub strict_bonus: f32,
    /// Multiplier applied when the V-median is below its floor.
    pub dark_penalty: f32,
    /// Maximum brightness boost above the V-median floor.
    pub v_boost_span: f32,
    /// Multiplier applied when saturation coverage is below its floor.
    pub low_sat_penalty: f32,
    /// Maximum saturation boost above the coverage floor.
    pub sat_boost_span: f32,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            base_offset: 0.25,
            strict_bonus: 1.35,
            dark_penalty: 0.30,
            v_boost_span: 0.35,
            low_sat_penalty: 0.35,
            sat_boost_span: 0.25,
        }
    }
}

/// Hough-circle refinement bounds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RefineParams {
    /// Lower Hough radius bound as a fraction of the seed radius.
    pub radius_scale_min: f32,
    /// Upper Hough radius bound as a fraction of the seed radius.
    pub radius_scale_max: f32,
    /// Absolute floor for the Hough radius search (pixels).
    pub radius_floor: f32,
    /// Canny high threshold for the edge map feeding the accumulator.
    pub canny_high: f32,
    /// Minimum accumulator votes for a circle.
    pub accumulator_threshold: u32,
    /// Maximum number of Hough circles considered per ROI.
    pub max_circles: usize,
    /// Seed displacement (fraction of the seed radius) within which circles
    /// compete on saturation/upper preference.
    pub candidate_displacement_ratio: f32,
    /// Seed displacement (fraction of the seed radius) beyond which the
    /// refined circle is rejected outright.
    pub accept_displacement_ratio: f32,
    /// Absolute displacement floor for both bounds (pixels).
    pub displacement_floor: f32,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            radius_scale_min: 0.70,
            radius_scale_max: 1.35,
            radius_floor: 8.0,
            canny_high: 120.0,
            accumulator_threshold: 24,
            max_circles: 8,
            candidate_displacement_ratio: 0.9,
            accept_displacement_ratio: 0.6,
            displacement_floor: 30.0,
        }
    }
}

/// Diagnostics-log side channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LogParams {
    /// Enable the per-call text log line.
    pub enabled: bool,
    /// Log file path; reset at detector construction.
    pub path: PathBuf,
    /// Size cap; the file is truncated once it grows past this.
    pub max_bytes: u64,
}

impl Default for LogParams {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("ballsight.log"),
            max_bytes: 1 << 20,
        }
    }
}

/// Top-level detection configuration.
///
/// Owned by a [`crate::Detector`]; mutable between calls through
/// [`crate::Detector::config_mut`], never mutated by the detector itself.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Color gate thresholds.
    pub color: ColorGateParams,
    /// Candidate shape bounds.
    pub shape: ShapeGateParams,
    /// Coverage floors and brightness thresholds.
    pub coverage: CoverageParams,
    /// Radial edge-symmetry gate.
    pub radial: RadialGateParams,
    /// Peanut-split heuristic.
    pub split: SplitParams,
    /// Ball/reflection pair disambiguation.
    pub pair: PairParams,
    /// Composite-score shaping.
    pub score: ScoreParams,
    /// Hough refinement bounds.
    pub refine: RefineParams,
    /// Accepted-radius inflation correcting systematic underestimation.
    pub radius_inflation: f32,
    /// Cap on the recorded reject list.
    pub debug_top_n_rejects: usize,
    /// Text-log side channel.
    pub log: LogParams,
}

impl DetectConfig {
    /// Maximum accepted enclosing-circle radius for a frame of the given
    /// dimensions.
    pub fn max_radius_px(&self, width: u32, height: u32) -> f32 {
        self.shape.max_radius_ratio * width.min(height) as f32
    }

    /// Maximum accepted blob area for a frame of the given dimensions.
    pub fn max_area_px(&self, width: u32, height: u32) -> f32 {
        self.shape.max_area_ratio * (width as f32 * height as f32)
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            color: ColorGateParams::default(),
            shape: ShapeGateParams::default(),
            coverage: CoverageParams::default(),
            radial: RadialGateParams::default(),
            split: SplitParams::default(),
            pair: PairParams::default(),
            score: ScoreParams::default(),
            refine: RefineParams::default(),
            radius_inflation: 1.10,
            debug_top_n_rejects: 6,
            log: LogParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_calibrated_values() {
        let cfg = DetectConfig::default();
        assert_eq!(cfg.color.a_min, 135);
        assert!((cfg.color.a_percentile - 97.0).abs() < 1e-6);
        assert!((cfg.shape.min_area - 500.0).abs() < 1e-6);
        assert!((cfg.shape.min_radius - 10.0).abs() < 1e-6);
        assert!((cfg.coverage.min_v_median_candidate - 100.0).abs() < 1e-6);
        assert!((cfg.score.strict_bonus - 1.35).abs() < 1e-6);
        assert!((cfg.refine.radius_scale_min - 0.70).abs() < 1e-6);
        assert!((cfg.radius_inflation - 1.10).abs() < 1e-6);
        assert_eq!(cfg.debug_top_n_rejects, 6);
    }

    #[test]
    fn radial_toggle_zeroes_effective_thresholds_only() {
        let mut gate = RadialGateParams::default();
        assert!((gate.effective_min_score() - 0.55).abs() < 1e-6);
        gate.enabled = false;
        assert_eq!(gate.effective_min_score(), 0.0);
        assert_eq!(gate.effective_min_coverage(), 0.0);
        // Configured values survive the toggle round-trip.
        gate.enabled = true;
        assert!((gate.effective_min_score() - 0.55).abs() < 1e-6);
        assert!((gate.effective_min_coverage() - 0.15).abs() < 1e-6);
    }

    #[test]
    fn max_bounds_scale_with_frame() {
        let cfg = DetectConfig::default();
        assert!((cfg.max_radius_px(640, 480) - 192.0).abs() < 1e-3);
        assert!((cfg.max_area_px(640, 480) - 46080.0).abs() < 1e-3);
    }
}
