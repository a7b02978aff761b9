//! Per-call diagnostics record.
//!
//! Reuses production structures where possible; everything numeric is
//! serializable for offline inspection, while image panes are kept
//! in-memory only. The record is fully overwritten on every `analyze` call.

use image::{GrayImage, RgbImage};
use serde::Serialize;

use crate::detector::config::DetectConfig;
pub use crate::metrics::RoiStats;
pub use crate::refine::RefineDebug;
pub use crate::select::SelectionNotes;

/// Why a contour (or split half) was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Area out of bounds.
    Area,
    /// Degenerate perimeter.
    Peri,
    /// Enclosing-circle radius out of bounds.
    Radius,
    /// Below the loose circularity floor.
    Circ,
    /// Below the loose fill floor.
    Fill,
    /// V-median below the candidate floor.
    VMed,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::Area => "area",
            RejectReason::Peri => "peri",
            RejectReason::Radius => "radius",
            RejectReason::Circ => "circ",
            RejectReason::Fill => "fill",
            RejectReason::VMed => "v-med",
        };
        f.write_str(s)
    }
}

/// One rejected blob with whatever metrics were known at rejection time.
#[derive(Debug, Clone, Serialize)]
pub struct RejectRecord {
    pub reason: RejectReason,
    pub area: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circularity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v_med: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cx: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cy: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_density: Option<f32>,
}

impl RejectRecord {
    pub(crate) fn new(reason: RejectReason, area: f32) -> Self {
        Self {
            reason,
            area,
            circularity: None,
            fill: None,
            r: None,
            v_med: None,
            cx: None,
            cy: None,
            ring_density: None,
        }
    }
}

/// Snapshot of the thresholds in force plus the per-frame adaptive values.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdsSnapshot {
    pub a_percentile: f32,
    pub a_min: u8,
    /// Applied a-threshold: `max(a_min, percentile value)`.
    pub a_thr: u8,
    /// The percentile value measured on this frame.
    pub a_p: f32,
    pub s_min: u8,
    pub v_min: u8,
    pub hue_enabled: bool,
    pub h_red_max: u8,
    pub h_red_min2: u8,
    pub h_orange_min: u8,
    pub h_orange_max: u8,
    pub min_solid_sat_coverage: f32,
    pub min_v_coverage: f32,
    pub min_v_median: f32,
    pub v_strong: u8,
    pub min_radial_score: f32,
    pub min_radial_coverage: f32,
    pub radial_gate_enabled: bool,
}

impl ThresholdsSnapshot {
    pub(crate) fn from_config(config: &DetectConfig, a_thr: u8, a_p: f32) -> Self {
        Self {
            a_percentile: config.color.a_percentile,
            a_min: config.color.a_min,
            a_thr,
            a_p,
            s_min: config.color.s_min,
            v_min: config.color.v_min,
            hue_enabled: config.color.hue_enabled,
            h_red_max: config.color.h_red_max,
            h_red_min2: config.color.h_red_min2,
            h_orange_min: config.color.h_orange_min,
            h_orange_max: config.color.h_orange_max,
            min_solid_sat_coverage: config.coverage.min_solid_sat_coverage,
            min_v_coverage: config.coverage.min_v_coverage,
            min_v_median: config.coverage.min_v_median,
            v_strong: config.coverage.v_strong,
            min_radial_score: config.radial.effective_min_score(),
            min_radial_coverage: config.radial.effective_min_coverage(),
            radial_gate_enabled: config.radial.enabled,
        }
    }
}

impl Default for ThresholdsSnapshot {
    fn default() -> Self {
        Self::from_config(&DetectConfig::default(), 0, 0.0)
    }
}

/// Per-stage counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageCounts {
    /// Contours traced from the cleaned mask.
    pub contours_total: usize,
    /// Candidates that reached scoring.
    pub considered: usize,
    /// Candidates passing both strict shape thresholds.
    pub strict: usize,
}

/// Metrics of the winning candidate (zeros when none existed).
#[derive(Debug, Clone, Default, Serialize)]
pub struct BestMetrics {
    pub score: f32,
    /// Score modulated by radial evidence, diagnostics only.
    pub score_adj: f32,
    pub area: f32,
    pub circularity: f32,
    pub fill: f32,
    pub v_med: f32,
    pub v_cov: f32,
    pub sat_cov: f32,
    pub hue_cov: f32,
    pub inner_cov: f32,
    pub ring_density: f32,
    pub radial_score: f32,
    pub radial_cov: f32,
    pub radial_edge_total: usize,
    pub radial_ring_area: usize,
}

/// Fallback-path diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackDebug {
    pub method: &'static str,
    pub center: [f32; 2],
    pub r_est: f32,
    pub comp_area: f32,
    pub inner_cov: f32,
    pub ring_density: f32,
    pub v_med: f32,
    pub peaks_n: usize,
    pub accepted: bool,
    pub refine_failed: bool,
}

/// One exported ranked-candidate mask.
#[derive(Debug, Clone, Serialize)]
pub struct RankedMask {
    pub rank: usize,
    pub v_med: f32,
    pub score: f32,
    pub area: f32,
    #[serde(skip)]
    pub mask: GrayImage,
}

/// The gate masks plus derived candidate masks, for preview/histogram views.
#[derive(Debug, Clone, Serialize)]
pub struct MaskSet {
    #[serde(skip)]
    pub redness: GrayImage,
    #[serde(skip)]
    pub hue: GrayImage,
    #[serde(skip)]
    pub combined: GrayImage,
    /// Union of the selection pool's circles.
    #[serde(skip)]
    pub refined: Option<GrayImage>,
    /// Top-3 candidate masks, best first.
    pub ranked: Vec<RankedMask>,
}

impl Default for MaskSet {
    fn default() -> Self {
        Self {
            redness: GrayImage::new(0, 0),
            hue: GrayImage::new(0, 0),
            combined: GrayImage::new(0, 0),
            refined: None,
            ranked: Vec::new(),
        }
    }
}

/// The complete last-run diagnostics record.
///
/// Always populated by `analyze`, success or failure; valid until the next
/// call.
#[derive(Debug, Clone, Serialize)]
pub struct DebugRecord {
    pub thresholds: ThresholdsSnapshot,
    pub counts: StageCounts,
    pub best: BestMetrics,
    /// Bounded reject list, largest area first.
    pub rejects: Vec<RejectRecord>,
    pub selection: SelectionNotes,
    pub refine: RefineDebug,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackDebug>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi_stats: Option<RoiStats>,
    pub masks: MaskSet,
    /// Rendered multi-line summary for text panes.
    pub summary: String,
    /// Radial-symmetry visualization of the chosen circle.
    #[serde(skip)]
    pub radial_vis: Option<RgbImage>,
    /// Visualization mosaic.
    #[serde(skip)]
    pub mosaic: Option<RgbImage>,
}

impl Default for DebugRecord {
    fn default() -> Self {
        Self {
            thresholds: ThresholdsSnapshot::default(),
            counts: StageCounts::default(),
            best: BestMetrics::default(),
            rejects: Vec::new(),
            selection: SelectionNotes::default(),
            refine: RefineDebug::default(),
            fallback: None,
            roi_stats: None,
            masks: MaskSet::default(),
            summary: String::new(),
            radial_vis: None,
            mosaic: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reasons_render_like_the_log() {
        assert_eq!(RejectReason::VMed.to_string(), "v-med");
        assert_eq!(RejectReason::Area.to_string(), "area");
        assert_eq!(RejectReason::Radius.to_string(), "radius");
    }

    #[test]
    fn snapshot_reflects_the_toggle() {
        let mut cfg = DetectConfig::default();
        cfg.radial.enabled = false;
        let snap = ThresholdsSnapshot::from_config(&cfg, 140, 139.0);
        assert_eq!(snap.min_radial_score, 0.0);
        assert!(!snap.radial_gate_enabled);
        assert_eq!(snap.a_thr, 140);
    }

    #[test]
    fn record_serializes_without_image_payloads() {
        let record = DebugRecord::default();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("thresholds"));
        assert!(!json.contains("mosaic"));
    }
}
