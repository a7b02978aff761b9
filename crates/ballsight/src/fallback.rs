//! Distance-transform fallback for frames where no contour candidate
//! survives.

use image::Luma;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::color::ColorPlanes;
use crate::debug_dump::FallbackDebug;
use crate::detector::config::DetectConfig;
use crate::mask::ColorMasks;
use crate::metrics::{disc_mask_coverage, disc_v_median, ring_edge_density};
use crate::refine::{refine_circle, RefineDebug};
use crate::split::{distance_to_background, suppressed_peaks};

/// Strong-peak fraction of the global maximum; only near-equal peaks
/// compete for the upper preference.
const STRONG_PEAK_FRAC: f32 = 0.90;
/// Smallest credible fallback radius (pixels).
const MIN_EST_RADIUS: f32 = 8.0;
const MAX_PEAKS: usize = 6;

/// Attempt the last-resort distance-transform detection.
///
/// The global distance peak of the combined mask estimates center and
/// radius; among near-global peaks the upper-most wins (the reflection
/// prior). The estimate must pass component-area, coverage, ring-edge and
/// brightness validation and then survive Hough refinement — an unrefined
/// guess is never returned.
pub(crate) fn distance_fallback(
    planes: &ColorPlanes,
    masks: &ColorMasks,
    config: &DetectConfig,
) -> (Option<(f32, f32, f32, f32)>, Option<FallbackDebug>, Option<RefineDebug>) {
    let mask = &masks.combined;
    let (w, h) = mask.dimensions();
    let on_count = mask.as_raw().iter().filter(|&&p| p != 0).count();
    if (on_count as f32) < config.shape.min_area {
        return (None, None, None);
    }

    let mut dist = distance_to_background(mask);
    let global_max = dist.iter().cloned().fold(0.0f32, f32::max);
    if global_max <= 0.0 {
        return (None, None, None);
    }

    let peaks = suppressed_peaks(&mut dist, w as usize, h as usize, MAX_PEAKS);
    let peaks_n = peaks.len();
    let strong: Vec<_> = peaks
        .iter()
        .filter(|p| p.value >= STRONG_PEAK_FRAC * global_max)
        .collect();
    // Upper-most strong peak; peak order already favors value.
    let chosen = strong
        .iter()
        .min_by_key(|p| p.y)
        .copied()
        .copied()
        .unwrap_or(peaks[0]);

    let (cx, cy, est_r) = (chosen.x as f32, chosen.y as f32, chosen.value);
    let max_r = config.max_radius_px(w, h);
    let mut debug = FallbackDebug {
        method: "distance",
        center: [cx, cy],
        r_est: est_r,
        comp_area: 0.0,
        inner_cov: 0.0,
        ring_density: 0.0,
        v_med: 0.0,
        peaks_n,
        accepted: false,
        refine_failed: false,
    };
    if est_r < MIN_EST_RADIUS || est_r > max_r {
        return (None, Some(debug), None);
    }

    // Reject huge background blobs via the connected component under the peak.
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let label = labels.get_pixel(chosen.x as u32, chosen.y as u32)[0];
    if label == 0 {
        return (None, Some(debug), None);
    }
    let comp_area = labels.as_raw().iter().filter(|&&l| l == label).count() as f32;
    debug.comp_area = comp_area;
    if comp_area < config.shape.min_area || comp_area > config.max_area_px(w, h) {
        return (None, Some(debug), None);
    }

    let inner_r = est_r * config.coverage.inner_ratio;
    let inner_cov = disc_mask_coverage(mask, cx, cy, inner_r).unwrap_or(0.0);
    debug.inner_cov = inner_cov;
    if inner_cov < config.coverage.min_inner_mask_coverage {
        return (None, Some(debug), None);
    }

    let ring_den = ring_edge_density(&planes.gray, cx, cy, est_r).unwrap_or(0.0);
    debug.ring_density = ring_den;
    if ring_den < config.coverage.min_edge_ring_density_non_strict {
        return (None, Some(debug), None);
    }

    // Brightness: a dark reflection must not come back through the fallback.
    let v_med = disc_v_median(&planes.v, Some(mask), cx, cy, inner_r).unwrap_or(0.0);
    debug.v_med = v_med;
    if v_med < config.coverage.min_v_median_candidate {
        return (None, Some(debug), None);
    }

    let (refined, refine_debug) = refine_circle(
        &planes.gray,
        &planes.s,
        &planes.v,
        cx,
        cy,
        est_r,
        &config.refine,
        &config.coverage,
        config.color.s_min,
        config.color.v_min,
    );
    match refined {
        Some((rx, ry, rr)) if rr >= config.shape.min_radius && rr <= max_r => {
            debug.accepted = true;
            (Some((rx, ry, rr, comp_area)), Some(debug), Some(refine_debug))
        }
        _ => {
            debug.refine_failed = true;
            (None, Some(debug), Some(refine_debug))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::build_masks;
    use crate::test_utils::{disc_frame, Disc};

    fn run(frame: &image::RgbImage) -> (Option<(f32, f32, f32, f32)>, Option<FallbackDebug>) {
        let planes = ColorPlanes::compute(frame);
        let (masks, _) = build_masks(&planes, &DetectConfig::default().color);
        let (hit, dbg, _) = distance_fallback(&planes, &masks, &DetectConfig::default());
        (hit, dbg)
    }

    #[test]
    fn bright_disc_is_recovered() {
        let frame = disc_frame(
            240,
            200,
            [20, 20, 20],
            &[Disc {
                cx: 120.0,
                cy: 100.0,
                r: 32.0,
                color: [230, 30, 25],
            }],
        );
        let (hit, dbg) = run(&frame);
        let (x, y, r, _) = hit.expect("fallback should accept a clean disc");
        assert!(dbg.unwrap().accepted);
        assert!((x - 120.0).abs() <= 4.0);
        assert!((y - 100.0).abs() <= 4.0);
        assert!((r - 32.0).abs() <= 6.0, "r = {r}");
    }

    #[test]
    fn empty_mask_returns_nothing() {
        let frame = disc_frame(160, 120, [20, 20, 20], &[]);
        let (hit, dbg) = run(&frame);
        assert!(hit.is_none());
        assert!(dbg.is_none());
    }

    #[test]
    fn dark_disc_is_rejected_on_brightness() {
        // Passes the color gate but sits below the V-median floor.
        let frame = disc_frame(
            240,
            200,
            [20, 20, 20],
            &[Disc {
                cx: 120.0,
                cy: 100.0,
                r: 32.0,
                color: [90, 12, 10],
            }],
        );
        let (hit, dbg) = run(&frame);
        assert!(hit.is_none());
        let dbg = dbg.expect("validation should have run");
        assert!(dbg.v_med < 100.0, "v_med = {}", dbg.v_med);
        assert!(!dbg.accepted);
    }

    #[test]
    fn upper_peak_wins_for_twin_blobs() {
        // Two separated equal discs: distinct strong peaks, prefer upper.
        let frame = disc_frame(
            240,
            320,
            [20, 20, 20],
            &[
                Disc {
                    cx: 120.0,
                    cy: 90.0,
                    r: 30.0,
                    color: [230, 30, 25],
                },
                Disc {
                    cx: 120.0,
                    cy: 220.0,
                    r: 30.0,
                    color: [230, 30, 25],
                },
            ],
        );
        let (hit, _) = run(&frame);
        let (_, y, _, _) = hit.expect("fallback should accept");
        assert!(y < 150.0, "upper blob should win, y = {y}");
    }
}
