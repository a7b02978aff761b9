//! Local Hough-circle refinement around a coarse detection.

use image::GrayImage;

use crate::detector::config::{CoverageParams, RefineParams};
use crate::hough::{hough_circles, HoughCircle, HoughParams};
use crate::metrics::disc_sat_coverage;

/// Per-call refinement diagnostics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RefineDebug {
    /// A refinement pass ran for this frame.
    pub attempted: bool,
    /// It produced an accepted circle.
    pub ok: bool,
    /// ROI bounds `[x0, y0, x1, y1]`.
    pub roi: Option<[u32; 4]>,
    /// Number of Hough circles returned.
    pub hough_count: usize,
    /// Displacement of the chosen circle from the seed (pixels).
    pub best_displacement: Option<f32>,
    /// Saturation coverage of the chosen circle's inner disc.
    pub sat_cov: Option<f32>,
    /// `"upper"` when the saturation/upper preference ran, `"closest"` when
    /// only the distance fallback applied.
    pub selection: Option<&'static str>,
    /// Solid-saturation candidates existed within the displacement band.
    pub solid_preferred: bool,
    /// Canny edge map of the ROI, for the mosaic inset.
    #[serde(skip)]
    pub roi_edges: Option<GrayImage>,
}

/// Refine a coarse circle against image edges.
///
/// Crops a padded ROI and runs a radius-banded Hough search. Circles near
/// the seed compete on solid saturation first (the reflection below the
/// ball is washed out), then on upper-most position, then on seed
/// proximity. Returns `None` — keeping the coarse estimate — when nothing
/// acceptable is found or the winner sits too far from the seed.
pub(crate) fn refine_circle(
    gray: &GrayImage,
    s_plane: &GrayImage,
    v_plane: &GrayImage,
    cx: f32,
    cy: f32,
    r: f32,
    cfg: &RefineParams,
    coverage: &CoverageParams,
    s_min: u8,
    v_min: u8,
) -> (Option<(f32, f32, f32)>, RefineDebug) {
    let mut debug = RefineDebug {
        attempted: true,
        ..Default::default()
    };
    let (w, h) = gray.dimensions();
    let pad = ((r * 1.6).round() as i64).max(20);
    let cx_i = cx.round() as i64;
    let cy_i = cy.round() as i64;
    let x0 = (cx_i - pad).max(0);
    let y0 = (cy_i - pad).max(0);
    let x1 = (cx_i + pad).min(w as i64);
    let y1 = (cy_i + pad).min(h as i64);
    if x1 <= x0 || y1 <= y0 {
        return (None, debug);
    }
    debug.roi = Some([x0 as u32, y0 as u32, x1 as u32, y1 as u32]);

    let cw = (x1 - x0) as u32;
    let ch = (y1 - y0) as u32;
    let mut roi = GrayImage::new(cw, ch);
    for y in 0..ch {
        for x in 0..cw {
            roi.put_pixel(x, y, *gray.get_pixel(x0 as u32 + x, y0 as u32 + y));
        }
    }
    // No pre-blur: the Hough stage's canny smooths internally.
    debug.roi_edges = Some(imageproc::edges::canny(
        &roi,
        cfg.canny_high * 0.5,
        cfg.canny_high,
    ));

    let r_min = (r * cfg.radius_scale_min).max(cfg.radius_floor);
    let r_max = r * cfg.radius_scale_max;
    let circles = hough_circles(
        &roi,
        &HoughParams {
            r_min,
            r_max,
            min_dist: r.max(20.0),
            canny_high: cfg.canny_high,
            accumulator_threshold: cfg.accumulator_threshold,
            max_circles: cfg.max_circles,
        },
    );
    debug.hough_count = circles.len();
    if circles.is_empty() {
        return (None, debug);
    }

    let target = (cx - x0 as f32, cy - y0 as f32);
    let dist_to_seed = |c: &HoughCircle| {
        let dx = c.x - target.0;
        let dy = c.y - target.1;
        (dx * dx + dy * dy).sqrt()
    };
    let max_d_allow = (cfg.candidate_displacement_ratio * r).max(cfg.displacement_floor);

    // Candidates near the seed, with inner-disc saturation in frame coords.
    let mut near: Vec<(HoughCircle, f32, f32)> = Vec::new();
    for c in &circles {
        let d = dist_to_seed(c);
        if d <= max_d_allow {
            let sat = disc_sat_coverage(
                s_plane,
                v_plane,
                s_min,
                v_min,
                c.x + x0 as f32,
                c.y + y0 as f32,
                (c.r * 0.70).round(),
            )
            .unwrap_or(0.0);
            near.push((*c, d, sat));
        }
    }

    let chosen: Option<(HoughCircle, f32, f32)> = if !near.is_empty() {
        let solid: Vec<&(HoughCircle, f32, f32)> = near
            .iter()
            .filter(|(_, _, sat)| *sat >= coverage.min_solid_sat_coverage)
            .collect();
        debug.solid_preferred = !solid.is_empty();
        debug.selection = Some("upper");
        let pool: Vec<&(HoughCircle, f32, f32)> = if solid.is_empty() {
            near.iter().collect()
        } else {
            solid
        };
        let mut best: Option<&(HoughCircle, f32, f32)> = None;
        for item in pool {
            let replace = match best {
                None => true,
                Some(b) => {
                    item.0.y < b.0.y || (item.0.y == b.0.y && item.1 < b.1)
                }
            };
            if replace {
                best = Some(item);
            }
        }
        best.copied()
    } else {
        debug.selection = Some("closest");
        circles
            .iter()
            .map(|c| (*c, dist_to_seed(c), 0.0f32))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    };

    let (c, d, sat) = match chosen {
        Some(t) => t,
        None => return (None, debug),
    };
    debug.best_displacement = Some(d);
    debug.sat_cov = Some(sat);

    // The final acceptance band is tighter than the candidate band.
    if d > (cfg.accept_displacement_ratio * r).max(cfg.displacement_floor) {
        return (None, debug);
    }
    debug.ok = true;
    (Some((c.x + x0 as f32, c.y + y0 as f32, c.r)), debug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorPlanes;
    use crate::test_utils::{disc_frame, Disc};

    fn run(
        frame: &image::RgbImage,
        cx: f32,
        cy: f32,
        r: f32,
    ) -> (Option<(f32, f32, f32)>, RefineDebug) {
        let planes = ColorPlanes::compute(frame);
        refine_circle(
            &planes.gray,
            &planes.s,
            &planes.v,
            cx,
            cy,
            r,
            &RefineParams::default(),
            &CoverageParams::default(),
            60,
            40,
        )
    }

    #[test]
    fn locks_onto_a_clean_disc() {
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
        // Seed is deliberately offset and oversized.
        let (refined, debug) = run(&frame, 126.0, 95.0, 36.0);
        let (x, y, r) = refined.expect("refinement should succeed");
        assert!(debug.ok);
        assert!((x - 120.0).abs() <= 4.0, "x = {x}");
        assert!((y - 100.0).abs() <= 4.0, "y = {y}");
        assert!((r - 32.0).abs() <= 4.0, "r = {r}");
    }

    #[test]
    fn prefers_the_upper_of_two_circles() {
        // Ball and a same-size blob below; seed between them.
        let frame = disc_frame(
            240,
            320,
            [20, 20, 20],
            &[
                Disc {
                    cx: 120.0,
                    cy: 105.0,
                    r: 28.0,
                    color: [230, 30, 25],
                },
                Disc {
                    cx: 120.0,
                    cy: 160.0,
                    r: 28.0,
                    color: [210, 30, 25],
                },
            ],
        );
        let (refined, _) = run(&frame, 120.0, 130.0, 30.0);
        let (_, y, _) = refined.expect("refinement should succeed");
        assert!(y < 130.0, "should pick the upper circle, y = {y}");
    }

    #[test]
    fn empty_roi_fails_gracefully() {
        let frame = disc_frame(100, 100, [20, 20, 20], &[]);
        let (refined, debug) = run(&frame, 50.0, 50.0, 20.0);
        assert!(refined.is_none());
        assert!(debug.attempted);
        assert!(!debug.ok);
        assert_eq!(debug.hough_count, 0);
    }
}
