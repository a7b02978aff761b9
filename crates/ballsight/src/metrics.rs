//! Per-candidate metric helpers.
//!
//! Every helper is a free function over explicit image planes and returns
//! `Option`: a degenerate input (tiny radius, empty ROI) yields `None` and
//! the call site decides the safe default. Nothing here can abort a frame.

use image::{GrayImage, Luma, RgbImage};

/// A disc clipped to the frame, in whole-pixel coordinates.
///
/// The radius is clamped to half of the clipped ROI's smaller side, matching
/// the gate calibration's rasterization.
struct DiscRoi {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    cx: i64,
    cy: i64,
    r: i64,
}

fn disc_roi(width: u32, height: u32, cx: f32, cy: f32, r: f32) -> Option<DiscRoi> {
    if !(r.is_finite() && cx.is_finite() && cy.is_finite()) || r <= 1.0 {
        return None;
    }
    let cx_i = cx.round() as i64;
    let cy_i = cy.round() as i64;
    let rr = r.round() as i64;
    if rr <= 1 {
        return None;
    }
    let x0 = (cx_i - rr).max(0);
    let y0 = (cy_i - rr).max(0);
    let x1 = (cx_i + rr + 1).min(width as i64);
    let y1 = (cy_i + rr + 1).min(height as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let sub_w = x1 - x0;
    let sub_h = y1 - y0;
    let r_clamped = rr.min(sub_w.min(sub_h) / 2).max(1);
    Some(DiscRoi {
        x0: x0 as u32,
        y0: y0 as u32,
        x1: x1 as u32,
        y1: y1 as u32,
        cx: cx_i,
        cy: cy_i,
        r: r_clamped,
    })
}

impl DiscRoi {
    /// Visit every pixel of the disc, passing frame coordinates.
    fn for_each(&self, mut f: impl FnMut(u32, u32)) {
        let r2 = self.r * self.r;
        for y in self.y0..self.y1 {
            let dy = y as i64 - self.cy;
            for x in self.x0..self.x1 {
                let dx = x as i64 - self.cx;
                if dx * dx + dy * dy <= r2 {
                    f(x, y);
                }
            }
        }
    }
}

/// Fraction of the disc covered by non-zero mask pixels.
pub(crate) fn disc_mask_coverage(mask: &GrayImage, cx: f32, cy: f32, r: f32) -> Option<f32> {
    let roi = disc_roi(mask.width(), mask.height(), cx, cy, r)?;
    let mut disc_area = 0u32;
    let mut covered = 0u32;
    roi.for_each(|x, y| {
        disc_area += 1;
        if mask.get_pixel(x, y)[0] != 0 {
            covered += 1;
        }
    });
    if disc_area <= 1 {
        return None;
    }
    Some(covered as f32 / disc_area as f32)
}

/// Fraction of the disc with `V ≥ v_strong`.
pub(crate) fn disc_v_coverage(
    v_plane: &GrayImage,
    v_strong: u8,
    cx: f32,
    cy: f32,
    r: f32,
) -> Option<f32> {
    let roi = disc_roi(v_plane.width(), v_plane.height(), cx, cy, r)?;
    let mut disc_area = 0u32;
    let mut covered = 0u32;
    roi.for_each(|x, y| {
        disc_area += 1;
        if v_plane.get_pixel(x, y)[0] >= v_strong {
            covered += 1;
        }
    });
    if disc_area <= 1 {
        return None;
    }
    Some(covered as f32 / disc_area as f32)
}

/// Fraction of the disc with solid color: `S ≥ s_min` and `V ≥ v_min`.
pub(crate) fn disc_sat_coverage(
    s_plane: &GrayImage,
    v_plane: &GrayImage,
    s_min: u8,
    v_min: u8,
    cx: f32,
    cy: f32,
    r: f32,
) -> Option<f32> {
    let roi = disc_roi(s_plane.width(), s_plane.height(), cx, cy, r)?;
    let mut disc_area = 0u32;
    let mut covered = 0u32;
    roi.for_each(|x, y| {
        disc_area += 1;
        if s_plane.get_pixel(x, y)[0] >= s_min && v_plane.get_pixel(x, y)[0] >= v_min {
            covered += 1;
        }
    });
    if disc_area <= 1 {
        return None;
    }
    Some(covered as f32 / disc_area as f32)
}

/// Median V inside the disc.
///
/// When `mask` is given and covers at least 15% of the disc, the median is
/// restricted to mask pixels; otherwise the whole disc counts. The
/// mask-restricted variant keeps the reading on the ball even when the disc
/// overlaps background.
pub(crate) fn disc_v_median(
    v_plane: &GrayImage,
    mask: Option<&GrayImage>,
    cx: f32,
    cy: f32,
    r: f32,
) -> Option<f32> {
    let roi = disc_roi(v_plane.width(), v_plane.height(), cx, cy, r)?;

    let mut disc_area = 0u32;
    let mut all_hist = [0u32; 256];
    let mut masked_hist = [0u32; 256];
    let mut masked_n = 0u32;
    roi.for_each(|x, y| {
        disc_area += 1;
        let v = v_plane.get_pixel(x, y)[0] as usize;
        all_hist[v] += 1;
        if let Some(m) = mask {
            if m.get_pixel(x, y)[0] != 0 {
                masked_hist[v] += 1;
                masked_n += 1;
            }
        }
    });
    if disc_area <= 1 {
        return None;
    }
    if mask.is_some() && masked_n as f32 >= disc_area as f32 * 0.15 {
        return Some(hist_median(&masked_hist, masked_n));
    }
    Some(hist_median(&all_hist, disc_area))
}

/// Exact median from a 256-bin histogram (mean of the two middles for even
/// counts).
fn hist_median(hist: &[u32; 256], n: u32) -> f32 {
    debug_assert!(n > 0);
    let lo_rank = (n - 1) / 2;
    let hi_rank = n / 2;
    let mut cum = 0u32;
    let mut lo = None;
    for (value, &count) in hist.iter().enumerate() {
        cum += count;
        if lo.is_none() && cum > lo_rank {
            lo = Some(value as f32);
        }
        if cum > hi_rank {
            let lo = lo.unwrap_or(value as f32);
            return (lo + value as f32) * 0.5;
        }
    }
    lo.unwrap_or(0.0)
}

const RING_INNER_FRAC: f32 = 0.78;
const RING_OUTER_FRAC: f32 = 1.18;
const RADIAL_INNER_FRAC: f32 = 0.85;
const RADIAL_OUTER_FRAC: f32 = 1.15;
const RADIAL_ALIGN_COS: f32 = 0.7;
/// Sigma matching the smoothing `canny` applies internally; the Sobel pass
/// for gradient directions runs on an equally smoothed crop.
const EDGE_BLUR_SIGMA: f32 = 1.4;
const CANNY_LOW: f32 = 60.0;
const CANNY_HIGH: f32 = 120.0;

/// Crop a padded square ROI around `(cx, cy)` from the gray plane.
///
/// Returns the crop plus its top-left corner in frame coordinates.
fn crop_gray(gray: &GrayImage, cx: i64, cy: i64, pad: i64) -> Option<(GrayImage, u32, u32)> {
    let (w, h) = gray.dimensions();
    let x0 = (cx - pad).max(0);
    let y0 = (cy - pad).max(0);
    let x1 = (cx + pad + 1).min(w as i64);
    let y1 = (cy + pad + 1).min(h as i64);
    if x1 <= x0 + 2 || y1 <= y0 + 2 {
        return None;
    }
    let cw = (x1 - x0) as u32;
    let ch = (y1 - y0) as u32;
    let mut out = GrayImage::new(cw, ch);
    for y in 0..ch {
        for x in 0..cw {
            out.put_pixel(x, y, *gray.get_pixel(x0 as u32 + x, y0 as u32 + y));
        }
    }
    Some((out, x0 as u32, y0 as u32))
}

/// Gaussian-blur a gray image through an f32 round-trip.
pub(crate) fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut f = image::ImageBuffer::<Luma<f32>, Vec<f32>>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            f.put_pixel(x, y, Luma([img.get_pixel(x, y)[0] as f32 / 255.0]));
        }
    }
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v = blurred.get_pixel(x, y)[0].clamp(0.0, 1.0);
            out.put_pixel(x, y, Luma([(v * 255.0).round() as u8]));
        }
    }
    out
}

/// Fraction of the 0.78–1.18× annulus containing Canny edge pixels — a weak
/// "is there a circular boundary here" signal.
pub(crate) fn ring_edge_density(gray: &GrayImage, cx: f32, cy: f32, r: f32) -> Option<f32> {
    if !(r.is_finite() && r > 3.0) {
        return None;
    }
    let cx_i = cx.round() as i64;
    let cy_i = cy.round() as i64;
    let rr = r.round() as i64;
    let pad = ((rr as f32 * 1.5).round() as i64).max(18);
    let (crop, x0, y0) = crop_gray(gray, cx_i, cy_i, pad)?;
    // canny smooths internally; an extra pre-blur here would push moderate
    // boundaries under the calibrated thresholds.
    let edges = imageproc::edges::canny(&crop, CANNY_LOW, CANNY_HIGH);

    let r_in = ((rr as f32 * RING_INNER_FRAC).round() as i64).max(2);
    let r_out = ((rr as f32 * RING_OUTER_FRAC).round() as i64).max(r_in + 2);
    let cx_r = cx_i - x0 as i64;
    let cy_r = cy_i - y0 as i64;

    let mut ann_area = 0u32;
    let mut edge_count = 0u32;
    for y in 0..edges.height() {
        let dy = y as i64 - cy_r;
        for x in 0..edges.width() {
            let dx = x as i64 - cx_r;
            let d2 = dx * dx + dy * dy;
            if d2 > r_in * r_in && d2 <= r_out * r_out {
                ann_area += 1;
                if edges.get_pixel(x, y)[0] != 0 {
                    edge_count += 1;
                }
            }
        }
    }
    if ann_area <= 1 {
        return None;
    }
    Some(edge_count as f32 / ann_area as f32)
}

/// Radial edge symmetry statistics for one candidate circle.
#[derive(Debug, Clone, Default)]
pub(crate) struct RadialSymmetry {
    /// Fraction of sampled edge gradients aligned with the radial direction.
    pub score: f32,
    /// Sampled edge pixels as a fraction of the annulus area.
    pub coverage: f32,
    /// Number of edge pixels sampled.
    pub edge_total: usize,
    /// Annulus area in pixels.
    pub ring_area: usize,
    /// Small visualization (annulus + aligned/contrary dots).
    pub vis: Option<RgbImage>,
}

/// Measure how radially the edge gradients around the circle point.
///
/// A ball boundary produces gradients aligned with the radial direction all
/// around the annulus; straight clutter edges do not.
pub(crate) fn radial_edge_symmetry(
    gray: &GrayImage,
    cx: f32,
    cy: f32,
    r: f32,
    collect_vis: bool,
) -> Option<RadialSymmetry> {
    if !(r.is_finite() && r > 4.0) {
        return None;
    }
    let cx_i = cx.round() as i64;
    let cy_i = cy.round() as i64;
    let rr = r.round() as i64;
    let pad = ((rr as f32 * 1.6).round() as i64).max(18);
    let (crop, x0, y0) = crop_gray(gray, cx_i, cy_i, pad)?;
    let edges = imageproc::edges::canny(&crop, CANNY_LOW, CANNY_HIGH);
    let blurred = blur_gray(&crop, EDGE_BLUR_SIGMA);
    let gx = imageproc::gradients::horizontal_sobel(&blurred);
    let gy = imageproc::gradients::vertical_sobel(&blurred);

    let r_in = ((rr as f32 * RADIAL_INNER_FRAC).round() as i64).max(2);
    let r_out = ((rr as f32 * RADIAL_OUTER_FRAC).round() as i64).max(r_in + 2);
    let cx_r = cx_i - x0 as i64;
    let cy_r = cy_i - y0 as i64;

    let mut ring_area = 0usize;
    let mut total_valid = 0usize;
    let mut aligned = 0usize;
    let mut dots: Vec<(u32, u32, bool)> = Vec::new();
    for y in 0..edges.height() {
        let dy = y as i64 - cy_r;
        for x in 0..edges.width() {
            let dx = x as i64 - cx_r;
            let d2 = dx * dx + dy * dy;
            if d2 <= r_in * r_in || d2 > r_out * r_out {
                continue;
            }
            ring_area += 1;
            if edges.get_pixel(x, y)[0] == 0 {
                continue;
            }
            let gxv = gx.get_pixel(x, y)[0] as f32;
            let gyv = gy.get_pixel(x, y)[0] as f32;
            let gmag = (gxv * gxv + gyv * gyv).sqrt();
            let rmag = ((dx * dx + dy * dy) as f32).sqrt();
            if gmag <= 1e-6 || rmag <= 1e-6 {
                continue;
            }
            let cos_t = (gxv * dx as f32 + gyv * dy as f32) / (gmag * rmag);
            total_valid += 1;
            // Toward or away from the center both count: the boundary of a
            // bright ball and of a dark reflection differ only in polarity.
            let is_aligned = cos_t.abs() > RADIAL_ALIGN_COS;
            if is_aligned {
                aligned += 1;
            }
            if collect_vis {
                dots.push((x, y, is_aligned));
            }
        }
    }
    if ring_area == 0 {
        return None;
    }

    let vis = if collect_vis {
        let mut vis = RgbImage::new(crop.width(), crop.height());
        for y in 0..crop.height() {
            for x in 0..crop.width() {
                let g = blurred.get_pixel(x, y)[0];
                vis.put_pixel(x, y, image::Rgb([g, g, g]));
            }
        }
        let center = (cx_r as i32, cy_r as i32);
        imageproc::drawing::draw_hollow_circle_mut(
            &mut vis,
            center,
            r_out as i32,
            image::Rgb([0, 255, 255]),
        );
        imageproc::drawing::draw_hollow_circle_mut(
            &mut vis,
            center,
            r_in as i32,
            image::Rgb([0, 255, 255]),
        );
        let step = (total_valid / 180).max(1);
        for (i, &(x, y, ok)) in dots.iter().enumerate() {
            if i % step != 0 {
                continue;
            }
            let color = if ok {
                image::Rgb([0, 255, 0])
            } else {
                image::Rgb([255, 0, 0])
            };
            vis.put_pixel(x, y, color);
        }
        Some(vis)
    } else {
        None
    };

    Some(RadialSymmetry {
        score: aligned as f32 / total_valid.max(1) as f32,
        coverage: total_valid as f32 / ring_area as f32,
        edge_total: total_valid,
        ring_area,
        vis,
    })
}

/// Shape/brightness statistics over a rectangular ROI around the chosen
/// circle, recorded for diagnostics only.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RoiStats {
    /// Circularity of the largest blob in the ROI.
    pub circularity: f32,
    /// Fill ratio of that blob.
    pub fill: f32,
    /// Median V over mask pixels in the ROI (whole ROI when empty).
    pub v_med: f32,
    /// ROI bounds `[x0, y0, x1, y1]`.
    pub bounds: [u32; 4],
}

pub(crate) fn rect_roi_stats(
    mask: &GrayImage,
    v_plane: &GrayImage,
    cx: f32,
    cy: f32,
    r: f32,
) -> Option<RoiStats> {
    if !(r.is_finite() && r > 1.0) {
        return None;
    }
    let (w, h) = mask.dimensions();
    let pad = ((r * 1.6).round() as i64).max(20);
    let cx_i = cx.round() as i64;
    let cy_i = cy.round() as i64;
    let x0 = (cx_i - pad).max(0);
    let y0 = (cy_i - pad).max(0);
    let x1 = (cx_i + pad).min(w as i64);
    let y1 = (cy_i + pad).min(h as i64);
    if x1 - x0 <= 2 || y1 - y0 <= 2 {
        return None;
    }

    let mut masked_hist = [0u32; 256];
    let mut masked_n = 0u32;
    let mut all_hist = [0u32; 256];
    let mut all_n = 0u32;
    let mut roi_mask = GrayImage::new((x1 - x0) as u32, (y1 - y0) as u32);
    for y in y0..y1 {
        for x in x0..x1 {
            let v = v_plane.get_pixel(x as u32, y as u32)[0] as usize;
            all_hist[v] += 1;
            all_n += 1;
            if mask.get_pixel(x as u32, y as u32)[0] != 0 {
                masked_hist[v] += 1;
                masked_n += 1;
                roi_mask.put_pixel((x - x0) as u32, (y - y0) as u32, Luma([255]));
            }
        }
    }
    let v_med = if masked_n > 0 {
        hist_median(&masked_hist, masked_n)
    } else {
        hist_median(&all_hist, all_n)
    };

    let bounds = [x0 as u32, y0 as u32, x1 as u32, y1 as u32];
    let mut best: Option<crate::contour::ContourShape> = None;
    for pts in crate::contour::external_contours(&roi_mask) {
        if let Some(shape) = crate::contour::shape_of(pts) {
            if best.as_ref().map_or(true, |b| shape.area > b.area) {
                best = Some(shape);
            }
        }
    }
    Some(match best {
        Some(shape) => RoiStats {
            circularity: shape.circularity,
            fill: shape.fill,
            v_med,
            bounds,
        },
        None => RoiStats {
            circularity: 0.0,
            fill: 0.0,
            v_med,
            bounds,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{disc_frame, gray_plane, Disc};

    fn solid_disc_mask(w: u32, h: u32, cx: f32, cy: f32, r: f32) -> GrayImage {
        let mut m = GrayImage::new(w, h);
        imageproc::drawing::draw_filled_circle_mut(
            &mut m,
            (cx as i32, cy as i32),
            r as i32,
            Luma([255]),
        );
        m
    }

    #[test]
    fn full_disc_coverage_is_one() {
        let m = solid_disc_mask(100, 100, 50.0, 50.0, 30.0);
        let cov = disc_mask_coverage(&m, 50.0, 50.0, 15.0).unwrap();
        assert!(cov > 0.99, "cov = {cov}");
    }

    #[test]
    fn tiny_radius_is_degenerate() {
        let m = solid_disc_mask(100, 100, 50.0, 50.0, 30.0);
        assert!(disc_mask_coverage(&m, 50.0, 50.0, 0.5).is_none());
    }

    #[test]
    fn masked_median_ignores_background() {
        // Bright only under the mask; the plain median would read 0.
        let mut v = GrayImage::new(100, 100);
        imageproc::drawing::draw_filled_circle_mut(&mut v, (50, 50), 10, Luma([200]));
        let m = solid_disc_mask(100, 100, 50.0, 50.0, 10.0);
        let masked = disc_v_median(&v, Some(&m), 50.0, 50.0, 20.0).unwrap();
        assert!(masked >= 199.0, "masked = {masked}");
        let plain = disc_v_median(&v, None, 50.0, 50.0, 20.0).unwrap();
        assert!(plain < 150.0, "plain = {plain}");
    }

    #[test]
    fn hist_median_even_count_averages() {
        let mut hist = [0u32; 256];
        hist[10] = 1;
        hist[20] = 1;
        assert!((hist_median(&hist, 2) - 15.0).abs() < 1e-6);
        hist[30] = 1;
        assert!((hist_median(&hist, 3) - 20.0).abs() < 1e-6);
    }

    #[test]
    fn ring_density_fires_on_a_disc_boundary() {
        let frame = disc_frame(
            160,
            160,
            [20, 20, 20],
            &[Disc {
                cx: 80.0,
                cy: 80.0,
                r: 30.0,
                color: [230, 30, 25],
            }],
        );
        let gray = gray_plane(&frame);
        let den = ring_edge_density(&gray, 80.0, 80.0, 30.0).unwrap();
        assert!(den > 0.012, "den = {den}");
        // Far from the disc there is no circular edge.
        let off = ring_edge_density(&gray, 30.0, 30.0, 12.0).unwrap();
        assert!(off < den, "off = {off}");
    }

    #[test]
    fn radial_symmetry_high_for_disc_low_for_stripe() {
        let frame = disc_frame(
            160,
            160,
            [20, 20, 20],
            &[Disc {
                cx: 80.0,
                cy: 80.0,
                r: 30.0,
                color: [230, 30, 25],
            }],
        );
        let gray = gray_plane(&frame);
        let sym = radial_edge_symmetry(&gray, 80.0, 80.0, 30.0, false).unwrap();
        assert!(sym.score > 0.8, "score = {}", sym.score);
        assert!(sym.edge_total > 80);

        // A straight vertical stripe: its edges cross the annulus but point
        // radially only at two spots.
        let mut stripe = GrayImage::new(160, 160);
        for y in 0..160 {
            for x in 70..90 {
                stripe.put_pixel(x, y, Luma([220]));
            }
        }
        let sym_s = radial_edge_symmetry(&stripe, 80.0, 80.0, 30.0, false).unwrap();
        assert!(sym_s.score < sym.score);
    }
}
