//! Gradient-vote Hough circle transform.
//!
//! Canny edge pixels vote along their ±gradient direction into a center
//! accumulator; NMS'd peaks become center hypotheses, and each center picks
//! its radius from a smoothed histogram of supporting edge distances.
//! Restricted to the small ROI and radius band the refinement stage needs.

use image::GrayImage;

/// Search parameters for one Hough pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HoughParams {
    /// Minimum circle radius (pixels).
    pub r_min: f32,
    /// Maximum circle radius (pixels).
    pub r_max: f32,
    /// Minimum distance between returned centers.
    pub min_dist: f32,
    /// Canny high threshold; the low threshold is half of it.
    pub canny_high: f32,
    /// Minimum smoothed radius-histogram votes for a circle.
    pub accumulator_threshold: u32,
    /// Cap on returned circles, strongest first.
    pub max_circles: usize,
}

/// A circle hypothesis with its supporting vote count.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HoughCircle {
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub votes: u32,
}

/// Deposit a bilinear-weighted vote.
#[inline]
fn bilinear_add(accum: &mut [f32], stride: usize, x: f32, y: f32, weight: f32) {
    let x0 = x as usize;
    let y0 = y as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let base = y0 * stride + x0;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + stride] += weight * (1.0 - fx) * fy;
    accum[base + stride + 1] += weight * fx * fy;
}

/// Detect circles in a gray image.
///
/// Returns circles sorted by vote count, strongest first. Deterministic:
/// ties resolve by scan order.
pub(crate) fn hough_circles(gray: &GrayImage, params: &HoughParams) -> Vec<HoughCircle> {
    let (w, h) = gray.dimensions();
    if w < 8 || h < 8 || params.r_max < params.r_min || params.r_min < 1.0 {
        return Vec::new();
    }

    // canny smooths internally; the Sobel pass for vote directions runs on
    // an equally smoothed copy.
    let edges = imageproc::edges::canny(gray, params.canny_high * 0.5, params.canny_high);
    let blurred = crate::metrics::blur_gray(gray, 1.4);
    let gx = imageproc::gradients::horizontal_sobel(&blurred);
    let gy = imageproc::gradients::vertical_sobel(&blurred);

    let stride = w as usize;
    let n = stride * h as usize;
    let mut accum = vec![0.0f32; n];
    let mut edge_pts: Vec<(u32, u32)> = Vec::new();

    let x_limit = (w - 1) as f32;
    let y_limit = (h - 1) as f32;
    let r_lo = params.r_min.floor();
    let r_hi = params.r_max.ceil();

    for y in 0..h {
        for x in 0..w {
            if edges.get_pixel(x, y)[0] == 0 {
                continue;
            }
            let gxv = gx.get_pixel(x, y)[0] as f32;
            let gyv = gy.get_pixel(x, y)[0] as f32;
            let mag = (gxv * gxv + gyv * gyv).sqrt();
            if mag < 1e-6 {
                continue;
            }
            edge_pts.push((x, y));
            let dx = gxv / mag;
            let dy = gyv / mag;
            let xf = x as f32;
            let yf = y as f32;
            let mut r = r_lo;
            while r <= r_hi {
                for dir in [1.0f32, -1.0] {
                    let vx = xf + dir * dx * r;
                    let vy = yf + dir * dy * r;
                    if vx >= 0.0 && vx < x_limit && vy >= 0.0 && vy < y_limit {
                        bilinear_add(&mut accum, stride, vx, vy, 1.0);
                    }
                }
                r += 1.0;
            }
        }
    }
    if edge_pts.is_empty() {
        return Vec::new();
    }

    // Center peaks: threshold + non-maximum suppression over min_dist.
    let nms_r = params.min_dist.max(1.0).ceil() as i64;
    let nms_r_sq = (params.min_dist * params.min_dist).max(1.0);
    let center_floor = (params.accumulator_threshold as f32 * 0.5).max(4.0);
    let mut centers: Vec<(usize, usize, f32)> = Vec::new();
    for y in 0..h as usize {
        for x in 0..stride {
            let idx = y * stride + x;
            let val = accum[idx];
            if val < center_floor {
                continue;
            }
            let mut is_max = true;
            'nbhd: for ddy in -nms_r..=nms_r {
                for ddx in -nms_r..=nms_r {
                    if ddx == 0 && ddy == 0 {
                        continue;
                    }
                    if ((ddx * ddx + ddy * ddy) as f32) > nms_r_sq {
                        continue;
                    }
                    let nx = x as i64 + ddx;
                    let ny = y as i64 + ddy;
                    if nx < 0 || ny < 0 || nx >= stride as i64 || ny >= h as i64 {
                        continue;
                    }
                    let nidx = ny as usize * stride + nx as usize;
                    if accum[nidx] > val || (accum[nidx] == val && nidx < idx) {
                        is_max = false;
                        break 'nbhd;
                    }
                }
            }
            if is_max {
                centers.push((x, y, val));
            }
        }
    }
    centers.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    centers.truncate(params.max_circles * 2);

    // Per-center radius: smoothed histogram of supporting edge distances.
    let r_lo_i = r_lo as usize;
    let r_hi_i = r_hi as usize;
    let bins = r_hi_i - r_lo_i + 1;
    let mut circles: Vec<HoughCircle> = Vec::new();
    for &(cx, cy, _) in &centers {
        let mut hist = vec![0u32; bins];
        for &(ex, ey) in &edge_pts {
            let dx = ex as f32 - cx as f32;
            let dy = ey as f32 - cy as f32;
            let d = (dx * dx + dy * dy).sqrt();
            let bin = d.round() as usize;
            if bin >= r_lo_i && bin <= r_hi_i {
                hist[bin - r_lo_i] += 1;
            }
        }
        let mut best_bin = 0usize;
        let mut best_votes = 0u32;
        for b in 0..bins {
            let lo = b.saturating_sub(1);
            let hi = (b + 1).min(bins - 1);
            let votes: u32 = hist[lo..=hi].iter().sum();
            if votes > best_votes {
                best_votes = votes;
                best_bin = b;
            }
        }
        if best_votes < params.accumulator_threshold {
            continue;
        }
        circles.push(HoughCircle {
            x: cx as f32,
            y: cy as f32,
            r: (best_bin + r_lo_i) as f32,
            votes: best_votes,
        });
        if circles.len() >= params.max_circles {
            break;
        }
    }
    circles.sort_by(|a, b| b.votes.cmp(&a.votes));
    circles
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    fn params(r_min: f32, r_max: f32) -> HoughParams {
        HoughParams {
            r_min,
            r_max,
            min_dist: 20.0,
            canny_high: 120.0,
            accumulator_threshold: 24,
            max_circles: 8,
        }
    }

    #[test]
    fn finds_a_single_disc() {
        let mut img = GrayImage::new(120, 120);
        draw_filled_circle_mut(&mut img, (60, 60), 30, Luma([220]));
        let circles = hough_circles(&img, &params(20.0, 40.0));
        assert!(!circles.is_empty());
        let c = circles[0];
        assert!((c.x - 60.0).abs() <= 3.0, "x = {}", c.x);
        assert!((c.y - 60.0).abs() <= 3.0, "y = {}", c.y);
        assert!((c.r - 30.0).abs() <= 3.0, "r = {}", c.r);
    }

    #[test]
    fn finds_both_stacked_discs() {
        let mut img = GrayImage::new(140, 220);
        draw_filled_circle_mut(&mut img, (70, 70), 30, Luma([220]));
        draw_filled_circle_mut(&mut img, (70, 150), 30, Luma([140]));
        let circles = hough_circles(&img, &params(20.0, 40.0));
        assert!(circles.len() >= 2, "found {}", circles.len());
        let mut ys: Vec<f32> = circles.iter().take(2).map(|c| c.y).collect();
        ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((ys[0] - 70.0).abs() <= 4.0);
        assert!((ys[1] - 150.0).abs() <= 4.0);
    }

    #[test]
    fn blank_image_has_no_circles() {
        let img = GrayImage::new(100, 100);
        assert!(hough_circles(&img, &params(10.0, 30.0)).is_empty());
    }

    #[test]
    fn radius_band_is_respected() {
        let mut img = GrayImage::new(120, 120);
        draw_filled_circle_mut(&mut img, (60, 60), 30, Luma([220]));
        for c in hough_circles(&img, &params(20.0, 40.0)) {
            assert!(c.r >= 20.0 && c.r <= 40.0);
        }
    }
}
