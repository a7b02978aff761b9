//! Peanut-blob splitting.
//!
//! A ball sitting just above its floor reflection often merges into one
//! peanut-shaped blob. The distance transform of the filled blob then has
//! two near-equal peaks, vertically stacked; cutting along the
//! perpendicular bisector of the peaks recovers the two circles.

use image::{GrayImage, Luma};
use imageproc::point::Point;

use crate::contour::{self, fill_contour_mask};
use crate::detector::config::SplitParams;

/// One half of a split blob, scored downstream like any other candidate.
#[derive(Debug, Clone)]
pub(crate) struct SplitHalf {
    pub cx: f32,
    pub cy: f32,
    pub r: f32,
    /// Sub-contour area, or the `πr²` disc proxy when the cut failed.
    pub area: f32,
    /// Sub-contour circularity, or 1.0 for the disc proxy.
    pub circularity: f32,
    /// Sub-contour boundary when the cut succeeded.
    pub points: Option<Vec<Point<i32>>>,
}

/// Distance-transform peak in mask coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DistPeak {
    pub x: i64,
    pub y: i64,
    pub value: f32,
}

/// Euclidean distance of every foreground pixel to the nearest background
/// pixel (zero on background).
pub(crate) fn distance_to_background(mask: &GrayImage) -> Vec<f32> {
    let (w, h) = mask.dimensions();
    let mut inverted = GrayImage::new(w, h);
    for (src, dst) in mask.as_raw().iter().zip(inverted.iter_mut()) {
        *dst = if *src == 0 { 255 } else { 0 };
    }
    let sq = imageproc::distance_transform::euclidean_squared_distance_transform(&inverted);
    sq.as_raw().iter().map(|&d| (d as f32).sqrt()).collect()
}

/// Local maxima of a distance map that reach `collect_frac` of the global
/// maximum. Plateaus resolve to their lowest-index pixel.
fn local_maxima(dist: &[f32], w: usize, h: usize, floor: f32) -> Vec<DistPeak> {
    let mut peaks = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let v = dist[idx];
            if v < floor || v <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nbhd: for dy in -2i64..=2 {
                for dx in -2i64..=2 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let nidx = ny as usize * w + nx as usize;
                    if dist[nidx] > v || (dist[nidx] == v && nidx < idx) {
                        is_max = false;
                        break 'nbhd;
                    }
                }
            }
            if is_max {
                peaks.push(DistPeak {
                    x: x as i64,
                    y: y as i64,
                    value: v,
                });
            }
        }
    }
    peaks
}

/// Iterative peak extraction: repeatedly take the global maximum and
/// suppress a disc around it.
pub(crate) fn suppressed_peaks(
    dist: &mut [f32],
    w: usize,
    h: usize,
    max_peaks: usize,
) -> Vec<DistPeak> {
    let mut peaks = Vec::new();
    for _ in 0..max_peaks {
        let mut best_idx = 0usize;
        let mut best_v = 0.0f32;
        for (idx, &v) in dist.iter().enumerate() {
            if v > best_v {
                best_v = v;
                best_idx = idx;
            }
        }
        if best_v <= 0.0 {
            break;
        }
        let px = (best_idx % w) as i64;
        let py = (best_idx / w) as i64;
        peaks.push(DistPeak {
            x: px,
            y: py,
            value: best_v,
        });
        let sup_r = ((best_v * 0.85).round() as i64).max(6);
        let r2 = sup_r * sup_r;
        for y in (py - sup_r).max(0)..=(py + sup_r).min(h as i64 - 1) {
            for x in (px - sup_r).max(0)..=(px + sup_r).min(w as i64 - 1) {
                let dx = x - px;
                let dy = y - py;
                if dx * dx + dy * dy <= r2 {
                    dist[y as usize * w + x as usize] = 0.0;
                }
            }
        }
    }
    peaks
}

/// Try to split one contour into a vertically stacked circle pair.
///
/// Returns an empty vector when the blob does not look like a peanut; the
/// caller then scores the whole contour as usual.
pub(crate) fn split_peanut(
    points: &[Point<i32>],
    width: u32,
    height: u32,
    min_area: f32,
    min_radius: f32,
    max_radius: f32,
    cfg: &SplitParams,
) -> Vec<SplitHalf> {
    let filled = fill_contour_mask(width, height, points);
    let on_count = filled.as_raw().iter().filter(|&&p| p != 0).count();
    if (on_count as f32) < min_area {
        return Vec::new();
    }

    let w = width as usize;
    let h = height as usize;
    let dist = distance_to_background(&filled);
    let global_max = dist.iter().cloned().fold(0.0f32, f32::max);
    if global_max < min_radius {
        return Vec::new();
    }

    let mut peaks = local_maxima(&dist, w, h, cfg.peak_collect_frac * global_max);
    if peaks.is_empty() {
        let mut work = dist.clone();
        peaks = suppressed_peaks(&mut work, w, h, 4);
    }

    let mut strong: Vec<DistPeak> = peaks
        .into_iter()
        .filter(|p| p.value >= cfg.peak_strong_frac * global_max)
        .collect();
    if strong.len() < 2 {
        return Vec::new();
    }
    strong.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.cmp(&b.y))
    });
    let (p0, p1) = (strong[0], strong[1]);
    let r_min = p0.value.min(p1.value);
    let dx = (p0.x - p1.x).abs() as f32;
    let dy = (p0.y - p1.y).abs() as f32;

    // Vertically stacked, similar-sized peaks: the ball-over-reflection
    // geometry. Anything else is a genuine single blob.
    if dx > cfg.max_dx_ratio * r_min {
        return Vec::new();
    }
    if dy < cfg.min_dy_ratio * r_min {
        return Vec::new();
    }
    if p0.value > max_radius || p1.value > max_radius {
        return Vec::new();
    }

    if let Some(halves) = cut_between_peaks(&filled, p0, p1, r_min, cfg) {
        return halves;
    }

    // Cut produced fewer than two blobs: fall back to peak-centered discs.
    [p0, p1]
        .iter()
        .map(|p| SplitHalf {
            cx: p.x as f32,
            cy: p.y as f32,
            r: p.value,
            area: std::f32::consts::PI * p.value * p.value,
            circularity: 1.0,
            points: None,
        })
        .collect()
}

/// Erase a thick segment along the perpendicular bisector of the peaks and
/// re-trace; `Some` only when the cut yields at least two blobs.
fn cut_between_peaks(
    filled: &GrayImage,
    p0: DistPeak,
    p1: DistPeak,
    r_min: f32,
    cfg: &SplitParams,
) -> Option<Vec<SplitHalf>> {
    let (w, h) = filled.dimensions();
    let v = nalgebra::Vector2::new((p1.x - p0.x) as f32, (p1.y - p0.y) as f32);
    let norm = v.norm().max(1e-6);
    let u = v / norm;
    // Perpendicular of the peak axis.
    let p = nalgebra::Vector2::new(-u.y, u.x);
    let mid = nalgebra::Point2::new(
        (p0.x + p1.x) as f32 * 0.5,
        (p0.y + p1.y) as f32 * 0.5,
    );
    let cut_len = (cfg.cut_length_ratio * r_min).max(6.0);
    let cut_thick = (cfg.cut_thickness_ratio * r_min).round().max(2.0);
    let half_thick = cut_thick * 0.5;

    let mut cut = filled.clone();
    let x_lo = ((mid.x - cut_len - cut_thick).floor() as i64).max(0);
    let x_hi = ((mid.x + cut_len + cut_thick).ceil() as i64).min(w as i64 - 1);
    let y_lo = ((mid.y - cut_len - cut_thick).floor() as i64).max(0);
    let y_hi = ((mid.y + cut_len + cut_thick).ceil() as i64).min(h as i64 - 1);
    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            let d = nalgebra::Vector2::new(x as f32 - mid.x, y as f32 - mid.y);
            let along = d.dot(&p);
            let across = d.dot(&u);
            if along.abs() <= cut_len && across.abs() <= half_thick {
                cut.put_pixel(x as u32, y as u32, Luma([0]));
            }
        }
    }

    let mut shapes: Vec<crate::contour::ContourShape> = contour::external_contours(&cut)
        .into_iter()
        .filter_map(contour::shape_of)
        .collect();
    if shapes.len() < 2 {
        return None;
    }
    shapes.sort_by(|a, b| {
        b.area
            .partial_cmp(&a.area)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let halves: Vec<SplitHalf> = shapes
        .into_iter()
        .take(2)
        .filter(|s| s.r > 1.0)
        .map(|s| SplitHalf {
            cx: s.cx,
            cy: s.cy,
            r: s.r,
            area: s.area,
            circularity: s.circularity,
            points: Some(s.points),
        })
        .collect();
    if halves.len() < 2 {
        return None;
    }
    Some(halves)
}
