//! Contour extraction and shape metrics.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

/// A traced external contour with its derived shape metrics.
#[derive(Debug, Clone)]
pub(crate) struct ContourShape {
    /// Boundary points (pixel lattice).
    pub points: Vec<Point<i32>>,
    /// Polygon area (shoelace over the boundary).
    pub area: f32,
    /// Closed boundary length.
    pub perimeter: f32,
    /// `4π·area / perimeter²`.
    pub circularity: f32,
    /// Minimal enclosing circle center.
    pub cx: f32,
    pub cy: f32,
    /// Minimal enclosing circle radius.
    pub r: f32,
    /// `area / (π·r²)`.
    pub fill: f32,
}

/// Trace external contours of a binary mask.
pub(crate) fn external_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| c.points)
        .collect()
}

/// Compute shape metrics for one contour.
///
/// Returns `None` for degenerate contours (fewer than 3 points or an
/// effectively zero perimeter), matching the `peri` reject path.
pub(crate) fn shape_of(points: Vec<Point<i32>>) -> Option<ContourShape> {
    if points.len() < 3 {
        return None;
    }
    let area = polygon_area(&points);
    let perimeter = closed_length(&points);
    if perimeter <= 1e-6 {
        return None;
    }
    let circularity = 4.0 * std::f32::consts::PI * area / (perimeter * perimeter);
    let (cx, cy, r) = min_enclosing_circle(&points);
    let fill = if r > 1e-6 {
        area / (std::f32::consts::PI * r * r)
    } else {
        0.0
    };
    Some(ContourShape {
        points,
        area,
        perimeter,
        circularity,
        cx,
        cy,
        r,
        fill,
    })
}

/// Polygon area via the shoelace formula (absolute value).
pub(crate) fn polygon_area(points: &[Point<i32>]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        acc += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    (acc.abs() * 0.5) as f32
}

/// Length of the closed polyline through `points`.
pub(crate) fn closed_length(points: &[Point<i32>]) -> f32 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        let dx = (p.x - q.x) as f64;
        let dy = (p.y - q.y) as f64;
        acc += (dx * dx + dy * dy).sqrt();
    }
    acc as f32
}

/// Exact minimal enclosing circle of a point set.
///
/// The circle depends only on the convex hull, so the hull is computed
/// first (monotone chain) and the incremental algorithm runs on the few
/// remaining points.
pub(crate) fn min_enclosing_circle(points: &[Point<i32>]) -> (f32, f32, f32) {
    let hull = convex_hull(points);
    let pts: Vec<(f64, f64)> = hull.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let (cx, cy, r) = mec(&pts);
    (cx as f32, cy as f32, r as f32)
}

fn convex_hull(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut pts: Vec<Point<i32>> = points.to_vec();
    pts.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
    pts.dedup_by(|a, b| a.x == b.x && a.y == b.y);
    let n = pts.len();
    if n < 3 {
        return pts;
    }

    let cross = |o: Point<i32>, a: Point<i32>, b: Point<i32>| -> i64 {
        (a.x as i64 - o.x as i64) * (b.y as i64 - o.y as i64)
            - (a.y as i64 - o.y as i64) * (b.x as i64 - o.x as i64)
    };

    let mut hull: Vec<Point<i32>> = Vec::with_capacity(2 * n);
    for &p in pts.iter() {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev() {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Incremental exact minimal enclosing circle over a (small) point set.
fn mec(pts: &[(f64, f64)]) -> (f64, f64, f64) {
    match pts.len() {
        0 => return (0.0, 0.0, 0.0),
        1 => return (pts[0].0, pts[0].1, 0.0),
        _ => {}
    }

    let mut c = circle_two(pts[0], pts[1]);
    for i in 2..pts.len() {
        if in_circle(c, pts[i]) {
            continue;
        }
        // pts[i] is on the boundary of the minimal circle of pts[..=i].
        let q = pts[i];
        let mut ci = circle_two(pts[0], q);
        for j in 1..i {
            if in_circle(ci, pts[j]) {
                continue;
            }
            let p = pts[j];
            let mut cj = circle_two(p, q);
            for k in 0..j {
                if !in_circle(cj, pts[k]) {
                    cj = circumcircle(pts[k], p, q);
                }
            }
            ci = cj;
        }
        c = ci;
    }
    c
}

fn circle_two(a: (f64, f64), b: (f64, f64)) -> (f64, f64, f64) {
    let cx = (a.0 + b.0) * 0.5;
    let cy = (a.1 + b.1) * 0.5;
    let r = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt() * 0.5;
    (cx, cy, r)
}

fn circumcircle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> (f64, f64, f64) {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < 1e-12 {
        // Collinear: fall back to the diameter of the farthest pair.
        let cands = [circle_two(a, b), circle_two(a, c), circle_two(b, c)];
        return cands
            .into_iter()
            .max_by(|x, y| x.2.partial_cmp(&y.2).unwrap())
            .unwrap();
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let ux = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let uy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    let r = ((a.0 - ux).powi(2) + (a.1 - uy).powi(2)).sqrt();
    (ux, uy, r)
}

fn in_circle(c: (f64, f64, f64), p: (f64, f64)) -> bool {
    let dx = p.0 - c.0;
    let dy = p.1 - c.1;
    (dx * dx + dy * dy).sqrt() <= c.2 + 1e-7
}

/// Rasterize a filled contour into a fresh mask of the given dimensions.
pub(crate) fn fill_contour_mask(width: u32, height: u32, points: &[Point<i32>]) -> GrayImage {
    let mut out = GrayImage::new(width, height);
    if points.len() < 3 {
        for p in points {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < width && (p.y as u32) < height {
                out.put_pixel(p.x as u32, p.y as u32, image::Luma([255]));
            }
        }
        return out;
    }
    let mut poly = points.to_vec();
    if poly.first() == poly.last() {
        poly.pop();
    }
    imageproc::drawing::draw_polygon_mut(&mut out, &poly, image::Luma([255]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{disc_frame, Disc};
    use crate::{color::ColorPlanes, mask::build_masks};

    fn disc_mask(r: f32) -> GrayImage {
        let frame = disc_frame(
            200,
            160,
            [60, 60, 60],
            &[Disc {
                cx: 100.0,
                cy: 80.0,
                r,
                color: [230, 30, 25],
            }],
        );
        let planes = ColorPlanes::compute(&frame);
        let (masks, _) = build_masks(&planes, &Default::default());
        masks.combined
    }

    #[test]
    fn disc_contour_metrics_are_circular() {
        let mask = disc_mask(30.0);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        let shape = shape_of(contours.into_iter().next().unwrap()).unwrap();
        assert!(shape.circularity > 0.85, "circ = {}", shape.circularity);
        assert!(shape.fill > 0.85, "fill = {}", shape.fill);
        assert!((shape.cx - 100.0).abs() < 2.0);
        assert!((shape.cy - 80.0).abs() < 2.0);
        assert!((shape.r - 30.0).abs() < 3.0, "r = {}", shape.r);
    }

    #[test]
    fn min_enclosing_circle_of_square() {
        let pts = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        let (cx, cy, r) = min_enclosing_circle(&pts);
        assert!((cx - 5.0).abs() < 1e-4);
        assert!((cy - 5.0).abs() < 1e-4);
        assert!((r - (50.0f32).sqrt()).abs() < 1e-3);
    }

    #[test]
    fn min_enclosing_circle_collinear_points() {
        let pts = vec![Point::new(0, 0), Point::new(4, 0), Point::new(9, 0)];
        let (cx, _, r) = min_enclosing_circle(&pts);
        assert!((cx - 4.5).abs() < 1e-4);
        assert!((r - 4.5).abs() < 1e-4);
    }

    #[test]
    fn shoelace_matches_rectangle() {
        let pts = vec![
            Point::new(0, 0),
            Point::new(20, 0),
            Point::new(20, 10),
            Point::new(0, 10),
        ];
        assert!((polygon_area(&pts) - 200.0).abs() < 1e-4);
        assert!((closed_length(&pts) - 60.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_contours_are_rejected() {
        assert!(shape_of(vec![Point::new(1, 1), Point::new(2, 2)]).is_none());
    }
}
