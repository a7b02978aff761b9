//! Debug visualization mosaic.
//!
//! Four panes on a 3×3-cell canvas: redness mask (top-left), hue mask
//! (top-right), combined mask with ranked circles (bottom-left), and a
//! double-size annotated overlay (bottom-right 2×2) carrying the contour
//! outlines, the detected circle, the refinement-edges inset and the
//! radial-symmetry inset.

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::contour::external_contours;
use crate::debug_dump::DebugRecord;

const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const MAGENTA: Rgb<u8> = Rgb([255, 0, 255]);
/// Final mosaic size, stable regardless of frame resolution.
const MOSAIC_W: u32 = 800;
const MOSAIC_H: u32 = 600;

fn gray_to_rgb(mask: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(mask.width(), mask.height());
    for (src, dst) in mask.pixels().zip(out.pixels_mut()) {
        let v = src[0];
        *dst = Rgb([v, v, v]);
    }
    out
}

fn draw_dotted_circle(img: &mut RgbImage, cx: i32, cy: i32, r: i32, color: Rgb<u8>) {
    if r <= 1 {
        return;
    }
    for ang in (0..360).step_by(18) {
        let rad = (ang as f32).to_radians();
        let x = cx + (r as f32 * rad.cos()).round() as i32;
        let y = cy + (r as f32 * rad.sin()).round() as i32;
        draw_filled_circle_mut(img, (x, y), 1, color);
    }
}

fn draw_thick_hollow_circle(img: &mut RgbImage, cx: i32, cy: i32, r: i32, color: Rgb<u8>) {
    if r <= 0 {
        return;
    }
    draw_hollow_circle_mut(img, (cx, cy), r, color);
    draw_hollow_circle_mut(img, (cx, cy), (r - 1).max(1), color);
}

fn draw_contour_outlines(img: &mut RgbImage, mask: &GrayImage, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for contour in external_contours(mask) {
        for p in contour {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < w && (p.y as u32) < h {
                img.put_pixel(p.x as u32, p.y as u32, color);
            }
        }
    }
}

fn paste_inset(canvas: &mut RgbImage, inset_src: &RgbImage, at_right: bool) {
    let (cw, _) = canvas.dimensions();
    let inset_w = ((cw as f32 * 0.35).round() as u32).max(60);
    let scale = inset_w as f32 / inset_src.width().max(1) as f32;
    let inset_h = ((inset_src.height() as f32 * scale).round() as u32).max(45);
    let inset = imageops::resize(inset_src, inset_w, inset_h, imageops::FilterType::Nearest);
    let x_off = if at_right { cw.saturating_sub(inset_w) } else { 0 };
    for y in 0..inset_h.min(canvas.height()) {
        for x in 0..inset_w {
            let cx = x_off + x;
            if cx < canvas.width() {
                canvas.put_pixel(cx, y, *inset.get_pixel(x, y));
            }
        }
    }
    if inset_w > 1 && inset_h > 1 {
        draw_hollow_rect_mut(
            canvas,
            Rect::at(x_off as i32, 0).of_size(inset_w, inset_h),
            YELLOW,
        );
    }
}

/// Assemble the mosaic for one call.
///
/// `circle` is the accepted detection (already inflated), when any.
pub(crate) fn build_mosaic(
    frame: &RgbImage,
    record: &DebugRecord,
    circle: Option<(f32, f32, f32)>,
    radial_vis: Option<&RgbImage>,
) -> RgbImage {
    let (w, h) = frame.dimensions();

    let mut pane_combined = gray_to_rgb(&record.masks.combined);
    // Ranked candidates as dotted circles on the combined pane.
    for ranked in &record.masks.ranked {
        for contour in external_contours(&ranked.mask) {
            for p in contour {
                if p.x >= 0 && p.y >= 0 && (p.x as u32) < w && (p.y as u32) < h {
                    pane_combined.put_pixel(p.x as u32, p.y as u32, MAGENTA);
                }
            }
        }
    }
    if let Some((cx, cy, r)) = circle {
        draw_thick_hollow_circle(
            &mut pane_combined,
            cx.round() as i32,
            cy.round() as i32,
            r.round() as i32,
            YELLOW,
        );
    }

    let mut overlay = frame.clone();
    draw_contour_outlines(&mut overlay, &record.masks.combined, YELLOW);
    if let Some(refined) = &record.masks.refined {
        draw_contour_outlines(&mut overlay, refined, GREEN);
    }
    for ranked in &record.masks.ranked {
        // Dotted marker ring roughly around each ranked blob.
        let r_est = (ranked.area / std::f32::consts::PI).sqrt();
        if let Some(center) = mask_centroid(&ranked.mask) {
            draw_dotted_circle(
                &mut overlay,
                center.0,
                center.1,
                r_est.round() as i32,
                MAGENTA,
            );
        }
    }
    if let Some((cx, cy, r)) = circle {
        let cx = (cx.round() as i32).clamp(0, w as i32 - 1);
        let cy = (cy.round() as i32).clamp(0, h as i32 - 1);
        draw_thick_hollow_circle(&mut overlay, cx, cy, r.round() as i32, YELLOW);
        draw_filled_circle_mut(&mut overlay, (cx, cy), 2, YELLOW);
    }
    if let Some(edges) = &record.refine.roi_edges {
        paste_inset(&mut overlay, &gray_to_rgb(edges), false);
        if let Some([x0, y0, x1, y1]) = record.refine.roi {
            if x1 > x0 && y1 > y0 {
                draw_hollow_rect_mut(
                    &mut overlay,
                    Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0),
                    YELLOW,
                );
            }
        }
    }
    if let Some(vis) = radial_vis {
        paste_inset(&mut overlay, vis, true);
    }

    // Pane grid: three half-size panes plus the overlay at double size.
    let pw = (w / 2).max(1);
    let ph = (h / 2).max(1);
    let tl = imageops::resize(
        &gray_to_rgb(&record.masks.redness),
        pw,
        ph,
        imageops::FilterType::Nearest,
    );
    let tr = imageops::resize(
        &gray_to_rgb(&record.masks.hue),
        pw,
        ph,
        imageops::FilterType::Nearest,
    );
    let bl = imageops::resize(&pane_combined, pw, ph, imageops::FilterType::Nearest);
    let br = imageops::resize(&overlay, pw * 2, ph * 2, imageops::FilterType::Nearest);

    let mut canvas = RgbImage::new(pw * 3, ph * 3);
    imageops::replace(&mut canvas, &tl, 0, 0);
    imageops::replace(&mut canvas, &tr, pw as i64, 0);
    imageops::replace(&mut canvas, &bl, 0, ph as i64);
    imageops::replace(&mut canvas, &br, pw as i64, ph as i64);

    imageops::resize(&canvas, MOSAIC_W, MOSAIC_H, imageops::FilterType::Nearest)
}

fn mask_centroid(mask: &GrayImage) -> Option<(i32, i32)> {
    let mut sx = 0i64;
    let mut sy = 0i64;
    let mut n = 0i64;
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] != 0 {
            sx += x as i64;
            sy += y as i64;
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some(((sx / n) as i32, (sy / n) as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mosaic_has_stable_size() {
        let frame = RgbImage::new(160, 120);
        let mut record = DebugRecord::default();
        record.masks.redness = GrayImage::new(160, 120);
        record.masks.hue = GrayImage::new(160, 120);
        record.masks.combined = GrayImage::new(160, 120);
        let mosaic = build_mosaic(&frame, &record, Some((80.0, 60.0, 20.0)), None);
        assert_eq!(mosaic.dimensions(), (MOSAIC_W, MOSAIC_H));
    }

    #[test]
    fn centroid_of_empty_mask_is_none() {
        assert!(mask_centroid(&GrayImage::new(10, 10)).is_none());
    }
}
