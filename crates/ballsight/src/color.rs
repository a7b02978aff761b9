//! Per-frame color plane extraction.
//!
//! The gate thresholds are calibrated in 8-bit OpenCV units, so the
//! conversions here reproduce that convention: Lab `a` is offset by +128,
//! hue lives in `[0, 180)`, and the gray plane uses BT.601 luma weights.

use image::{GrayImage, RgbImage};

/// Single-channel planes derived from one input frame.
///
/// Recomputed on every call; same dimensions as the frame.
pub(crate) struct ColorPlanes {
    /// Lab a-channel (green–red chroma), 8-bit offset units.
    pub a: GrayImage,
    /// Hue in `[0, 180)`.
    pub h: GrayImage,
    /// Saturation.
    pub s: GrayImage,
    /// Value (brightness).
    pub v: GrayImage,
    /// BT.601 luma, used by edge-based metrics and refinement.
    pub gray: GrayImage,
}

impl ColorPlanes {
    pub fn compute(frame: &RgbImage) -> Self {
        let (w, h) = frame.dimensions();
        let n = (w * h) as usize;
        let mut a_buf = vec![0u8; n];
        let mut h_buf = vec![0u8; n];
        let mut s_buf = vec![0u8; n];
        let mut v_buf = vec![0u8; n];
        let mut g_buf = vec![0u8; n];

        for (i, px) in frame.pixels().enumerate() {
            let [r, g, b] = px.0;
            a_buf[i] = lab_a_u8(r, g, b);
            let (hh, ss, vv) = rgb_to_hsv_u8(r, g, b);
            h_buf[i] = hh;
            s_buf[i] = ss;
            v_buf[i] = vv;
            g_buf[i] = luma601(r, g, b);
        }

        let plane = |buf: Vec<u8>| {
            GrayImage::from_raw(w, h, buf).expect("plane buffer sized from frame dimensions")
        };
        Self {
            a: plane(a_buf),
            h: plane(h_buf),
            s: plane(s_buf),
            v: plane(v_buf),
            gray: plane(g_buf),
        }
    }
}

/// BT.601 grayscale conversion.
pub(crate) fn luma601(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// sRGB → HSV with H halved into `[0, 180)` and S/V in `[0, 255]`.
pub(crate) fn rgb_to_hsv_u8(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let h360 = if delta <= f32::EPSILON {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta).rem_euclid(6.0))
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let h = (h360 / 2.0).round();
    let h = if h >= 180.0 { 0.0 } else { h };

    (
        h as u8,
        s.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

/// sRGB → CIELab a-channel, offset to the 8-bit convention (`a* + 128`).
pub(crate) fn lab_a_u8(r: u8, g: u8, b: u8) -> u8 {
    let rl = srgb_to_linear(r);
    let gl = srgb_to_linear(g);
    let bl = srgb_to_linear(b);

    // D65 white point.
    let x = (0.412453 * rl + 0.357580 * gl + 0.180423 * bl) / 0.950456;
    let y = 0.212671 * rl + 0.715160 * gl + 0.072169 * bl;

    let a = 500.0 * (lab_f(x) - lab_f(y));
    (a + 128.0).round().clamp(0.0, 255.0) as u8
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f32) -> f32 {
    if t > 0.008856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

/// Value below which `fraction` of the plane's pixels lie (nearest-rank over
/// the 256-bin histogram). Returns 0.0 for an empty plane.
pub(crate) fn percentile_u8(plane: &GrayImage, percentile: f32) -> f32 {
    let total = plane.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let mut hist = [0usize; 256];
    for &p in plane.as_raw() {
        hist[p as usize] += 1;
    }
    let rank = ((percentile.clamp(0.0, 100.0) / 100.0) * total as f32).ceil() as usize;
    let rank = rank.max(1);
    let mut cum = 0usize;
    for (value, &count) in hist.iter().enumerate() {
        cum += count;
        if cum >= rank {
            return value as f32;
        }
    }
    255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_red_is_strongly_chromatic() {
        // Saturated red: a-channel well above the 135 gate, hue at 0.
        let a = lab_a_u8(230, 30, 25);
        assert!(a > 170, "a = {a}");
        let (h, s, v) = rgb_to_hsv_u8(230, 30, 25);
        assert!(h <= 2, "h = {h}");
        assert!(s > 200);
        assert_eq!(v, 230);
    }

    #[test]
    fn gray_pixels_sit_at_the_a_offset() {
        for level in [0u8, 60, 128, 255] {
            let a = lab_a_u8(level, level, level);
            assert!((a as i16 - 128).abs() <= 1, "a({level}) = {a}");
        }
        let (h, s, _) = rgb_to_hsv_u8(77, 77, 77);
        assert_eq!((h, s), (0, 0));
    }

    #[test]
    fn hue_wraps_into_opencv_range() {
        // Blue-ish magenta lands in the upper red band, never at 180.
        let (h, _, _) = rgb_to_hsv_u8(200, 20, 180);
        assert!(h >= 155 && h < 180, "h = {h}");
    }

    #[test]
    fn percentile_tracks_histogram() {
        let mut img = GrayImage::new(10, 10);
        for (i, p) in img.pixels_mut().enumerate() {
            p.0 = [i as u8];
        }
        assert_eq!(percentile_u8(&img, 97.0), 96.0);
        assert_eq!(percentile_u8(&img, 100.0), 99.0);
        let flat = GrayImage::from_pixel(4, 4, image::Luma([7]));
        assert_eq!(percentile_u8(&flat, 50.0), 7.0);
    }
}
