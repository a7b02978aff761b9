//! Color gate and morphological cleanup.

use image::GrayImage;
use imageproc::distance_transform::Norm;

use crate::color::{percentile_u8, ColorPlanes};
use crate::detector::config::ColorGateParams;

/// The three binary gate masks (0/255), same size as the frame.
pub(crate) struct ColorMasks {
    /// Lab a-channel (redness) mask.
    pub redness: GrayImage,
    /// Hue-gated (or plain S/V) mask.
    pub hue: GrayImage,
    /// `redness AND hue`, denoised; the working mask for all later stages.
    pub combined: GrayImage,
}

/// Per-frame gate state worth diagnosing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GateStats {
    /// The percentile value actually measured on this frame.
    pub a_percentile_value: f32,
    /// Applied a-channel threshold: `max(a_min, percentile)`.
    pub a_threshold: u8,
}

/// Build the gate masks and clean the combined one.
///
/// The a-threshold adapts to per-frame exposure via the configured
/// percentile. Cleanup is a median blur plus a single opening; there is
/// deliberately no closing step — closing merges the ball with its floor
/// reflection and defeats the peanut split.
pub(crate) fn build_masks(planes: &ColorPlanes, cfg: &ColorGateParams) -> (ColorMasks, GateStats) {
    let (w, h) = planes.a.dimensions();

    let a_p = percentile_u8(&planes.a, cfg.a_percentile);
    let a_thr = (cfg.a_min as f32).max(a_p).min(255.0) as u8;

    let mut redness = GrayImage::new(w, h);
    let mut hue = GrayImage::new(w, h);

    let a_raw = planes.a.as_raw();
    let h_raw = planes.h.as_raw();
    let s_raw = planes.s.as_raw();
    let v_raw = planes.v.as_raw();
    {
        let red_raw: &mut [u8] = &mut redness;
        let hue_raw: &mut [u8] = &mut hue;
        for i in 0..a_raw.len() {
            if a_raw[i] >= a_thr {
                red_raw[i] = 255;
            }
            let sv_ok = s_raw[i] >= cfg.s_min && v_raw[i] >= cfg.v_min;
            let hue_ok = if cfg.hue_enabled {
                let hp = h_raw[i];
                hp <= cfg.h_red_max
                    || hp >= cfg.h_red_min2
                    || (hp >= cfg.h_orange_min && hp <= cfg.h_orange_max)
            } else {
                true
            };
            if sv_ok && hue_ok {
                hue_raw[i] = 255;
            }
        }
    }

    let mut combined = GrayImage::new(w, h);
    {
        let out: &mut [u8] = &mut combined;
        let r = redness.as_raw();
        let hu = hue.as_raw();
        for i in 0..out.len() {
            if r[i] != 0 && hu[i] != 0 {
                out[i] = 255;
            }
        }
    }

    // Median blur (5×5) kills speckle, then one 9×9 opening removes
    // anything smaller than ball scale without bridging adjacent blobs.
    let combined = imageproc::filter::median_filter(&combined, 2, 2);
    let combined = imageproc::morphology::open(&combined, Norm::LInf, 4);

    (
        ColorMasks {
            redness,
            hue,
            combined,
        },
        GateStats {
            a_percentile_value: a_p,
            a_threshold: a_thr,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{disc_frame, Disc};

    #[test]
    fn red_disc_survives_the_gate() {
        let frame = disc_frame(
            160,
            120,
            [60, 60, 60],
            &[Disc {
                cx: 80.0,
                cy: 60.0,
                r: 25.0,
                color: [230, 30, 25],
            }],
        );
        let planes = ColorPlanes::compute(&frame);
        let (masks, stats) = build_masks(&planes, &ColorGateParams::default());
        assert!(stats.a_threshold >= 135);
        let on = masks.combined.as_raw().iter().filter(|&&p| p != 0).count();
        // Opening erodes the rim a little; the bulk of the disc remains.
        let disc_area = std::f32::consts::PI * 25.0 * 25.0;
        assert!(on as f32 > disc_area * 0.7, "on = {on}");
        assert!((on as f32) < disc_area * 1.3, "on = {on}");
    }

    #[test]
    fn gray_frame_yields_empty_mask() {
        let frame = disc_frame(64, 48, [90, 90, 90], &[]);
        let planes = ColorPlanes::compute(&frame);
        let (masks, _) = build_masks(&planes, &ColorGateParams::default());
        assert!(masks.combined.as_raw().iter().all(|&p| p == 0));
    }

    #[test]
    fn speckle_is_removed() {
        let mut frame = disc_frame(64, 48, [60, 60, 60], &[]);
        // A couple of isolated red pixels: gated in, cleaned out.
        frame.put_pixel(10, 10, image::Rgb([230, 30, 25]));
        frame.put_pixel(40, 20, image::Rgb([230, 30, 25]));
        let planes = ColorPlanes::compute(&frame);
        let (masks, _) = build_masks(&planes, &ColorGateParams::default());
        assert!(masks.combined.as_raw().iter().all(|&p| p == 0));
    }
}
