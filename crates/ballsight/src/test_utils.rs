//! Shared test utilities for image-based unit tests.

use image::{GrayImage, Rgb, RgbImage};

/// A solid disc to paint on a synthetic frame.
pub(crate) struct Disc {
    pub cx: f32,
    pub cy: f32,
    pub r: f32,
    pub color: [u8; 3],
}

/// Render a uniform background with solid discs on top.
pub(crate) fn disc_frame(w: u32, h: u32, background: [u8; 3], discs: &[Disc]) -> RgbImage {
    let mut img = RgbImage::from_pixel(w, h, Rgb(background));
    for disc in discs {
        let r2 = disc.r * disc.r;
        for y in 0..h {
            let dy = y as f32 - disc.cy;
            for x in 0..w {
                let dx = x as f32 - disc.cx;
                if dx * dx + dy * dy <= r2 {
                    img.put_pixel(x, y, Rgb(disc.color));
                }
            }
        }
    }
    img
}

/// BT.601 gray plane of a frame.
pub(crate) fn gray_plane(frame: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(frame.width(), frame.height());
    for (src, dst) in frame.pixels().zip(out.pixels_mut()) {
        let [r, g, b] = src.0;
        dst.0 = [crate::color::luma601(r, g, b)];
    }
    out
}
