//! Criterion micro-benchmarks for the detection hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};

use ballsight::{DetectConfig, Detector};

fn synthetic_frame(w: u32, h: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(w, h, Rgb([60, 58, 55]));
    let discs = [
        (w as f32 * 0.5, h as f32 * 0.5, 36.0, [230u8, 30, 25]),
        (w as f32 * 0.5, h as f32 * 0.72, 34.0, [150, 25, 20]),
        (w as f32 * 0.2, h as f32 * 0.3, 14.0, [210, 90, 40]),
    ];
    for (cx, cy, r, color) in discs {
        let r2 = r * r;
        for y in 0..h {
            let dy = y as f32 - cy;
            for x in 0..w {
                let dx = x as f32 - cx;
                if dx * dx + dy * dy <= r2 {
                    img.put_pixel(x, y, Rgb(color));
                }
            }
        }
    }
    img
}

fn quiet_config() -> DetectConfig {
    let mut cfg = DetectConfig::default();
    cfg.log.enabled = false;
    cfg
}

fn bench_analyze(c: &mut Criterion) {
    let frame = synthetic_frame(640, 480);
    c.bench_function("analyze_640x480", |b| {
        let mut detector = Detector::with_config(quiet_config());
        b.iter(|| {
            let (ball, _) = detector.analyze(black_box(&frame));
            black_box(ball)
        });
    });
}

fn bench_analyze_empty(c: &mut Criterion) {
    let frame = RgbImage::from_pixel(640, 480, Rgb([20, 20, 20]));
    c.bench_function("analyze_empty_640x480", |b| {
        let mut detector = Detector::with_config(quiet_config());
        b.iter(|| {
            let (ball, _) = detector.analyze(black_box(&frame));
            black_box(ball)
        });
    });
}

criterion_group!(benches, bench_analyze, bench_analyze_empty);
criterion_main!(benches);
