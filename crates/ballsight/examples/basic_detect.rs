//! Minimal detection example: load an image, print the result.
//!
//! ```sh
//! cargo run --example basic_detect -- frame.png
//! ```

use ballsight::Detector;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: basic_detect <image>")?;
    let frame = image::open(&path)?.to_rgb8();

    let mut detector = Detector::new();
    let (ball, _mask) = detector.analyze(&frame);
    match ball {
        Some(b) => println!(
            "ball at ({:.1}, {:.1}) r={:.1} area={:.0} circ={:.3}",
            b.x, b.y, b.r, b.area, b.circularity
        ),
        None => println!("no ball"),
    }
    println!("--- diagnostics ---\n{}", detector.last_debug().summary);
    Ok(())
}
