//! ballsight CLI — run the ball detector on image files.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use ballsight::{BallDetection, DetectConfig, Detector};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "ballsight")]
#[command(about = "Detect a red/orange ball in a color image (classical CV pipeline)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the ball in an image.
    Detect(DetectArgs),

    /// Print the default threshold configuration as JSON.
    Thresholds,
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Path to write the detection result (JSON).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to write the full diagnostics record (JSON).
    #[arg(long)]
    debug_json: Option<PathBuf>,

    /// Path to write the visualization mosaic (PNG).
    #[arg(long)]
    mosaic: Option<PathBuf>,

    /// Path to write the combined gate mask (PNG).
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Load a threshold configuration (JSON) instead of the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable the radial edge-symmetry gate.
    #[arg(long)]
    no_radial_gate: bool,

    /// Disable the detection text log.
    #[arg(long)]
    no_log: bool,
}

/// JSON payload written by `detect`.
#[derive(serde::Serialize)]
struct DetectOutput {
    detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ball: Option<BallDetection>,
    image_size: [u32; 2],
    contours_total: usize,
    considered: usize,
    strict: usize,
}

fn cmd_detect(args: &DetectArgs) -> CliResult<()> {
    let image = image::open(&args.image)?.to_rgb8();
    let (w, h) = image.dimensions();

    let mut config = match &args.config {
        Some(path) => serde_json::from_str::<DetectConfig>(&std::fs::read_to_string(path)?)?,
        None => DetectConfig::default(),
    };
    if args.no_log {
        config.log.enabled = false;
    }

    let mut detector = Detector::with_config(config);
    if args.no_radial_gate {
        detector.set_radial_gate_enabled(false);
    }

    let (ball, mask) = detector.analyze(&image);
    let record = detector.last_debug();

    match &ball {
        Some(b) => tracing::info!(
            x = b.x,
            y = b.y,
            r = b.r,
            "ball detected"
        ),
        None => tracing::info!("no ball"),
    }

    let output = DetectOutput {
        detected: ball.is_some(),
        ball,
        image_size: [w, h],
        contours_total: record.counts.contours_total,
        considered: record.counts.considered,
        strict: record.counts.strict,
    };
    let json = serde_json::to_string_pretty(&output)?;
    match &args.out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }

    if let Some(path) = &args.debug_json {
        std::fs::write(path, serde_json::to_string_pretty(record)?)?;
    }
    if let Some(path) = &args.mosaic {
        match &record.mosaic {
            Some(m) => m.save(path)?,
            None => tracing::warn!("no mosaic was produced"),
        }
    }
    if let Some(path) = &args.mask {
        match &mask {
            Some(m) => m.save(path)?,
            None => tracing::warn!("no mask was produced"),
        }
    }
    Ok(())
}

fn cmd_thresholds() -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&DetectConfig::default())?);
    Ok(())
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Detect(args) => cmd_detect(args),
        Commands::Thresholds => cmd_thresholds(),
    }
}
