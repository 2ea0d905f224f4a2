//! edgetrace-bench: CLI tool for edge detection experiments and diagnostics.
//!
//! Decodes an image file to grayscale, runs the edgetrace pipeline with
//! configurable parameters, and prints per-stage diagnostics. Useful for:
//!
//! - Comparing manual and automatic (k-means) thresholds
//! - Checking how smoothing, operator, and norm choices change edge counts
//! - Measuring per-stage durations on real images
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin edgetrace-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` (or pass `--verbose`) for stage-by-stage logs.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use edgetrace_cluster::KMeans;
use edgetrace_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use edgetrace_pipeline::{
    AutoThreshold, DerivativeRange, EdgeDetection, GradientOperator, Grid, Norm, PipelineConfig,
    Smoothing, ThresholdMode,
};

/// Canny edge detection experiments and diagnostics.
///
/// Runs the edgetrace pipeline on a grayscale rendering of the given image
/// and prints per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "edgetrace-bench", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Gradient magnitude norm.
    #[arg(long, value_enum, default_value_t = NormArg::L2)]
    norm: NormArg,

    /// Manual low threshold (requires --high). Omit both for automatic
    /// thresholds.
    #[arg(long, requires = "high", value_parser = clap::value_parser!(i32).range(0..=255))]
    low: Option<i32>,

    /// Manual high threshold (requires --low).
    #[arg(long, requires = "low", value_parser = clap::value_parser!(i32).range(0..=255))]
    high: Option<i32>,

    /// Drop connected edge components with fewer pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_EDGE_SIZE)]
    min_edge_size: usize,

    /// Smoothing kernel.
    #[arg(long, value_enum, default_value_t = SmoothingArg::Gaussian5x5)]
    smoothing: SmoothingArg,

    /// Standard deviation for `--smoothing gaussian`.
    #[arg(long, default_value_t = 1.4)]
    sigma: f64,

    /// Side length for `--smoothing box`.
    #[arg(long, default_value_t = 3)]
    box_size: usize,

    /// Derivative kernel pair.
    #[arg(long, value_enum, default_value_t = OperatorArg::Sobel)]
    operator: OperatorArg,

    /// Keep the sign of directional derivatives instead of clipping them.
    #[arg(long)]
    signed_derivatives: bool,

    /// k-means iteration cap for automatic thresholds.
    #[arg(long, default_value_t = AutoThreshold::DEFAULT_MAX_ITERATIONS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    iterations: usize,

    /// k-means convergence tolerance for automatic thresholds.
    #[arg(long, default_value_t = AutoThreshold::DEFAULT_EPSILON)]
    epsilon: f64,

    /// Seed k-means with uniformly drawn points instead of k-means++.
    #[arg(long)]
    no_plus_plus: bool,

    /// k-means RNG seed.
    #[arg(long, default_value_t = KMeans::DEFAULT_SEED)]
    seed: u64,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the final edge map as a PNG (edges white).
    #[arg(long)]
    edges: Option<PathBuf>,

    /// Write the hysteresis classes as a PNG (strong white, weak gray).
    #[arg(long)]
    classes: Option<PathBuf>,

    /// Log pipeline stages at debug level.
    #[arg(long, short)]
    verbose: bool,
}

/// Gradient norm selection.
#[derive(Clone, Copy, ValueEnum)]
enum NormArg {
    /// |Gx| + |Gy|.
    L1,
    /// Euclidean length, rounded.
    L2,
}

/// Smoothing kernel selection.
#[derive(Clone, Copy, ValueEnum)]
enum SmoothingArg {
    /// Fixed 5x5 Gaussian (sigma about 1.4).
    Gaussian5x5,
    /// Sampled Gaussian with `--sigma`.
    Gaussian,
    /// Averaging kernel with `--box-size`.
    Box,
    /// No smoothing.
    None,
}

/// Derivative operator selection.
#[derive(Clone, Copy, ValueEnum)]
enum OperatorArg {
    /// Sobel kernels.
    Sobel,
    /// Prewitt kernels.
    Prewitt,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let thresholds = match (cli.low, cli.high) {
        (Some(low), Some(high)) => ThresholdMode::Manual { low, high },
        _ => ThresholdMode::Automatic(AutoThreshold {
            max_iterations: cli.iterations,
            epsilon: cli.epsilon,
            plus_plus: !cli.no_plus_plus,
        }),
    };

    Ok(PipelineConfig {
        smoothing: match cli.smoothing {
            SmoothingArg::Gaussian5x5 => Smoothing::Gaussian5x5,
            SmoothingArg::Gaussian => Smoothing::Gaussian { sigma: cli.sigma },
            SmoothingArg::Box => Smoothing::Box { size: cli.box_size },
            SmoothingArg::None => Smoothing::None,
        },
        operator: match cli.operator {
            OperatorArg::Sobel => GradientOperator::Sobel,
            OperatorArg::Prewitt => GradientOperator::Prewitt,
        },
        norm: match cli.norm {
            NormArg::L1 => Norm::L1,
            NormArg::L2 => Norm::L2,
        },
        derivatives: if cli.signed_derivatives {
            DerivativeRange::Signed
        } else {
            DerivativeRange::Clipped
        },
        thresholds,
        min_edge_size: cli.min_edge_size,
    })
}

/// Decode an image file into a grayscale intensity grid.
fn load_grid(path: &Path) -> Result<Grid<i32>, String> {
    let gray = image::open(path)
        .map_err(|e| format!("Error decoding {}: {e}", path.display()))?
        .to_luma8();
    let (width, height) = gray.dimensions();
    let rows = usize::try_from(height).map_err(|e| e.to_string())?;
    let cols = usize::try_from(width).map_err(|e| e.to_string())?;
    let data = gray.into_raw().into_iter().map(i32::from).collect();
    Grid::from_vec(rows, cols, data).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

/// Render a grid as an 8-bit grayscale PNG.
fn write_png<T>(path: &Path, grid: &Grid<T>, shade: impl Fn(&T) -> u8) -> Result<(), String> {
    let width = u32::try_from(grid.cols()).map_err(|e| e.to_string())?;
    let height = u32::try_from(grid.rows()).map_err(|e| e.to_string())?;
    let pixels = grid.iter().map(shade).collect();
    let image = image::GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| format!("{width}x{height} buffer does not match grid"))?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))
}

/// Write the requested PNG outputs for one detection.
fn write_outputs(cli: &Cli, detection: &EdgeDetection) -> Result<(), String> {
    if let Some(ref path) = cli.edges {
        write_png(path, &detection.edges, |&e| if e { 255 } else { 0 })?;
        eprintln!("Edge map written to {}", path.display());
    }
    if let Some(ref path) = cli.classes {
        let classes: Vec<u8> = detection
            .strong
            .iter()
            .zip(detection.weak.iter())
            .map(|(&s, &w)| if s { 255 } else if w { 128 } else { 0 })
            .collect();
        let classes = Grid::from_vec(detection.strong.rows(), detection.strong.cols(), classes)
            .map_err(|e| e.to_string())?;
        write_png(path, &classes, |&v| v)?;
        eprintln!("Class map written to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match load_grid(&cli.image_path) {
        Ok(grid) => grid,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({})",
        cli.image_path.display(),
        image.dimensions(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let clusterer = KMeans::new(cli.seed);
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match edgetrace_pipeline::diagnostics::detect_with_diagnostics(
            image.clone(),
            &config,
            &clusterer,
            &StdClock,
        ) {
            Ok((staged, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write images on the first run only.
                if run == 0
                    && let Err(msg) = write_outputs(&cli, &staged.detection)
                {
                    eprintln!("{msg}");
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(32));

    let Some(first) = all_diagnostics.first() else {
        return;
    };
    for (index, (name, _)) in first.stages().iter().enumerate() {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[index].1.duration.as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
