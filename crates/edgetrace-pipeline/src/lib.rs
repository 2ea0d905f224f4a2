//! edgetrace-pipeline: Canny edge detection on integer grayscale grids
//! (sans-IO).
//!
//! Turns a grid of intensities in `[0, 255]` into boolean edge maps
//! through:
//! smoothing -> gradient -> non-maximum suppression -> threshold
//! selection -> hysteresis tracing.
//!
//! Every stage is a deterministic function of its input. Convolution,
//! gradient and suppression are parallelized across rows with `rayon`;
//! tracing is sequential. Automatic thresholds delegate to a
//! [`Clusterer`], supplied by the caller (`edgetrace-cluster` provides a
//! seeded k-means).
//!
//! This crate has **no I/O dependencies**: image decoding, clocks, and
//! output encoding live in `edgetrace-bench`.

pub mod convolve;
pub mod diagnostics;
pub mod gradient;
pub mod grid;
pub mod kernel;
pub mod pipeline;
pub mod suppress;
pub mod threshold;
pub mod trace;
pub mod types;

pub use gradient::{DerivativeRange, Direction, GradientField, Norm};
pub use grid::{Grid, GridError};
pub use kernel::{GradientOperator, Kernel, KernelError, Smoothing};
pub use pipeline::Pipeline;
pub use threshold::{
    AutoThreshold, ClusterError, ClusterRequest, Clusterer, NoClusterer, ThresholdMode,
    ThresholdPolicy, Thresholds,
};
pub use trace::{ComponentStats, EdgeClass};
pub use types::{
    ConfigError, Dimensions, EdgeCounts, EdgeDetection, PipelineConfig, PipelineError,
    StagedResult, ValidConfig,
};

/// Run the full edge detection pipeline.
///
/// Returns the edge, strong and weak grids, the pixel counts, and the
/// thresholds actually used. Output grids are smaller than `image` by
/// the combined contraction of the smoothing and gradient kernels (six
/// rows and columns with the default 5×5 Gaussian and Sobel).
///
/// `clusterer` is only consulted for
/// [`ThresholdMode::Automatic`]; pass [`NoClusterer`] otherwise.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for a bad configuration,
/// [`PipelineError::ImageTooLarge`],
/// [`PipelineError::IntensityOutOfRange`] or
/// [`PipelineError::KernelLargerThanImage`] for an unusable image, and
/// [`PipelineError::InsufficientContrast`] or
/// [`PipelineError::Clustering`] when automatic thresholds cannot be
/// derived.
pub fn detect(
    image: Grid<i32>,
    config: &PipelineConfig,
    clusterer: &dyn Clusterer,
) -> Result<EdgeDetection, PipelineError> {
    Ok(Pipeline::new(image, config)?
        .smooth()?
        .differentiate()?
        .suppress()
        .select_thresholds(clusterer)?
        .trace()
        .into_detection())
}

/// Run the full pipeline, keeping every intermediate grid.
///
/// # Errors
///
/// Same as [`detect`].
pub fn detect_staged(
    image: Grid<i32>,
    config: &PipelineConfig,
    clusterer: &dyn Clusterer,
) -> Result<StagedResult, PipelineError> {
    Ok(Pipeline::new(image, config)?
        .smooth()?
        .differentiate()?
        .suppress()
        .select_thresholds(clusterer)?
        .trace()
        .into_result())
}
