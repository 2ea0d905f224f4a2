//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate grid before continuing.
//!
//! [`detect`](crate::detect) runs the whole chain in one call.
//! [`Pipeline`] lets the caller drive it one step at a time:
//!
//! ```rust
//! # use edgetrace_pipeline::{Grid, NoClusterer, Pipeline, PipelineConfig, PipelineError, ThresholdMode};
//! # fn main() -> Result<(), PipelineError> {
//! let image = Grid::from_fn(12, 12, |_, c| if c < 6 { 0 } else { 200 })?;
//! let config = PipelineConfig {
//!     thresholds: ThresholdMode::Manual { low: 20, high: 60 },
//!     ..PipelineConfig::default()
//! };
//! let staged = Pipeline::new(image, &config)?
//!     .smooth()?
//!     .differentiate()?
//!     .suppress()
//!     .select_thresholds(&NoClusterer)?
//!     .trace()
//!     .into_result();
//!
//! assert_eq!(staged.detection.dimensions().rows, 6);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state (or a
//! `Result` for fallible stages). All validation happens in
//! [`Pipeline::new`], so the only later failures are those that depend on
//! the data: threshold selection against a degenerate magnitude grid, or
//! a failing clusterer.

use crate::convolve::convolve;
use crate::diagnostics::StageMetrics;
use crate::gradient::GradientField;
use crate::grid::Grid;
use crate::threshold::{Clusterer, ThresholdPolicy, Thresholds};
use crate::trace::{ComponentStats, EdgeClass};
use crate::types::{
    Dimensions, EdgeCounts, EdgeDetection, MAX_INTENSITY, MAX_PIXELS, PipelineConfig,
    PipelineError, StagedResult, ValidConfig,
};

/// Entry point for the incremental pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Validate `config` and `image` and return the first stage.
    ///
    /// Checks run in order: configuration, image size limit, intensity
    /// range, then whether the image covers the combined footprint of the
    /// smoothing and gradient kernels.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`],
    /// [`PipelineError::ImageTooLarge`],
    /// [`PipelineError::IntensityOutOfRange`] (for the first offending
    /// cell in row-major order) or [`PipelineError::KernelLargerThanImage`].
    pub fn new(image: Grid<i32>, config: &PipelineConfig) -> Result<Pending, PipelineError> {
        let config = config.validate()?;

        if image.len() > MAX_PIXELS {
            return Err(PipelineError::ImageTooLarge {
                pixels: image.len(),
                max: MAX_PIXELS,
            });
        }

        if let Some((index, &value)) = image
            .iter()
            .enumerate()
            .find(|(_, v)| !(0..=MAX_INTENSITY).contains(*v))
        {
            return Err(PipelineError::IntensityOutOfRange {
                row: index / image.cols(),
                col: index % image.cols(),
                value,
            });
        }

        let footprint = config.min_input();
        if image.rows() < footprint.rows || image.cols() < footprint.cols {
            return Err(PipelineError::KernelLargerThanImage {
                kernel: footprint,
                image: image.dimensions(),
            });
        }

        Ok(Pending { config, image })
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Validated input, before any processing.
///
/// Call [`smooth`](Self::smooth) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .smooth() to continue"]
#[derive(Debug)]
pub struct Pending {
    config: ValidConfig,
    image: Grid<i32>,
}

impl Pending {
    /// The input grid.
    #[must_use]
    pub const fn image(&self) -> &Grid<i32> {
        &self.image
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &ValidConfig {
        &self.config
    }

    /// Convolve the input with the smoothing kernel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::KernelLargerThanImage`] if the kernel does
    /// not fit, which [`Pipeline::new`] already rules out.
    pub fn smooth(self) -> Result<Smoothed, PipelineError> {
        let smoothed = convolve(&self.image, self.config.smoothing_kernel())?;
        log::debug!(
            "smoothed {} input with {:?} -> {}",
            self.image.dimensions(),
            self.config.config().smoothing,
            smoothed.dimensions(),
        );
        Ok(Smoothed {
            config: self.config,
            input_dimensions: self.image.dimensions(),
            smoothed,
        })
    }
}

// ───────────────────────── Stage 1: Smoothed ─────────────────────────

/// Pipeline state after smoothing.
///
/// Call [`differentiate`](Self::differentiate) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .differentiate() to continue"]
#[derive(Debug)]
pub struct Smoothed {
    config: ValidConfig,
    input_dimensions: Dimensions,
    smoothed: Grid<i32>,
}

impl Smoothed {
    /// The smoothed grid.
    #[must_use]
    pub const fn smoothed(&self) -> &Grid<i32> {
        &self.smoothed
    }

    /// Metrics for this stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let kernel = self.config.smoothing_kernel();
        StageMetrics::Smoothing {
            input: self.input_dimensions,
            kernel: Dimensions {
                rows: kernel.rows(),
                cols: kernel.cols(),
            },
            output: self.smoothed.dimensions(),
        }
    }

    /// Compute derivatives, magnitude and direction.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::KernelLargerThanImage`] if the smoothed
    /// grid is smaller than the gradient kernels, which
    /// [`Pipeline::new`] already rules out.
    pub fn differentiate(self) -> Result<Differentiated, PipelineError> {
        let config = self.config.config();
        let gradient =
            GradientField::compute(&self.smoothed, config.operator, config.norm, config.derivatives)?;
        log::debug!(
            "{:?} gradient ({:?}, {:?} derivatives) over {}",
            config.operator,
            config.norm,
            config.derivatives,
            gradient.magnitude.dimensions(),
        );
        Ok(Differentiated {
            config: self.config,
            input_dimensions: self.input_dimensions,
            smoothed: self.smoothed,
            gradient,
        })
    }
}

// ───────────────────────── Stage 2: Differentiated ───────────────────

/// Pipeline state after the gradient stage.
///
/// Call [`suppress`](Self::suppress) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .suppress() to continue"]
#[derive(Debug)]
pub struct Differentiated {
    config: ValidConfig,
    input_dimensions: Dimensions,
    smoothed: Grid<i32>,
    gradient: GradientField,
}

impl Differentiated {
    /// The gradient field.
    #[must_use]
    pub const fn gradient(&self) -> &GradientField {
        &self.gradient
    }

    /// Metrics for this stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let config = self.config.config();
        StageMetrics::Gradient {
            operator: config.operator,
            norm: config.norm,
            derivatives: config.derivatives,
            max_magnitude: self.gradient.magnitude.iter().copied().max().unwrap_or(0),
            nonzero: count_nonzero(&self.gradient.magnitude),
        }
    }

    /// Thin ridges with non-maximum suppression.
    pub fn suppress(self) -> Suppressed {
        let suppressed = crate::suppress::suppress(&self.gradient);
        log::debug!(
            "suppression kept {} of {} nonzero magnitudes",
            count_nonzero(&suppressed),
            count_nonzero(&self.gradient.magnitude),
        );
        Suppressed {
            config: self.config,
            input_dimensions: self.input_dimensions,
            smoothed: self.smoothed,
            gradient: self.gradient,
            suppressed,
        }
    }
}

// ───────────────────────── Stage 3: Suppressed ───────────────────────

/// Pipeline state after non-maximum suppression.
///
/// Call [`select_thresholds`](Self::select_thresholds) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .select_thresholds() to continue"]
#[derive(Debug)]
pub struct Suppressed {
    config: ValidConfig,
    input_dimensions: Dimensions,
    smoothed: Grid<i32>,
    gradient: GradientField,
    suppressed: Grid<i32>,
}

impl Suppressed {
    /// Magnitudes after suppression.
    #[must_use]
    pub const fn suppressed(&self) -> &Grid<i32> {
        &self.suppressed
    }

    /// Metrics for this stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Suppression {
            nonzero_before: count_nonzero(&self.gradient.magnitude),
            nonzero_after: count_nonzero(&self.suppressed),
        }
    }

    /// Choose hysteresis thresholds and classify every pixel.
    ///
    /// `clusterer` is consulted only for automatic thresholds; pass
    /// [`NoClusterer`](crate::NoClusterer) for manual ones.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InsufficientContrast`] or
    /// [`PipelineError::Clustering`] when automatic selection fails.
    pub fn select_thresholds(self, clusterer: &dyn Clusterer) -> Result<Thresholded, PipelineError> {
        let thresholds =
            crate::threshold::select_thresholds(&self.suppressed, self.config.thresholds(), clusterer)?;
        let classes = crate::trace::classify(&self.suppressed, thresholds);
        log::debug!(
            "thresholds low={} high={} ({})",
            thresholds.low(),
            thresholds.high(),
            policy_name(self.config.thresholds()),
        );
        Ok(Thresholded {
            config: self.config,
            input_dimensions: self.input_dimensions,
            smoothed: self.smoothed,
            gradient: self.gradient,
            suppressed: self.suppressed,
            thresholds,
            classes,
        })
    }
}

// ───────────────────────── Stage 4: Thresholded ──────────────────────

/// Pipeline state after threshold selection.
///
/// Call [`trace`](Self::trace) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .trace() to continue"]
#[derive(Debug)]
pub struct Thresholded {
    config: ValidConfig,
    input_dimensions: Dimensions,
    smoothed: Grid<i32>,
    gradient: GradientField,
    suppressed: Grid<i32>,
    thresholds: Thresholds,
    classes: Grid<EdgeClass>,
}

impl Thresholded {
    /// Thresholds in use, supplied or computed.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Per-pixel hysteresis class.
    #[must_use]
    pub const fn classes(&self) -> &Grid<EdgeClass> {
        &self.classes
    }

    /// Metrics for this stage.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let (strong, weak) = class_counts(&self.classes);
        StageMetrics::Thresholding {
            low: self.thresholds.low(),
            high: self.thresholds.high(),
            automatic: matches!(self.config.thresholds(), ThresholdPolicy::Automatic(_)),
            strong,
            weak,
        }
    }

    /// Trace edge components and apply the size filter.
    pub fn trace(self) -> Traced {
        let min_edge_size = self.config.config().min_edge_size;
        let outcome = crate::trace::trace(&self.classes, min_edge_size);
        let (strong, weak) = class_counts(&self.classes);
        let counts = EdgeCounts {
            strong,
            weak,
            edges: outcome.edges.count_true(),
        };
        log_trace(&outcome.components, counts, min_edge_size);

        let detection = EdgeDetection {
            edges: outcome.edges,
            strong: self.classes.map(|&c| c == EdgeClass::Strong),
            weak: self.classes.map(|&c| c == EdgeClass::Weak),
            thresholds: self.thresholds,
            counts,
            components: outcome.components,
        };
        Traced {
            input_dimensions: self.input_dimensions,
            smoothed: self.smoothed,
            gradient: self.gradient,
            suppressed: self.suppressed,
            classes: self.classes,
            detection,
        }
    }
}

// ───────────────────────── Stage 5: Traced ───────────────────────────

/// Final pipeline state.
///
/// Call [`into_result`](Self::into_result) for every intermediate, or
/// [`into_detection`](Self::into_detection) for the edge maps alone.
#[must_use = "call .into_result() or .into_detection() to take the output"]
#[derive(Debug)]
pub struct Traced {
    input_dimensions: Dimensions,
    smoothed: Grid<i32>,
    gradient: GradientField,
    suppressed: Grid<i32>,
    classes: Grid<EdgeClass>,
    detection: EdgeDetection,
}

impl Traced {
    /// The edge maps, counts, and thresholds.
    #[must_use]
    pub const fn detection(&self) -> &EdgeDetection {
        &self.detection
    }

    /// Metrics for this stage.
    #[must_use]
    pub const fn metrics(&self) -> StageMetrics {
        let components = self.detection.components;
        StageMetrics::Tracing {
            kept: components.kept,
            discarded: components.discarded,
            largest: components.largest,
            edge_pixels: self.detection.counts.edges,
            total_pixels: self.detection.edges.len(),
        }
    }

    /// Consume the pipeline, keeping every intermediate.
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            input_dimensions: self.input_dimensions,
            smoothed: self.smoothed,
            gradient: self.gradient,
            suppressed: self.suppressed,
            classes: self.classes,
            detection: self.detection,
        }
    }

    /// Consume the pipeline, keeping only the final output.
    pub fn into_detection(self) -> EdgeDetection {
        self.detection
    }
}

fn count_nonzero(grid: &Grid<i32>) -> usize {
    grid.iter().filter(|&&v| v != 0).count()
}

fn class_counts(classes: &Grid<EdgeClass>) -> (usize, usize) {
    classes
        .iter()
        .fold((0, 0), |(strong, weak), class| match class {
            EdgeClass::Strong => (strong + 1, weak),
            EdgeClass::Weak => (strong, weak + 1),
            EdgeClass::None => (strong, weak),
        })
}

const fn policy_name(policy: &ThresholdPolicy) -> &'static str {
    match policy {
        ThresholdPolicy::Manual(_) => "manual",
        ThresholdPolicy::Automatic(_) => "automatic",
    }
}

fn log_trace(components: &ComponentStats, counts: EdgeCounts, min_edge_size: usize) {
    log::debug!(
        "traced {} components ({} discarded, largest {}), {} edge pixels from {} strong / {} weak",
        components.kept,
        components.discarded,
        components.largest,
        counts.edges,
        counts.strong,
        counts.weak,
    );
    if components.kept == 0 && components.discarded > 0 {
        log::warn!(
            "all {} components are smaller than min_edge_size={min_edge_size}; edge map is empty",
            components.discarded,
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gradient::{DerivativeRange, Norm};
    use crate::kernel::{GradientOperator, Smoothing};
    use crate::threshold::{AutoThreshold, ClusterError, ClusterRequest, NoClusterer, ThresholdMode};
    use crate::types::ConfigError;

    fn manual(low: i32, high: i32) -> PipelineConfig {
        PipelineConfig {
            smoothing: Smoothing::None,
            thresholds: ThresholdMode::Manual { low, high },
            min_edge_size: 1,
            ..PipelineConfig::default()
        }
    }

    fn step(rows: usize, cols: usize, at: usize) -> Grid<i32> {
        Grid::from_fn(rows, cols, |_, c| if c < at { 0 } else { 255 }).unwrap()
    }

    #[test]
    fn new_rejects_bad_config_before_touching_pixels() {
        // The image is also out of range; the config error wins.
        let image = Grid::filled(2, 2, 999).unwrap();
        let result = Pipeline::new(image, &manual(50, 10));
        assert!(matches!(
            result,
            Err(PipelineError::InvalidConfig(ConfigError::LowAboveHigh { .. }))
        ));
    }

    #[test]
    fn new_reports_first_out_of_range_intensity() {
        let image = Grid::from_fn(4, 4, |r, c| match (r, c) {
            (1, 2) => 256,
            (3, 0) => -1,
            _ => 0,
        })
        .unwrap();
        assert_eq!(
            Pipeline::new(image, &manual(1, 2)).unwrap_err(),
            PipelineError::IntensityOutOfRange {
                row: 1,
                col: 2,
                value: 256
            }
        );
    }

    #[test]
    fn new_rejects_images_smaller_than_the_footprint() {
        let config = PipelineConfig {
            thresholds: ThresholdMode::Manual { low: 1, high: 2 },
            ..PipelineConfig::default()
        };
        let image = Grid::filled(6, 20, 0).unwrap();
        assert_eq!(
            Pipeline::new(image, &config).unwrap_err(),
            PipelineError::KernelLargerThanImage {
                kernel: Dimensions { rows: 7, cols: 7 },
                image: Dimensions { rows: 6, cols: 20 },
            }
        );
        // Exactly the footprint yields a single output pixel.
        let image = Grid::filled(7, 7, 0).unwrap();
        let staged = Pipeline::new(image, &config)
            .unwrap()
            .smooth()
            .unwrap()
            .differentiate()
            .unwrap()
            .suppress()
            .select_thresholds(&NoClusterer)
            .unwrap()
            .trace()
            .into_result();
        assert_eq!(staged.detection.dimensions(), Dimensions { rows: 1, cols: 1 });
    }

    #[test]
    fn stages_expose_intermediates() {
        let smoothed = Pipeline::new(step(6, 8, 4), &manual(10, 100))
            .unwrap()
            .smooth()
            .unwrap();
        assert_eq!(smoothed.smoothed(), &step(6, 8, 4));

        let differentiated = smoothed.differentiate().unwrap();
        assert_eq!(
            differentiated.gradient().magnitude.row(0),
            Some(&[0, 0, 255, 255, 0, 0][..])
        );

        let suppressed = differentiated.suppress();
        // Equal neighbors in the band do not suppress each other.
        assert_eq!(suppressed.suppressed().row(3), Some(&[0, 0, 255, 255, 0, 0][..]));

        let thresholded = suppressed.select_thresholds(&NoClusterer).unwrap();
        assert_eq!(thresholded.thresholds(), Thresholds::new(10, 100).unwrap());

        let traced = thresholded.trace();
        let detection = traced.detection();
        assert_eq!(detection.counts, EdgeCounts { strong: 8, weak: 0, edges: 8 });
        assert_eq!(detection.strong, detection.edges);
        assert_eq!(detection.weak.count_true(), 0);
    }

    #[test]
    fn metrics_describe_each_stage() {
        let smoothed = Pipeline::new(step(6, 8, 4), &manual(10, 100))
            .unwrap()
            .smooth()
            .unwrap();
        assert!(matches!(
            smoothed.metrics(),
            StageMetrics::Smoothing {
                kernel: Dimensions { rows: 1, cols: 1 },
                ..
            }
        ));
        let differentiated = smoothed.differentiate().unwrap();
        assert!(matches!(
            differentiated.metrics(),
            StageMetrics::Gradient {
                operator: GradientOperator::Sobel,
                norm: Norm::L2,
                derivatives: DerivativeRange::Clipped,
                max_magnitude: 255,
                nonzero: 8,
            }
        ));
        let suppressed = differentiated.suppress();
        assert!(matches!(
            suppressed.metrics(),
            StageMetrics::Suppression {
                nonzero_before: 8,
                nonzero_after: 8
            }
        ));
        let thresholded = suppressed.select_thresholds(&NoClusterer).unwrap();
        assert!(matches!(
            thresholded.metrics(),
            StageMetrics::Thresholding {
                automatic: false,
                strong: 8,
                weak: 0,
                ..
            }
        ));
        assert!(matches!(
            thresholded.trace().metrics(),
            StageMetrics::Tracing {
                kept: 1,
                edge_pixels: 8,
                total_pixels: 24,
                ..
            }
        ));
    }

    struct Fixed(Vec<f64>);

    impl Clusterer for Fixed {
        fn cluster(
            &self,
            _points: &[f64],
            _request: &ClusterRequest,
        ) -> Result<Vec<f64>, ClusterError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn automatic_thresholds_flow_into_the_result() {
        // Three steps of different heights: suppressed magnitudes 0, 40,
        // 120 and 240.
        let levels = [0, 0, 0, 10, 10, 10, 40, 40, 40, 100, 100, 100];
        let image = Grid::from_fn(6, 12, |_, c| levels[c]).unwrap();
        let config = PipelineConfig {
            smoothing: Smoothing::None,
            thresholds: ThresholdMode::Automatic(AutoThreshold::default()),
            ..PipelineConfig::default()
        };
        let distinct = Pipeline::new(image.clone(), &config)
            .unwrap()
            .smooth()
            .unwrap()
            .differentiate()
            .unwrap()
            .suppress()
            .suppressed()
            .iter()
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        assert_eq!(distinct, 4);

        let detection = Pipeline::new(image, &config)
            .unwrap()
            .smooth()
            .unwrap()
            .differentiate()
            .unwrap()
            .suppress()
            .select_thresholds(&Fixed(vec![40.9, 12.3, 250.0]))
            .unwrap()
            .trace()
            .into_detection();
        assert_eq!(detection.thresholds, Thresholds::new(12, 40).unwrap());
    }

    #[test]
    fn flat_image_with_automatic_thresholds_lacks_contrast() {
        let config = PipelineConfig {
            thresholds: ThresholdMode::Automatic(AutoThreshold::default()),
            ..PipelineConfig::default()
        };
        let result = Pipeline::new(Grid::filled(10, 10, 128).unwrap(), &config)
            .unwrap()
            .smooth()
            .unwrap()
            .differentiate()
            .unwrap()
            .suppress()
            .select_thresholds(&Fixed(vec![0.0, 0.0, 0.0]));
        assert_eq!(
            result.unwrap_err(),
            PipelineError::InsufficientContrast {
                distinct: 1,
                clusters: 3
            }
        );
    }
}
