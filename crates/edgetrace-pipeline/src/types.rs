//! Shared types for the edgetrace pipeline.

use serde::{Deserialize, Serialize};

use crate::gradient::{DerivativeRange, GradientField, Norm};
use crate::grid::{Grid, GridError};
use crate::kernel::{GradientOperator, Kernel, KernelError, Smoothing};
use crate::threshold::{AutoThreshold, ClusterError, ThresholdMode, ThresholdPolicy, Thresholds};
use crate::trace::{ComponentStats, EdgeClass};

/// Largest intensity a grid cell may hold.
pub const MAX_INTENSITY: i32 = 255;

/// Largest accepted input, in pixels.
pub const MAX_PIXELS: usize = 1 << 28;

/// Grid dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl Dimensions {
    /// Total number of cells.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.rows * self.cols
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Configuration for the edge detection pipeline.
///
/// Fields are public and unvalidated; [`PipelineConfig::validate`]
/// turns a config into a [`ValidConfig`] or a [`ConfigError`] before any
/// pixel is touched. [`Pipeline::new`](crate::Pipeline::new) calls it for
/// you.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Smoothing kernel applied to the input before differentiation.
    pub smoothing: Smoothing,

    /// Derivative kernel pair used for the gradient.
    pub operator: GradientOperator,

    /// How `Gx` and `Gy` combine into a magnitude.
    pub norm: Norm,

    /// Whether directional derivatives are clipped to `[0, 255]` like
    /// every other convolution, or kept signed.
    pub derivatives: DerivativeRange,

    /// Manual or automatic hysteresis thresholds.
    pub thresholds: ThresholdMode,

    /// Connected edge components with fewer pixels are dropped.
    pub min_edge_size: usize,
}

impl PipelineConfig {
    /// Default smoothing kernel.
    pub const DEFAULT_SMOOTHING: Smoothing = Smoothing::Gaussian5x5;

    /// Default gradient norm.
    pub const DEFAULT_NORM: Norm = Norm::L2;

    /// Default minimum component size (keep everything).
    pub const DEFAULT_MIN_EDGE_SIZE: usize = 0;

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ThresholdOutOfRange`] or
    /// [`ConfigError::LowAboveHigh`] for bad manual thresholds,
    /// [`ConfigError::InvalidSmoothing`] for a smoothing kernel that
    /// cannot be built, and [`ConfigError::InvalidAutoThreshold`] for bad
    /// clustering parameters.
    pub fn validate(&self) -> Result<ValidConfig, ConfigError> {
        let thresholds = match self.thresholds {
            ThresholdMode::Manual { low, high } => {
                ThresholdPolicy::Manual(Thresholds::new(low, high)?)
            }
            ThresholdMode::Automatic(auto) => ThresholdPolicy::Automatic(auto.validated()?),
        };
        let smoothing_kernel = self.smoothing.kernel()?;
        Ok(ValidConfig {
            config: self.clone(),
            smoothing_kernel,
            thresholds,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            smoothing: Self::DEFAULT_SMOOTHING,
            operator: GradientOperator::default(),
            norm: Self::DEFAULT_NORM,
            derivatives: DerivativeRange::default(),
            thresholds: ThresholdMode::Automatic(AutoThreshold::default()),
            min_edge_size: Self::DEFAULT_MIN_EDGE_SIZE,
        }
    }
}

/// A [`PipelineConfig`] that passed validation, with its kernels resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidConfig {
    config: PipelineConfig,
    smoothing_kernel: Kernel,
    thresholds: ThresholdPolicy,
}

impl ValidConfig {
    /// The configuration as supplied.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The resolved smoothing kernel.
    #[must_use]
    pub const fn smoothing_kernel(&self) -> &Kernel {
        &self.smoothing_kernel
    }

    /// The validated threshold policy.
    #[must_use]
    pub const fn thresholds(&self) -> &ThresholdPolicy {
        &self.thresholds
    }

    /// Rows and columns the smoothing and gradient convolutions remove
    /// from the input, in total.
    #[must_use]
    pub fn contraction(&self) -> Dimensions {
        let gx = self.config.operator.x_kernel();
        Dimensions {
            rows: (self.smoothing_kernel.rows() - 1) + (gx.rows() - 1),
            cols: (self.smoothing_kernel.cols() - 1) + (gx.cols() - 1),
        }
    }

    /// Smallest input the pipeline accepts.
    #[must_use]
    pub fn min_input(&self) -> Dimensions {
        let contraction = self.contraction();
        Dimensions {
            rows: contraction.rows + 1,
            cols: contraction.cols + 1,
        }
    }
}

impl TryFrom<&PipelineConfig> for ValidConfig {
    type Error = ConfigError;

    fn try_from(config: &PipelineConfig) -> Result<Self, Self::Error> {
        config.validate()
    }
}

/// Invalid pipeline configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// A manual threshold lies outside `[0, 255]`.
    #[error("thresholds must lie in [0, 255], got low={low} high={high}")]
    ThresholdOutOfRange {
        /// Requested low threshold.
        low: i32,
        /// Requested high threshold.
        high: i32,
    },

    /// The low threshold exceeds the high threshold.
    #[error("low threshold {low} exceeds high threshold {high}")]
    LowAboveHigh {
        /// Requested low threshold.
        low: i32,
        /// Requested high threshold.
        high: i32,
    },

    /// The smoothing kernel cannot be built.
    #[error("invalid smoothing kernel: {0}")]
    InvalidSmoothing(#[from] KernelError),

    /// Automatic threshold parameters are unusable.
    #[error("invalid automatic threshold parameters: {0}")]
    InvalidAutoThreshold(String),
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The input grid is malformed.
    #[error("invalid grid: {0}")]
    Grid(#[from] GridError),

    /// A kernel is malformed.
    #[error("invalid kernel: {0}")]
    Kernel(#[from] KernelError),

    /// A kernel does not fit inside the grid it is applied to.
    #[error("kernel {kernel} does not fit inside image {image}")]
    KernelLargerThanImage {
        /// Kernel dimensions.
        kernel: Dimensions,
        /// Image dimensions.
        image: Dimensions,
    },

    /// The input exceeds [`MAX_PIXELS`].
    #[error("image of {pixels} pixels exceeds the limit of {max}")]
    ImageTooLarge {
        /// Input pixel count.
        pixels: usize,
        /// Accepted maximum.
        max: usize,
    },

    /// An input intensity lies outside `[0, 255]`.
    #[error("intensity {value} at ({row}, {col}) is outside [0, 255]")]
    IntensityOutOfRange {
        /// Row of the offending cell.
        row: usize,
        /// Column of the offending cell.
        col: usize,
        /// The offending value.
        value: i32,
    },

    /// Two grids that must share dimensions do not.
    #[error("expected a {expected} grid, got {found}")]
    DimensionMismatch {
        /// Required dimensions.
        expected: Dimensions,
        /// Actual dimensions.
        found: Dimensions,
    },

    /// The magnitude grid has fewer distinct values than requested
    /// clusters, so automatic thresholds are undefined.
    #[error(
        "automatic thresholds need {clusters} distinct gradient magnitudes, found {distinct}"
    )]
    InsufficientContrast {
        /// Distinct magnitude values present.
        distinct: usize,
        /// Clusters requested.
        clusters: usize,
    },

    /// The clustering collaborator failed or returned unusable centroids.
    #[error("clustering failed: {0}")]
    Clustering(#[from] ClusterError),
}

/// Pixel counts of the hysteresis classes and the final edge map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeCounts {
    /// Pixels with magnitude at or above the high threshold.
    pub strong: usize,
    /// Pixels with magnitude in `[low, high)`.
    pub weak: usize,
    /// Pixels in the final edge map.
    pub edges: usize,
}

/// Final output of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDetection {
    /// `true` where a pixel belongs to a retained edge component.
    pub edges: Grid<bool>,
    /// `true` where magnitude is at or above the high threshold.
    pub strong: Grid<bool>,
    /// `true` where magnitude is in `[low, high)`.
    pub weak: Grid<bool>,
    /// Thresholds actually used, whether supplied or computed.
    pub thresholds: Thresholds,
    /// Pixel counts.
    pub counts: EdgeCounts,
    /// Connected-component statistics from tracing.
    pub components: ComponentStats,
}

impl EdgeDetection {
    /// Dimensions shared by the three output grids.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.edges.dimensions()
    }
}

/// Result of running the pipeline with every intermediate preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedResult {
    /// Dimensions of the input grid.
    pub input_dimensions: Dimensions,
    /// Stage 1: smoothed intensities.
    pub smoothed: Grid<i32>,
    /// Stage 2: derivatives, magnitude, and quantized direction.
    pub gradient: GradientField,
    /// Stage 3: magnitudes after non-maximum suppression.
    pub suppressed: Grid<i32>,
    /// Stage 4: per-pixel hysteresis class.
    pub classes: Grid<EdgeClass>,
    /// Stage 5: traced edges and summary.
    pub detection: EdgeDetection,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.smoothing, Smoothing::Gaussian5x5);
        assert_eq!(config.operator, GradientOperator::Sobel);
        assert_eq!(config.norm, Norm::L2);
        assert_eq!(config.derivatives, DerivativeRange::Clipped);
        assert_eq!(
            config.thresholds,
            ThresholdMode::Automatic(AutoThreshold::default())
        );
        assert_eq!(config.min_edge_size, 0);
    }

    #[test]
    fn validate_accepts_defaults() {
        let valid = PipelineConfig::default().validate().unwrap();
        assert_eq!(valid.contraction(), Dimensions { rows: 6, cols: 6 });
        assert_eq!(valid.min_input(), Dimensions { rows: 7, cols: 7 });
    }

    #[test]
    fn validate_rejects_low_above_high() {
        let config = PipelineConfig {
            thresholds: ThresholdMode::Manual { low: 40, high: 20 },
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::LowAboveHigh { low: 40, high: 20 })
        );
    }

    #[test]
    fn validate_rejects_out_of_range_thresholds() {
        for (low, high) in [(-1, 10), (10, 256), (-5, 300)] {
            let config = PipelineConfig {
                thresholds: ThresholdMode::Manual { low, high },
                ..PipelineConfig::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::ThresholdOutOfRange { low, high })
            );
        }
    }

    #[test]
    fn validate_rejects_bad_smoothing() {
        let config = PipelineConfig {
            smoothing: Smoothing::Box { size: 0 },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSmoothing(KernelError::Empty))
        ));
    }

    #[test]
    fn validate_rejects_oversized_smoothing() {
        for smoothing in [
            Smoothing::Box { size: 1 << 33 },
            Smoothing::Gaussian { sigma: 1e10 },
            Smoothing::Gaussian { sigma: 1e4 },
        ] {
            let config = PipelineConfig {
                smoothing,
                ..PipelineConfig::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::InvalidSmoothing(KernelError::TooLarge { .. }))
                ),
                "{smoothing:?}"
            );
        }
    }

    #[test]
    fn oversized_smoothing_from_json_is_a_config_error() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"smoothing": {"Box": {"size": 8589934592}}}"#).unwrap();
        let result = crate::detect(Grid::filled(8, 8, 0).unwrap(), &config, &crate::NoClusterer);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidConfig(ConfigError::InvalidSmoothing(
                KernelError::TooLarge { .. }
            )))
        ));
    }

    #[test]
    fn contraction_without_smoothing_is_gradient_only() {
        let config = PipelineConfig {
            smoothing: Smoothing::None,
            ..PipelineConfig::default()
        };
        let valid = config.validate().unwrap();
        assert_eq!(valid.contraction(), Dimensions { rows: 2, cols: 2 });
    }

    #[test]
    fn error_display() {
        let err = PipelineError::from(ConfigError::LowAboveHigh { low: 9, high: 3 });
        assert_eq!(
            err.to_string(),
            "invalid pipeline configuration: low threshold 9 exceeds high threshold 3",
        );
        let err = PipelineError::KernelLargerThanImage {
            kernel: Dimensions { rows: 5, cols: 5 },
            image: Dimensions { rows: 4, cols: 9 },
        };
        assert_eq!(err.to_string(), "kernel 5x5 does not fit inside image 4x9");
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            smoothing: Smoothing::Gaussian { sigma: 2.0 },
            operator: GradientOperator::Prewitt,
            norm: Norm::L1,
            derivatives: DerivativeRange::Signed,
            thresholds: ThresholdMode::Manual { low: 5, high: 15 },
            min_edge_size: 10,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn pipeline_config_missing_fields_use_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"min_edge_size": 4}"#).unwrap();
        assert_eq!(config.min_edge_size, 4);
        assert_eq!(config.norm, PipelineConfig::DEFAULT_NORM);
    }

    #[test]
    fn negative_min_edge_size_is_rejected_by_deserialization() {
        let result = serde_json::from_str::<PipelineConfig>(r#"{"min_edge_size": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn pipeline_error_serde_round_trip() {
        let err = PipelineError::InsufficientContrast {
            distinct: 1,
            clusters: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }
}
