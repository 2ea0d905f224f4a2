//! Hysteresis threshold selection.
//!
//! Thresholds are either supplied by the caller or derived from the
//! suppressed magnitudes by a one-dimensional clustering collaborator.
//!
//! # Strategy pattern
//!
//! Clustering sits behind the [`Clusterer`] trait so this crate stays
//! free of any particular algorithm. `edgetrace-cluster` provides a
//! seeded k-means; tests substitute fixed centroid sequences.
//!
//! # Automatic thresholds
//!
//! The magnitudes are flattened row-major and clustered into
//! [`CLUSTER_COUNT`] groups. Only the centroids at positions 0 and 1 of
//! the clusterer's answer are used: the smaller becomes the low
//! threshold and the larger the high threshold. The third centroid is
//! ignored.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::types::{ConfigError, MAX_INTENSITY, PipelineError};

/// Number of clusters requested for automatic thresholds.
pub const CLUSTER_COUNT: usize = 3;

/// A validated `(low, high)` pair with `0 <= low <= high <= 255`.
///
/// Deserialization goes through [`Thresholds::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct Thresholds {
    low: i32,
    high: i32,
}

/// Unchecked wire form of [`Thresholds`].
#[derive(Deserialize)]
struct RawThresholds {
    low: i32,
    high: i32,
}

impl TryFrom<RawThresholds> for Thresholds {
    type Error = ConfigError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        Self::new(raw.low, raw.high)
    }
}

impl Thresholds {
    /// Validate a threshold pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ThresholdOutOfRange`] if either value lies
    /// outside `[0, 255]` and [`ConfigError::LowAboveHigh`] if
    /// `low > high`.
    pub const fn new(low: i32, high: i32) -> Result<Self, ConfigError> {
        if low < 0 || high < 0 || low > MAX_INTENSITY || high > MAX_INTENSITY {
            return Err(ConfigError::ThresholdOutOfRange { low, high });
        }
        if low > high {
            return Err(ConfigError::LowAboveHigh { low, high });
        }
        Ok(Self { low, high })
    }

    /// Derive thresholds from two cluster centroids.
    ///
    /// Each centroid is truncated toward zero and clamped to `[0, 255]`;
    /// the smaller becomes `low`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::NonFiniteCentroid`] if either centroid is
    /// NaN or infinite.
    pub fn from_centroids(first: f64, second: f64) -> Result<Self, ClusterError> {
        let to_level = |value: f64| -> Result<i32, ClusterError> {
            if !value.is_finite() {
                return Err(ClusterError::NonFiniteCentroid);
            }
            // Clamped to [0, 255] first, so the cast cannot truncate.
            #[allow(clippy::cast_possible_truncation)]
            let level = value.trunc().clamp(0.0, f64::from(MAX_INTENSITY)) as i32;
            Ok(level)
        };
        let (a, b) = (to_level(first)?, to_level(second)?);
        Ok(Self {
            low: a.min(b),
            high: a.max(b),
        })
    }

    /// Low threshold: magnitudes at or above it are at least weak.
    #[must_use]
    pub const fn low(self) -> i32 {
        self.low
    }

    /// High threshold: magnitudes at or above it are strong.
    #[must_use]
    pub const fn high(self) -> i32 {
        self.high
    }
}

/// Parameters for automatic threshold selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoThreshold {
    /// Upper bound on clustering iterations. Must be at least 1.
    pub max_iterations: usize,
    /// Convergence tolerance on centroid movement. Must be finite and
    /// non-negative.
    pub epsilon: f64,
    /// Use k-means++ style seeding.
    pub plus_plus: bool,
}

impl AutoThreshold {
    /// Default iteration cap.
    pub const DEFAULT_MAX_ITERATIONS: usize = 10;

    /// Default convergence tolerance.
    pub const DEFAULT_EPSILON: f64 = 0.01;

    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAutoThreshold`] for a zero iteration
    /// cap or a negative or non-finite epsilon.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidAutoThreshold(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ConfigError::InvalidAutoThreshold(format!(
                "epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        Ok(self)
    }

    /// The request handed to the clusterer.
    #[must_use]
    pub const fn request(&self) -> ClusterRequest {
        ClusterRequest {
            k: CLUSTER_COUNT,
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
            seeded: self.plus_plus,
        }
    }
}

impl Default for AutoThreshold {
    fn default() -> Self {
        Self {
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            epsilon: Self::DEFAULT_EPSILON,
            plus_plus: true,
        }
    }
}

/// How thresholds are chosen, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// Caller-supplied thresholds, validated at configuration time.
    Manual {
        /// Low threshold.
        low: i32,
        /// High threshold.
        high: i32,
    },
    /// Thresholds derived from the magnitudes by clustering.
    Automatic(AutoThreshold),
}

/// A validated [`ThresholdMode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    /// Fixed thresholds.
    Manual(Thresholds),
    /// Cluster the magnitudes with these parameters.
    Automatic(AutoThreshold),
}

/// Arguments for one clustering call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterRequest {
    /// Number of centroids wanted.
    pub k: usize,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Convergence tolerance.
    pub epsilon: f64,
    /// Use k-means++ style seeding.
    pub seeded: bool,
}

/// Errors reported by a [`Clusterer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ClusterError {
    /// No clusterer is configured.
    #[error("no clusterer available for automatic thresholds")]
    Unavailable,

    /// Fewer distinct points than requested clusters.
    #[error("{points} distinct points cannot form {k} clusters")]
    TooFewPoints {
        /// Distinct points supplied.
        points: usize,
        /// Clusters requested.
        k: usize,
    },

    /// The clusterer returned fewer centroids than thresholds need.
    #[error("expected at least {expected} centroids, got {found}")]
    TooFewCentroids {
        /// Centroids needed.
        expected: usize,
        /// Centroids returned.
        found: usize,
    },

    /// A returned centroid is NaN or infinite.
    #[error("clusterer returned a non-finite centroid")]
    NonFiniteCentroid,

    /// The request itself is unusable.
    #[error("invalid cluster request: {0}")]
    InvalidRequest(String),
}

/// One-dimensional clustering collaborator.
///
/// Input: real-valued points. Output: `request.k` centroids, in an order
/// of the implementation's choosing. Behavior when the points hold fewer
/// distinct values than `k` is implementation-defined; the pipeline
/// never asks for that case.
pub trait Clusterer {
    /// Cluster `points` as described by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] when clustering is impossible.
    fn cluster(&self, points: &[f64], request: &ClusterRequest) -> Result<Vec<f64>, ClusterError>;
}

impl<C: Clusterer + ?Sized> Clusterer for &C {
    fn cluster(&self, points: &[f64], request: &ClusterRequest) -> Result<Vec<f64>, ClusterError> {
        (**self).cluster(points, request)
    }
}

/// Placeholder for runs with manual thresholds.
///
/// Fails with [`ClusterError::Unavailable`] if asked to cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClusterer;

impl Clusterer for NoClusterer {
    fn cluster(&self, _points: &[f64], _request: &ClusterRequest) -> Result<Vec<f64>, ClusterError> {
        Err(ClusterError::Unavailable)
    }
}

/// Choose thresholds for `magnitude` according to `policy`.
///
/// # Errors
///
/// See [`auto_thresholds`]. Manual policies never fail.
pub fn select_thresholds(
    magnitude: &Grid<i32>,
    policy: &ThresholdPolicy,
    clusterer: &dyn Clusterer,
) -> Result<Thresholds, PipelineError> {
    match policy {
        ThresholdPolicy::Manual(thresholds) => Ok(*thresholds),
        ThresholdPolicy::Automatic(auto) => auto_thresholds(magnitude, auto, clusterer),
    }
}

/// Derive thresholds by clustering the magnitudes.
///
/// # Errors
///
/// Returns [`PipelineError::InsufficientContrast`] if `magnitude` holds
/// fewer than [`CLUSTER_COUNT`] distinct values, and
/// [`PipelineError::Clustering`] if the clusterer fails or returns fewer
/// than two usable centroids.
pub fn auto_thresholds(
    magnitude: &Grid<i32>,
    auto: &AutoThreshold,
    clusterer: &dyn Clusterer,
) -> Result<Thresholds, PipelineError> {
    let request = auto.request();
    let distinct = magnitude.iter().collect::<BTreeSet<_>>().len();
    if distinct < request.k {
        return Err(PipelineError::InsufficientContrast {
            distinct,
            clusters: request.k,
        });
    }

    let points: Vec<f64> = magnitude.iter().map(|&m| f64::from(m)).collect();
    let centroids = clusterer.cluster(&points, &request)?;
    log::debug!("clusterer returned centroids {centroids:?}");

    match centroids.as_slice() {
        [first, second, ..] => Ok(Thresholds::from_centroids(*first, *second)?),
        _ => Err(ClusterError::TooFewCentroids {
            expected: 2,
            found: centroids.len(),
        }
        .into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Returns a fixed centroid list and records the request it saw.
    struct FixedCentroids {
        centroids: Vec<f64>,
        seen: RefCell<Option<(usize, ClusterRequest)>>,
    }

    impl FixedCentroids {
        fn new(centroids: Vec<f64>) -> Self {
            Self {
                centroids,
                seen: RefCell::new(None),
            }
        }
    }

    impl Clusterer for FixedCentroids {
        fn cluster(
            &self,
            points: &[f64],
            request: &ClusterRequest,
        ) -> Result<Vec<f64>, ClusterError> {
            *self.seen.borrow_mut() = Some((points.len(), *request));
            Ok(self.centroids.clone())
        }
    }

    fn ramp() -> Grid<i32> {
        Grid::from_fn(4, 4, |r, c| i32::try_from(r * 4 + c).unwrap() * 10).unwrap()
    }

    #[test]
    fn thresholds_validate_range_and_order() {
        assert!(Thresholds::new(0, 255).is_ok());
        assert!(Thresholds::new(7, 7).is_ok());
        assert_eq!(
            Thresholds::new(10, 5),
            Err(ConfigError::LowAboveHigh { low: 10, high: 5 })
        );
        assert_eq!(
            Thresholds::new(-1, 5),
            Err(ConfigError::ThresholdOutOfRange { low: -1, high: 5 })
        );
        assert_eq!(
            Thresholds::new(1, 256),
            Err(ConfigError::ThresholdOutOfRange { low: 1, high: 256 })
        );
    }

    #[test]
    fn deserialization_validates_thresholds() {
        let t: Thresholds = serde_json::from_str(r#"{"low": 4, "high": 90}"#).unwrap();
        assert_eq!(t, Thresholds::new(4, 90).unwrap());
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"low":4,"high":90}"#);

        let inverted = serde_json::from_str::<Thresholds>(r#"{"low": 90, "high": 4}"#);
        let err = inverted.unwrap_err().to_string();
        assert!(err.contains("low threshold 90 exceeds high threshold 4"), "{err}");

        assert!(serde_json::from_str::<Thresholds>(r#"{"low": 0, "high": 300}"#).is_err());
    }

    #[test]
    fn manual_policy_ignores_clusterer() {
        let policy = ThresholdPolicy::Manual(Thresholds::new(5, 15).unwrap());
        let t = select_thresholds(&ramp(), &policy, &NoClusterer).unwrap();
        assert_eq!((t.low(), t.high()), (5, 15));
    }

    #[test]
    fn automatic_uses_first_two_centroids_only() {
        // The third centroid (200) is discarded even though it is largest.
        let clusterer = FixedCentroids::new(vec![90.7, 20.2, 200.0]);
        let t = auto_thresholds(&ramp(), &AutoThreshold::default(), &clusterer).unwrap();
        assert_eq!((t.low(), t.high()), (20, 90));
    }

    #[test]
    fn automatic_sends_flattened_points_and_request() {
        let clusterer = FixedCentroids::new(vec![1.0, 2.0, 3.0]);
        let auto = AutoThreshold {
            max_iterations: 25,
            epsilon: 0.5,
            plus_plus: false,
        };
        auto_thresholds(&ramp(), &auto, &clusterer).unwrap();
        let (count, request) = clusterer.seen.borrow().unwrap();
        assert_eq!(count, 16);
        assert_eq!(
            request,
            ClusterRequest {
                k: 3,
                max_iterations: 25,
                epsilon: 0.5,
                seeded: false,
            }
        );
    }

    #[test]
    fn too_few_distinct_magnitudes_is_an_error() {
        let flat = Grid::from_fn(3, 3, |r, _| if r == 0 { 9 } else { 0 }).unwrap();
        let clusterer = FixedCentroids::new(vec![0.0, 9.0, 9.0]);
        let result = auto_thresholds(&flat, &AutoThreshold::default(), &clusterer);
        assert_eq!(
            result,
            Err(PipelineError::InsufficientContrast {
                distinct: 2,
                clusters: 3
            })
        );
        assert!(clusterer.seen.borrow().is_none());
    }

    #[test]
    fn short_or_non_finite_centroids_are_errors() {
        let short = FixedCentroids::new(vec![4.0]);
        assert_eq!(
            auto_thresholds(&ramp(), &AutoThreshold::default(), &short),
            Err(PipelineError::Clustering(ClusterError::TooFewCentroids {
                expected: 2,
                found: 1
            }))
        );
        let nan = FixedCentroids::new(vec![f64::NAN, 3.0, 4.0]);
        assert_eq!(
            auto_thresholds(&ramp(), &AutoThreshold::default(), &nan),
            Err(PipelineError::Clustering(ClusterError::NonFiniteCentroid))
        );
    }

    #[test]
    fn no_clusterer_reports_unavailable() {
        let result = auto_thresholds(&ramp(), &AutoThreshold::default(), &NoClusterer);
        assert_eq!(
            result,
            Err(PipelineError::Clustering(ClusterError::Unavailable))
        );
    }

    #[test]
    fn centroids_are_truncated_and_clamped() {
        let t = Thresholds::from_centroids(300.0, -4.0).unwrap();
        assert_eq!((t.low(), t.high()), (0, 255));
        let t = Thresholds::from_centroids(12.99, 12.01).unwrap();
        assert_eq!((t.low(), t.high()), (12, 12));
    }

    #[test]
    fn auto_threshold_validation() {
        assert!(AutoThreshold::default().validated().is_ok());
        let zero_iterations = AutoThreshold {
            max_iterations: 0,
            ..AutoThreshold::default()
        };
        assert!(zero_iterations.validated().is_err());
        let bad_epsilon = AutoThreshold {
            epsilon: f64::NAN,
            ..AutoThreshold::default()
        };
        assert!(bad_epsilon.validated().is_err());
    }
}
