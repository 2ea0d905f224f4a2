//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! The core crate does no I/O and reads no clock of its own. Callers pass
//! a [`Clock`] to [`detect_with_diagnostics`]; the bench binary uses one
//! backed by [`std::time::Instant`], tests use a fake that advances by a
//! fixed step.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gradient::{DerivativeRange, Norm};
use crate::grid::Grid;
use crate::kernel::GradientOperator;
use crate::pipeline::Pipeline;
use crate::threshold::Clusterer;
use crate::types::{Dimensions, PipelineConfig, PipelineError, StagedResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Time source for stage measurements.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: smoothing convolution.
    pub smoothing: StageDiagnostics,
    /// Stage 2: derivatives, magnitude, and direction.
    pub gradient: StageDiagnostics,
    /// Stage 3: non-maximum suppression.
    pub suppression: StageDiagnostics,
    /// Stage 4: threshold selection and classification.
    pub thresholding: StageDiagnostics,
    /// Stage 5: edge tracing.
    pub tracing: StageDiagnostics,
    /// Wall-clock duration of the whole run, validation included.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Smoothing convolution.
    Smoothing {
        /// Input grid size.
        input: Dimensions,
        /// Smoothing kernel size.
        kernel: Dimensions,
        /// Smoothed grid size.
        output: Dimensions,
    },
    /// Gradient computation.
    Gradient {
        /// Derivative kernel pair.
        operator: GradientOperator,
        /// Magnitude norm.
        norm: Norm,
        /// Whether derivatives were clipped.
        derivatives: DerivativeRange,
        /// Largest magnitude in the field.
        max_magnitude: i32,
        /// Pixels with a nonzero magnitude.
        nonzero: usize,
    },
    /// Non-maximum suppression.
    Suppression {
        /// Nonzero magnitudes before suppression.
        nonzero_before: usize,
        /// Nonzero magnitudes after suppression.
        nonzero_after: usize,
    },
    /// Threshold selection.
    Thresholding {
        /// Low threshold used.
        low: i32,
        /// High threshold used.
        high: i32,
        /// Whether the thresholds were computed by clustering.
        automatic: bool,
        /// Strong pixel count.
        strong: usize,
        /// Weak pixel count.
        weak: usize,
    },
    /// Edge tracing.
    Tracing {
        /// Components kept.
        kept: usize,
        /// Components dropped by the size filter.
        discarded: usize,
        /// Largest component size.
        largest: usize,
        /// Pixels in the final edge map.
        edge_pixels: usize,
        /// Pixels in the output grid.
        total_pixels: usize,
    },
}

/// High-level summary for the entire run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Input grid size.
    pub input: Dimensions,
    /// Output grid size.
    pub output: Dimensions,
    /// Low threshold used.
    pub low_threshold: i32,
    /// High threshold used.
    pub high_threshold: i32,
    /// Pixels in the final edge map.
    pub edge_pixels: usize,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Edge Detection Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Input: {} ({} pixels) -> output {}",
            self.summary.input,
            self.summary.input.pixel_count(),
            self.summary.output,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Thresholds: low={} high={}  |  Edge pixels: {}",
            self.summary.low_threshold, self.summary.high_threshold, self.summary.edge_pixels,
        ));

        lines.join("\n")
    }

    /// Stage names paired with their diagnostics, in execution order.
    #[must_use]
    pub const fn stages(&self) -> [(&'static str, &StageDiagnostics); 5] {
        [
            ("Smoothing", &self.smoothing),
            ("Gradient", &self.gradient),
            ("Suppression", &self.suppression),
            ("Thresholding", &self.thresholding),
            ("Tracing", &self.tracing),
        ]
    }
}

/// Run the whole pipeline, timing each stage with `clock`.
///
/// # Errors
///
/// Same as [`crate::detect`].
pub fn detect_with_diagnostics<C: Clock>(
    image: Grid<i32>,
    config: &PipelineConfig,
    clusterer: &dyn Clusterer,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let start = clock.now();
    let pending = Pipeline::new(image, config)?;

    let t = clock.now();
    let smoothed = pending.smooth()?;
    let smoothing = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: smoothed.metrics(),
    };

    let t = clock.now();
    let differentiated = smoothed.differentiate()?;
    let gradient = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: differentiated.metrics(),
    };

    let t = clock.now();
    let suppressed = differentiated.suppress();
    let suppression = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: suppressed.metrics(),
    };

    let t = clock.now();
    let thresholded = suppressed.select_thresholds(clusterer)?;
    let thresholding = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: thresholded.metrics(),
    };

    let t = clock.now();
    let traced = thresholded.trace();
    let tracing = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: traced.metrics(),
    };

    let staged = traced.into_result();
    let total_duration = clock.elapsed(&start);

    let summary = PipelineSummary {
        input: staged.input_dimensions,
        output: staged.detection.dimensions(),
        low_threshold: staged.detection.thresholds.low(),
        high_threshold: staged.detection.thresholds.high(),
        edge_pixels: staged.detection.counts.edges,
    };
    let diagnostics = PipelineDiagnostics {
        smoothing,
        gradient,
        suppression,
        thresholding,
        tracing,
        total_duration,
        summary,
    };
    Ok((staged, diagnostics))
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Smoothing {
            input,
            kernel,
            output,
        } => format!("{input} * {kernel} -> {output}"),
        StageMetrics::Gradient {
            operator,
            norm,
            derivatives,
            max_magnitude,
            nonzero,
        } => format!(
            "{operator:?}/{norm:?}/{derivatives:?} max={max_magnitude} nonzero={nonzero}"
        ),
        StageMetrics::Suppression {
            nonzero_before,
            nonzero_after,
        } => format!("nonzero {nonzero_before}->{nonzero_after}"),
        StageMetrics::Thresholding {
            low,
            high,
            automatic,
            strong,
            weak,
        } => {
            let mode = if *automatic { "auto" } else { "manual" };
            format!("{mode} low={low} high={high} strong={strong} weak={weak}")
        }
        StageMetrics::Tracing {
            kept,
            discarded,
            largest,
            edge_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *edge_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "{kept} kept, {discarded} dropped (largest {largest}), edges={edge_pixels} ({density:.1}%)"
            )
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::kernel::Smoothing;
    use crate::threshold::{NoClusterer, ThresholdMode};

    /// Clock that advances one second per reading.
    struct TickClock {
        ticks: Cell<u64>,
    }

    impl TickClock {
        const fn new() -> Self {
            Self {
                ticks: Cell::new(0),
            }
        }
    }

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get();
            self.ticks.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_secs(self.now() - since)
        }
    }

    fn run() -> (StagedResult, PipelineDiagnostics) {
        let image = Grid::from_fn(10, 10, |_, c| if c < 5 { 0 } else { 255 }).unwrap();
        let config = PipelineConfig {
            smoothing: Smoothing::None,
            thresholds: ThresholdMode::Manual { low: 50, high: 100 },
            min_edge_size: 1,
            ..PipelineConfig::default()
        };
        detect_with_diagnostics(image, &config, &NoClusterer, &TickClock::new()).unwrap()
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn stages_are_timed_with_the_injected_clock() {
        let (_, diagnostics) = run();
        for (name, stage) in diagnostics.stages() {
            assert_eq!(stage.duration, Duration::from_secs(1), "{name}");
        }
        assert_eq!(diagnostics.total_duration, Duration::from_secs(11));
    }

    #[test]
    fn summary_matches_staged_result() {
        let (staged, diagnostics) = run();
        assert_eq!(
            diagnostics.summary,
            PipelineSummary {
                input: Dimensions { rows: 10, cols: 10 },
                output: Dimensions { rows: 8, cols: 8 },
                low_threshold: 50,
                high_threshold: 100,
                edge_pixels: staged.detection.counts.edges,
            }
        );
        assert_eq!(staged.detection.counts.edges, 16);
    }

    #[test]
    fn report_lists_every_stage() {
        let (_, diagnostics) = run();
        let report = diagnostics.report();
        for name in ["Smoothing", "Gradient", "Suppression", "Thresholding", "Tracing"] {
            assert!(report.contains(name), "missing {name} in:\n{report}");
        }
        assert!(report.contains("manual low=50 high=100"));
        assert!(report.contains("Edge pixels: 16"));
    }

    #[test]
    fn diagnostics_serde_round_trip() {
        let (_, diagnostics) = run();
        let json = serde_json::to_string(&diagnostics).unwrap();
        let deserialized: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(diagnostics, deserialized);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"duration": -1.0, "metrics": {"Suppression": {"nonzero_before": 1, "nonzero_after": 0}}}"#;
        assert!(serde_json::from_str::<StageDiagnostics>(json).is_err());
    }
}
