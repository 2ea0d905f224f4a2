//! Gradient magnitude and quantized direction.
//!
//! The smoothed grid is convolved with the operator's `Gx` and `Gy`
//! kernels. Each pixel's pair of derivatives is combined into a
//! magnitude (L1 or L2 norm, clipped to `[0, 255]`) and a direction
//! rounded to one of four axes.
//!
//! With [`DerivativeRange::Clipped`] the derivatives pass through the
//! same clipping convolution as the smoothing stage, so they are never
//! negative. `atan(Gy / Gx)` then stays in `[0°, 90°]` and
//! [`Direction::DiagLeftUp`] cannot occur. [`DerivativeRange::Signed`]
//! keeps the sign and produces all four directions.

use std::f64::consts::PI;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::convolve::{convolve, convolve_signed};
use crate::grid::Grid;
use crate::kernel::GradientOperator;
use crate::types::{MAX_INTENSITY, PipelineError};

/// Angle at or above which a gradient counts as vertical (77.5°).
const UP_TILT: f64 = PI * 77.5 / 180.0;

/// Angle at or below which a gradient counts as horizontal (22.5°).
const FLAT_TILT: f64 = PI * 22.5 / 180.0;

/// How the two directional derivatives combine into one magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Norm {
    /// `|Gx| + |Gy|`. Cheaper, overestimates diagonals.
    L1,
    /// `round(sqrt(Gx² + Gy²))`.
    #[default]
    L2,
}

impl Norm {
    /// Combine `gx` and `gy`, clipping the result to `[0, 255]`.
    #[must_use]
    pub fn magnitude(self, gx: i32, gy: i32) -> i32 {
        match self {
            Self::L1 => {
                let sum = i64::from(gx).abs() + i64::from(gy).abs();
                // Clamped to [0, 255] first, so the cast cannot truncate.
                #[allow(clippy::cast_possible_truncation)]
                let clipped = sum.min(i64::from(MAX_INTENSITY)) as i32;
                clipped
            }
            Self::L2 => {
                let (x, y) = (f64::from(gx), f64::from(gy));
                let length = x.hypot(y).round();
                #[allow(clippy::cast_possible_truncation)]
                let clipped = length.min(f64::from(MAX_INTENSITY)) as i32;
                clipped
            }
        }
    }
}

/// Whether directional derivatives keep their sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DerivativeRange {
    /// Derivatives are clipped to `[0, 255]` like every other convolution.
    #[default]
    Clipped,
    /// Derivatives keep their sign and full range.
    Signed,
}

/// Gradient direction rounded to one of four axes.
///
/// Each variant names the axis along which intensity changes fastest;
/// non-maximum suppression compares a pixel with its two neighbors along
/// that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Gradient along the columns: compare left and right neighbors.
    Horizontal,
    /// Gradient along the rows: compare neighbors above and below.
    Vertical,
    /// Gradient along the main diagonal: compare up-left and down-right.
    DiagLeftUp,
    /// Gradient along the anti-diagonal: compare up-right and down-left.
    DiagRightUp,
}

impl Direction {
    /// Quantize the direction of `(gx, gy)`.
    ///
    /// A zero `gx` makes the angle undefined: the result is
    /// [`Horizontal`](Self::Horizontal) when `gy` is also zero and
    /// [`Vertical`](Self::Vertical) otherwise.
    #[must_use]
    pub fn from_derivatives(gx: i32, gy: i32) -> Self {
        if gx == 0 {
            if gy == 0 {
                Self::Horizontal
            } else {
                Self::Vertical
            }
        } else {
            Self::from_angle((f64::from(gy) / f64::from(gx)).atan())
        }
    }

    /// Quantize an angle in radians, as returned by `atan`.
    #[must_use]
    pub fn from_angle(radians: f64) -> Self {
        let magnitude = radians.abs();
        if magnitude >= UP_TILT {
            Self::Vertical
        } else if magnitude <= FLAT_TILT {
            Self::Horizontal
        } else if (FLAT_TILT..=UP_TILT).contains(&radians) {
            Self::DiagRightUp
        } else {
            Self::DiagLeftUp
        }
    }

    /// `(row, col)` offsets of the two neighbors compared during
    /// non-maximum suppression. The pair is symmetric about the pixel.
    #[must_use]
    pub const fn neighbor_offsets(self) -> [(isize, isize); 2] {
        match self {
            Self::Vertical => [(-1, 0), (1, 0)],
            Self::Horizontal => [(0, -1), (0, 1)],
            Self::DiagLeftUp => [(-1, -1), (1, 1)],
            Self::DiagRightUp => [(-1, 1), (1, -1)],
        }
    }
}

/// Per-pixel derivatives, magnitude, and direction.
///
/// All four grids share the same dimensions: the smoothed grid's minus
/// two in each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientField {
    /// Horizontal derivative.
    pub gx: Grid<i32>,
    /// Vertical derivative.
    pub gy: Grid<i32>,
    /// Combined magnitude in `[0, 255]`.
    pub magnitude: Grid<i32>,
    /// Quantized direction.
    pub direction: Grid<Direction>,
}

impl GradientField {
    /// Differentiate `smoothed` with `operator`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::KernelLargerThanImage`] if `smoothed` is
    /// smaller than 3×3.
    pub fn compute(
        smoothed: &Grid<i32>,
        operator: GradientOperator,
        norm: Norm,
        derivatives: DerivativeRange,
    ) -> Result<Self, PipelineError> {
        let (gx, gy) = match derivatives {
            DerivativeRange::Clipped => (
                convolve(smoothed, &operator.x_kernel())?,
                convolve(smoothed, &operator.y_kernel())?,
            ),
            DerivativeRange::Signed => (
                convolve_signed(smoothed, &operator.x_kernel())?,
                convolve_signed(smoothed, &operator.y_kernel())?,
            ),
        };

        let (magnitude, direction): (Vec<i32>, Vec<Direction>) = gx
            .as_slice()
            .par_iter()
            .zip(gy.as_slice())
            .map(|(&x, &y)| (norm.magnitude(x, y), Direction::from_derivatives(x, y)))
            .unzip();

        let (rows, cols) = (gx.rows(), gx.cols());
        Ok(Self {
            magnitude: Grid::from_parts(rows, cols, magnitude),
            direction: Grid::from_parts(rows, cols, direction),
            gx,
            gy,
        })
    }
}
