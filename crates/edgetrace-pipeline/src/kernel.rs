//! Convolution kernels and the strategy enums that select them.
//!
//! [`Smoothing`] chooses the noise-reduction kernel applied before the
//! gradient stage, and [`GradientOperator`] carries the 3×3 derivative
//! kernel pair. Both are plain enums resolved to a [`Kernel`] at run
//! time, so adding a variant does not change [`PipelineConfig`].
//!
//! [`PipelineConfig`]: crate::types::PipelineConfig

use serde::{Deserialize, Serialize};

use crate::types::MAX_PIXELS;

/// Longest kernel side accepted. A larger square kernel could not fit
/// inside any image of at most [`MAX_PIXELS`] pixels.
pub const MAX_KERNEL_SIDE: usize = MAX_PIXELS.isqrt();

/// Errors raised when building a [`Kernel`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum KernelError {
    /// The kernel would have zero rows or zero columns.
    #[error("kernel must have at least one row and one column")]
    Empty,

    /// The weight buffer does not hold exactly `rows * cols` values.
    #[error("{len} weights do not match a {rows}x{cols} kernel")]
    LengthMismatch {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
        /// Actual number of weights.
        len: usize,
    },

    /// A weight is NaN or infinite.
    #[error("kernel weight at index {index} is not finite")]
    NonFinite {
        /// Row-major index of the offending weight.
        index: usize,
    },

    /// The requested side length exceeds [`MAX_KERNEL_SIDE`].
    #[error("kernel side {side} exceeds the maximum of {max}")]
    TooLarge {
        /// Requested side length, saturated at `usize::MAX`.
        side: usize,
        /// Largest accepted side.
        max: usize,
    },
}

/// A rows×cols array of real weights, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    rows: usize,
    cols: usize,
    weights: Vec<f64>,
}

impl Kernel {
    /// Build a kernel from a row-major weight buffer.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Empty`] for a zero dimension,
    /// [`KernelError::LengthMismatch`] when the buffer length is wrong, and
    /// [`KernelError::NonFinite`] for NaN or infinite weights.
    pub fn new(rows: usize, cols: usize, weights: Vec<f64>) -> Result<Self, KernelError> {
        if rows == 0 || cols == 0 {
            return Err(KernelError::Empty);
        }
        if rows.checked_mul(cols) != Some(weights.len()) {
            return Err(KernelError::LengthMismatch {
                rows,
                cols,
                len: weights.len(),
            });
        }
        if let Some(index) = weights.iter().position(|w| !w.is_finite()) {
            return Err(KernelError::NonFinite { index });
        }
        Ok(Self {
            rows,
            cols,
            weights,
        })
    }

    fn from_array<const M: usize, const N: usize>(rows: [[f64; N]; M]) -> Self {
        Self {
            rows: M,
            cols: N,
            weights: rows.into_iter().flatten().collect(),
        }
    }

    /// The 1×1 kernel of weight 1.
    #[must_use]
    pub fn identity() -> Self {
        Self::from_array([[1.0]])
    }

    /// The classic 5×5 Gaussian (σ ≈ 1.4) with integer weights over 159.
    #[must_use]
    pub fn gaussian_5x5() -> Self {
        const WEIGHTS: [[f64; 5]; 5] = [
            [2.0, 4.0, 5.0, 4.0, 2.0],
            [4.0, 9.0, 12.0, 9.0, 4.0],
            [5.0, 12.0, 15.0, 12.0, 5.0],
            [4.0, 9.0, 12.0, 9.0, 4.0],
            [2.0, 4.0, 5.0, 4.0, 2.0],
        ];
        Self::from_array(WEIGHTS.map(|row| row.map(|w| w / 159.0)))
    }

    /// A sampled, normalized Gaussian of radius `ceil(3 * sigma)`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NonFinite`] if `sigma` is not a positive
    /// finite number and [`KernelError::TooLarge`] if the kernel side
    /// would exceed [`MAX_KERNEL_SIDE`].
    pub fn gaussian(sigma: f64) -> Result<Self, KernelError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(KernelError::NonFinite { index: 0 });
        }
        // Float-to-int casts saturate, so huge sigmas land on usize::MAX.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let radius = (3.0 * sigma).ceil() as usize;
        let size = check_side(radius.saturating_mul(2).saturating_add(1))?;
        #[allow(clippy::cast_precision_loss)]
        let offset = |i: usize| i as f64 - radius as f64;
        let denom = 2.0 * sigma * sigma;
        let mut weights = Vec::with_capacity(size * size);
        for row in 0..size {
            for col in 0..size {
                let (dy, dx) = (offset(row), offset(col));
                weights.push((-dx.mul_add(dx, dy * dy) / denom).exp());
            }
        }
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        Self::new(size, size, weights)
    }

    /// A `size`×`size` averaging kernel.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Empty`] if `size` is zero and
    /// [`KernelError::TooLarge`] if it exceeds [`MAX_KERNEL_SIDE`].
    pub fn averaging(size: usize) -> Result<Self, KernelError> {
        if size == 0 {
            return Err(KernelError::Empty);
        }
        let size = check_side(size)?;
        #[allow(clippy::cast_precision_loss)]
        let weight = 1.0 / (size * size) as f64;
        Self::new(size, size, vec![weight; size * size])
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Weight at `(row, col)`, or `None` when out of bounds.
    #[must_use]
    pub fn weight(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            self.weights.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    /// Row-major weights.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sum of all weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

const fn check_side(side: usize) -> Result<usize, KernelError> {
    if side > MAX_KERNEL_SIDE {
        return Err(KernelError::TooLarge {
            side,
            max: MAX_KERNEL_SIDE,
        });
    }
    Ok(side)
}

/// Selects the smoothing kernel applied before differentiation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Smoothing {
    /// Fixed 5×5 Gaussian with weights over 159. Shrinks each axis by 4.
    #[default]
    Gaussian5x5,
    /// Sampled Gaussian with the given standard deviation.
    Gaussian {
        /// Standard deviation in pixels. Must be positive and finite.
        sigma: f64,
    },
    /// Square averaging kernel.
    Box {
        /// Side length in pixels. Must be at least 1.
        size: usize,
    },
    /// No smoothing (1×1 identity).
    None,
}

impl Smoothing {
    /// Resolve to a concrete kernel.
    ///
    /// # Errors
    ///
    /// Propagates [`KernelError`] for invalid `sigma` or `size`.
    pub fn kernel(self) -> Result<Kernel, KernelError> {
        match self {
            Self::Gaussian5x5 => Ok(Kernel::gaussian_5x5()),
            Self::Gaussian { sigma } => Kernel::gaussian(sigma),
            Self::Box { size } => Kernel::averaging(size),
            Self::None => Ok(Kernel::identity()),
        }
    }
}

/// Selects the 3×3 derivative kernel pair used for the gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientOperator {
    /// Sobel operator.
    #[default]
    Sobel,
    /// Prewitt operator.
    Prewitt,
}

impl GradientOperator {
    /// Horizontal-derivative kernel (`Gx`).
    #[must_use]
    pub fn x_kernel(self) -> Kernel {
        match self {
            Self::Sobel => Kernel::from_array([
                [-1.0, 0.0, 1.0],
                [-2.0, 0.0, 2.0],
                [-1.0, 0.0, 1.0],
            ]),
            Self::Prewitt => Kernel::from_array([
                [-1.0, 0.0, 1.0],
                [-1.0, 0.0, 1.0],
                [-1.0, 0.0, 1.0],
            ]),
        }
    }

    /// Vertical-derivative kernel (`Gy`).
    #[must_use]
    pub fn y_kernel(self) -> Kernel {
        match self {
            Self::Sobel => Kernel::from_array([
                [1.0, 2.0, 1.0],
                [0.0, 0.0, 0.0],
                [-1.0, -2.0, -1.0],
            ]),
            Self::Prewitt => Kernel::from_array([
                [1.0, 1.0, 1.0],
                [0.0, 0.0, 0.0],
                [-1.0, -1.0, -1.0],
            ]),
        }
    }
}
