//! Discrete 2-D convolution of integer grids with real-valued kernels.
//!
//! The kernel window is anchored at the output cell's top-left corner
//! and is not flipped, so an R×C grid and an m×n kernel produce an
//! (R−m+1)×(C−n+1) grid. There is no padding: every output cell reads a
//! full window of real samples.
//!
//! [`convolve`] clips every result to `[0, 255]`, truncating toward zero
//! in between. [`convolve_signed`] keeps the truncated value as is and
//! exists for the signed-derivative gradient variant.

use rayon::prelude::*;

use crate::grid::Grid;
use crate::kernel::Kernel;
use crate::types::{Dimensions, MAX_INTENSITY, PipelineError};

/// Convolve `source` with `kernel`, clipping each result to `[0, 255]`.
///
/// # Errors
///
/// Returns [`PipelineError::KernelLargerThanImage`] if the kernel is
/// taller or wider than the grid.
pub fn convolve(source: &Grid<i32>, kernel: &Kernel) -> Result<Grid<i32>, PipelineError> {
    convolve_with(source, kernel, clip_intensity)
}

/// Convolve `source` with `kernel` without clipping.
///
/// Sums are truncated toward zero (saturating at the `i32` range).
///
/// # Errors
///
/// Returns [`PipelineError::KernelLargerThanImage`] if the kernel is
/// taller or wider than the grid.
#[allow(clippy::cast_possible_truncation)]
pub fn convolve_signed(source: &Grid<i32>, kernel: &Kernel) -> Result<Grid<i32>, PipelineError> {
    convolve_with(source, kernel, |sum| sum as i32)
}

/// Dimensions of the grid produced by convolving `image` with `kernel`.
///
/// # Errors
///
/// Returns [`PipelineError::KernelLargerThanImage`] if the kernel does
/// not fit.
pub fn output_dimensions(image: Dimensions, kernel: &Kernel) -> Result<Dimensions, PipelineError> {
    if kernel.rows() > image.rows || kernel.cols() > image.cols {
        return Err(PipelineError::KernelLargerThanImage {
            kernel: Dimensions {
                rows: kernel.rows(),
                cols: kernel.cols(),
            },
            image,
        });
    }
    Ok(Dimensions {
        rows: image.rows - kernel.rows() + 1,
        cols: image.cols - kernel.cols() + 1,
    })
}

/// Map a real-valued sum onto `[0, 255]`.
///
/// Sums at or above 255 saturate, sums at or below zero become zero, and
/// anything in between is truncated toward zero.
#[must_use]
pub fn clip_intensity(sum: f64) -> i32 {
    if sum >= f64::from(MAX_INTENSITY) {
        MAX_INTENSITY
    } else if sum > 0.0 {
        #[allow(clippy::cast_possible_truncation)]
        let truncated = sum as i32;
        truncated
    } else {
        0
    }
}

// Multiply then add: a fused multiply-add rounds differently and changes
// truncated results.
#[allow(clippy::suboptimal_flops)]
fn convolve_with(
    source: &Grid<i32>,
    kernel: &Kernel,
    finish: impl Fn(f64) -> i32 + Sync,
) -> Result<Grid<i32>, PipelineError> {
    let out = output_dimensions(source.dimensions(), kernel)?;
    let samples = source.as_slice();
    let weights = kernel.weights();
    let (src_cols, k_rows, k_cols) = (source.cols(), kernel.rows(), kernel.cols());

    let mut data = vec![0; out.pixel_count()];
    data.par_chunks_mut(out.cols)
        .enumerate()
        .for_each(|(row, out_row)| {
            for (col, cell) in out_row.iter_mut().enumerate() {
                let mut sum = 0.0;
                for k in 0..k_rows {
                    let start = (row + k) * src_cols + col;
                    let window = &samples[start..start + k_cols];
                    let taps = &weights[k * k_cols..(k + 1) * k_cols];
                    for (w, &v) in taps.iter().zip(window) {
                        sum += w * f64::from(v);
                    }
                }
                *cell = finish(sum);
            }
        });

    Ok(Grid::from_parts(out.rows, out.cols, data))
}
