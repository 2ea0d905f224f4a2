//! Immutable row-major 2-D grids.
//!
//! Every pipeline stage consumes one [`Grid`] and produces a new one.
//! Intensities and derived scalars live in `Grid<i32>`, edge maps in
//! `Grid<bool>`, and quantized gradient directions in
//! `Grid<Direction>`.
//!
//! [`Direction`]: crate::gradient::Direction

use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Errors raised when building a [`Grid`] from raw data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum GridError {
    /// The grid would have zero rows or zero columns.
    #[error("grid must have at least one row and one column")]
    Empty,

    /// A row's length differs from the first row's length.
    #[error("row {row} has {found} columns, expected {expected}")]
    Ragged {
        /// Index of the offending row.
        row: usize,
        /// Column count of the first row.
        expected: usize,
        /// Column count of the offending row.
        found: usize,
    },

    /// A flat buffer does not hold exactly `rows * cols` samples.
    #[error("buffer of {len} samples does not match {rows}x{cols}")]
    LengthMismatch {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
        /// Actual buffer length.
        len: usize,
    },
}

/// A rows×cols array of samples stored in row-major order.
///
/// Grids are never empty: both dimensions are at least one.
/// Deserialization goes through [`Grid::from_vec`], so a serialized grid
/// whose buffer disagrees with its dimensions is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid<T>")]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Unchecked wire form of a [`Grid`].
#[derive(Deserialize)]
struct RawGrid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T> TryFrom<RawGrid<T>> for Grid<T> {
    type Error = GridError;

    fn try_from(raw: RawGrid<T>) -> Result<Self, Self::Error> {
        Self::from_vec(raw.rows, raw.cols, raw.data)
    }
}

impl<T> Grid<T> {
    /// Wrap a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Empty`] if either dimension is zero and
    /// [`GridError::LengthMismatch`] if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(GridError::LengthMismatch {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a grid from nested rows.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Empty`] if there are no rows or the first row
    /// is empty, and [`GridError::Ragged`] if any row's length differs
    /// from the first.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self, GridError> {
        let cols = rows.first().map_or(0, Vec::len);
        if cols == 0 {
            return Err(GridError::Empty);
        }
        let row_count = rows.len();
        let mut data = Vec::with_capacity(row_count * cols);
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(GridError::Ragged {
                    row: index,
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: row_count,
            cols,
            data,
        })
    }

    /// Build a grid by evaluating `f(row, col)` for every cell.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Empty`] if either dimension is zero.
    pub fn from_fn(
        rows: usize,
        cols: usize,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Ok(Self { rows, cols, data })
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

    /// Grid dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Total number of cells.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; grids have at least one cell.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the cell at `(row, col)`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Borrow the cell at a signed position, or `None` when out of bounds.
    ///
    /// Neighbor lookups offset a position by -1..=1 in each axis, which
    /// can step outside the grid on either side.
    #[must_use]
    pub fn get_signed(&self, row: isize, col: isize) -> Option<&T> {
        let row = usize::try_from(row).ok()?;
        let col = usize::try_from(col).ok()?;
        self.get(row, col)
    }

    /// Borrow one row.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[T]> {
        if row < self.rows {
            let start = row * self.cols;
            self.data.get(start..start + self.cols)
        } else {
            None
        }
    }

    /// Iterate over rows as slices.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks_exact(self.cols)
    }

    /// Iterate over cells in row-major order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// The row-major backing buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consume the grid and return its row-major buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Apply `f` to every cell, keeping the dimensions.
    #[must_use]
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Build a grid whose dimensions are already known to be valid.
    pub(crate) const fn from_parts(rows: usize, cols: usize, data: Vec<T>) -> Self {
        Self { rows, cols, data }
    }
}

impl Grid<bool> {
    /// Number of `true` cells.
    #[must_use]
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&cell| cell).count()
    }
}

impl<T: Clone> Grid<T> {
    /// A grid with every cell set to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Empty`] if either dimension is zero.
    pub fn filled(rows: usize, cols: usize, value: T) -> Result<Self, GridError> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty);
        }
        Ok(Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        })
    }
}
