//! Non-maximum suppression: thin gradient ridges to single-pixel width.
//!
//! A pixel keeps its magnitude only if neither neighbor along its
//! quantized gradient direction is strictly greater. Neighbors outside
//! the grid never suppress. Every comparison reads the unsuppressed
//! input, so cells are independent and the stage runs row-parallel.

use rayon::prelude::*;

use crate::gradient::{Direction, GradientField};
use crate::grid::Grid;
use crate::types::PipelineError;

/// Suppress non-maximal magnitudes in `field`.
#[must_use]
pub fn suppress(field: &GradientField) -> Grid<i32> {
    thin(&field.magnitude, &field.direction)
}

/// Suppress non-maximal cells of `magnitude` using `direction`.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the two grids differ
/// in size.
pub fn suppress_magnitudes(
    magnitude: &Grid<i32>,
    direction: &Grid<Direction>,
) -> Result<Grid<i32>, PipelineError> {
    if magnitude.dimensions() != direction.dimensions() {
        return Err(PipelineError::DimensionMismatch {
            expected: magnitude.dimensions(),
            found: direction.dimensions(),
        });
    }
    Ok(thin(magnitude, direction))
}

/// Whether the cell at `(row, col)` survives suppression.
///
/// Out-of-bounds positions report `false`.
#[must_use]
pub fn is_local_maximum(
    magnitude: &Grid<i32>,
    direction: Direction,
    row: usize,
    col: usize,
) -> bool {
    let Some(&center) = magnitude.get(row, col) else {
        return false;
    };
    let (Ok(r), Ok(c)) = (isize::try_from(row), isize::try_from(col)) else {
        return false;
    };
    direction
        .neighbor_offsets()
        .iter()
        .all(|&(dr, dc)| magnitude.get_signed(r + dr, c + dc).is_none_or(|&n| n <= center))
}

fn thin(magnitude: &Grid<i32>, direction: &Grid<Direction>) -> Grid<i32> {
    let cols = magnitude.cols();
    let mut data = vec![0; magnitude.len()];
    data.par_chunks_mut(cols)
        .zip(direction.as_slice().par_chunks(cols))
        .enumerate()
        .for_each(|(row, (out_row, dir_row))| {
            for (col, (cell, &dir)) in out_row.iter_mut().zip(dir_row).enumerate() {
                if is_local_maximum(magnitude, dir, row, col) {
                    *cell = magnitude.get(row, col).copied().unwrap_or(0);
                }
            }
        });
    Grid::from_parts(magnitude.rows(), cols, data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid(rows: Vec<Vec<i32>>) -> Grid<i32> {
        Grid::from_rows(rows).unwrap()
    }

    fn uniform_direction(rows: usize, cols: usize, d: Direction) -> Grid<Direction> {
        Grid::filled(rows, cols, d).unwrap()
    }

    #[test]
    fn horizontal_keeps_row_peak_only() {
        let mag = grid(vec![vec![10, 50, 30, 30, 5]]);
        let out = suppress_magnitudes(&mag, &uniform_direction(1, 5, Direction::Horizontal)).unwrap();
        // Equal neighbors do not suppress each other.
        assert_eq!(out.as_slice(), &[0, 50, 0, 30, 0]);
    }

    #[test]
    fn vertical_compares_rows() {
        let mag = grid(vec![vec![1, 9], vec![5, 2], vec![3, 4]]);
        let out = suppress_magnitudes(&mag, &uniform_direction(3, 2, Direction::Vertical)).unwrap();
        assert_eq!(out.as_slice(), &[0, 9, 5, 0, 0, 4]);
    }

    #[test]
    fn diagonals_compare_the_right_corners() {
        let mag = grid(vec![vec![9, 0, 0], vec![0, 5, 0], vec![0, 0, 0]]);
        // Up-left neighbor (9) beats the center along the main diagonal...
        assert!(!is_local_maximum(&mag, Direction::DiagLeftUp, 1, 1));
        // ...but not along the anti-diagonal.
        assert!(is_local_maximum(&mag, Direction::DiagRightUp, 1, 1));

        let mag = grid(vec![vec![0, 0, 9], vec![0, 5, 0], vec![0, 0, 0]]);
        assert!(is_local_maximum(&mag, Direction::DiagLeftUp, 1, 1));
        assert!(!is_local_maximum(&mag, Direction::DiagRightUp, 1, 1));
    }

    #[test]
    fn out_of_bounds_neighbors_never_suppress() {
        let mag = grid(vec![vec![7]]);
        for d in [
            Direction::Horizontal,
            Direction::Vertical,
            Direction::DiagLeftUp,
            Direction::DiagRightUp,
        ] {
            assert!(is_local_maximum(&mag, d, 0, 0));
        }
        assert!(!is_local_maximum(&mag, Direction::Horizontal, 1, 0));
    }

    #[test]
    fn comparisons_read_unsuppressed_input() {
        // 40 is suppressed by 50; 30 must still compare against the
        // input 40, not the suppressed 0.
        let mag = grid(vec![vec![50, 40, 30]]);
        let out = suppress_magnitudes(&mag, &uniform_direction(1, 3, Direction::Horizontal)).unwrap();
        assert_eq!(out.as_slice(), &[50, 0, 0]);
    }

    #[test]
    fn mismatched_grids_are_rejected() {
        let mag = grid(vec![vec![1, 2]]);
        let result = suppress_magnitudes(&mag, &uniform_direction(2, 2, Direction::Vertical));
        assert!(matches!(
            result,
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    fn direction_strategy() -> impl Strategy<Value = Direction> {
        prop_oneof![
            Just(Direction::Horizontal),
            Just(Direction::Vertical),
            Just(Direction::DiagLeftUp),
            Just(Direction::DiagRightUp),
        ]
    }

    proptest! {
        #[test]
        fn prop_suppression_is_idempotent(
            rows in 1..10usize,
            cols in 1..10usize,
            data in prop::collection::vec(0..=255i32, 100),
            dirs in prop::collection::vec(direction_strategy(), 100),
        ) {
            let mag = Grid::from_vec(rows, cols, data[..rows * cols].to_vec()).unwrap();
            let dir = Grid::from_vec(rows, cols, dirs[..rows * cols].to_vec()).unwrap();
            let once = suppress_magnitudes(&mag, &dir).unwrap();
            let twice = suppress_magnitudes(&once, &dir).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_suppression_only_zeroes(
            rows in 1..10usize,
            cols in 1..10usize,
            data in prop::collection::vec(0..=255i32, 100),
            dirs in prop::collection::vec(direction_strategy(), 100),
        ) {
            let mag = Grid::from_vec(rows, cols, data[..rows * cols].to_vec()).unwrap();
            let dir = Grid::from_vec(rows, cols, dirs[..rows * cols].to_vec()).unwrap();
            let out = suppress_magnitudes(&mag, &dir).unwrap();
            for (&before, &after) in mag.iter().zip(out.iter()) {
                prop_assert!(after == before || after == 0);
            }
        }
    }
}
