//! Hysteresis classification and edge tracing.
//!
//! Pixels are classified against the two thresholds, then every strong
//! pixel seeds an 8-connected flood over strong and weak pixels. Weak
//! pixels survive only when some strong pixel reaches them.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::threshold::Thresholds;

/// Eight-neighborhood offsets, `(row, col)`.
const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Hysteresis class of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgeClass {
    /// Below the low threshold.
    #[default]
    None,
    /// At or above the low threshold, below the high threshold.
    Weak,
    /// At or above the high threshold.
    Strong,
}

impl EdgeClass {
    /// Classify a single magnitude.
    #[must_use]
    pub const fn of(magnitude: i32, thresholds: Thresholds) -> Self {
        if magnitude >= thresholds.high() {
            Self::Strong
        } else if magnitude >= thresholds.low() {
            Self::Weak
        } else {
            Self::None
        }
    }

    /// Whether tracing may pass through this pixel.
    #[must_use]
    pub const fn is_candidate(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Classify every cell of `magnitude`.
#[must_use]
pub fn classify(magnitude: &Grid<i32>, thresholds: Thresholds) -> Grid<EdgeClass> {
    magnitude.map(|&m| EdgeClass::of(m, thresholds))
}

/// Connected-component statistics from one tracing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentStats {
    /// Components written to the edge map.
    pub kept: usize,
    /// Components dropped by the size filter.
    pub discarded: usize,
    /// Pixel count of the largest component, kept or not.
    pub largest: usize,
}

/// Result of [`trace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceOutcome {
    /// `true` for pixels of every kept component.
    pub edges: Grid<bool>,
    /// Component statistics.
    pub components: ComponentStats,
}

/// Trace edge components seeded from strong pixels.
///
/// Seeds are visited in row-major order. Each component holds every
/// strong or weak pixel 8-connected to its seed that no earlier
/// component claimed. Components with fewer than `min_edge_size` pixels
/// are discarded.
#[must_use]
pub fn trace(classes: &Grid<EdgeClass>, min_edge_size: usize) -> TraceOutcome {
    let (rows, cols) = (classes.rows(), classes.cols());
    let cells = classes.as_slice();
    let mut visited = vec![false; cells.len()];
    let mut edges = vec![false; cells.len()];
    let mut stats = ComponentStats::default();

    let mut stack = Vec::new();
    let mut component = Vec::new();

    for seed in 0..cells.len() {
        if visited[seed] || cells[seed] != EdgeClass::Strong {
            continue;
        }

        visited[seed] = true;
        stack.push(seed);
        component.clear();

        while let Some(index) = stack.pop() {
            component.push(index);
            let (row, col) = (index / cols, index % cols);
            for (dr, dc) in NEIGHBORS {
                let (Some(r), Some(c)) = (row.checked_add_signed(dr), col.checked_add_signed(dc))
                else {
                    continue;
                };
                if r >= rows || c >= cols {
                    continue;
                }
                let neighbor = r * cols + c;
                if !visited[neighbor] && cells[neighbor].is_candidate() {
                    visited[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }

        stats.largest = stats.largest.max(component.len());
        if component.len() >= min_edge_size {
            stats.kept += 1;
            for &index in &component {
                edges[index] = true;
            }
        } else {
            stats.discarded += 1;
        }
    }

    TraceOutcome {
        edges: Grid::from_parts(rows, cols, edges),
        components: stats,
    }
}
