//! edgetrace-cluster: seeded one-dimensional k-means.
//!
//! [`KMeans`] implements [`Clusterer`] for the automatic threshold
//! stage of `edgetrace-pipeline`. All randomness comes from a
//! [`ChaCha8Rng`] seeded with [`KMeans::seed`], so a given seed and input
//! always produce the same centroids.
//!
//! Seeding is either k-means++ (first centroid uniform, each further
//! centroid drawn with probability proportional to its squared distance
//! from the nearest centroid chosen so far) or `k` distinct values drawn
//! uniformly. Lloyd iterations follow until no centroid moves by
//! `epsilon` or more, or the iteration cap is reached. Centroids are
//! returned in seeding order, not sorted.

use edgetrace_pipeline::{ClusterError, ClusterRequest, Clusterer};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Seeded k-means over one-dimensional points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KMeans {
    seed: u64,
}

impl KMeans {
    /// Seed used by [`Default`].
    pub const DEFAULT_SEED: u64 = 0;

    /// A clusterer drawing its randomness from `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// The RNG seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl Clusterer for KMeans {
    fn cluster(&self, points: &[f64], request: &ClusterRequest) -> Result<Vec<f64>, ClusterError> {
        validate(points, request)?;

        let mut distinct = points.to_vec();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();
        if distinct.len() < request.k {
            return Err(ClusterError::TooFewPoints {
                points: distinct.len(),
                k: request.k,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut centroids = if request.seeded {
            plus_plus(points, request.k, &mut rng)?
        } else {
            sample_distinct(&distinct, request.k, &mut rng)
        };
        log::debug!("k-means seeded with {centroids:?}");

        for iteration in 1..=request.max_iterations {
            let shift = lloyd_step(points, &mut centroids);
            if shift < request.epsilon {
                log::debug!("k-means converged after {iteration} iterations");
                break;
            }
        }
        Ok(centroids)
    }
}

fn validate(points: &[f64], request: &ClusterRequest) -> Result<(), ClusterError> {
    if request.k == 0 {
        return Err(ClusterError::InvalidRequest("k must be at least 1".to_string()));
    }
    if request.max_iterations == 0 {
        return Err(ClusterError::InvalidRequest(
            "max_iterations must be at least 1".to_string(),
        ));
    }
    if !request.epsilon.is_finite() || request.epsilon < 0.0 {
        return Err(ClusterError::InvalidRequest(format!(
            "epsilon must be finite and non-negative, got {}",
            request.epsilon
        )));
    }
    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(ClusterError::InvalidRequest(format!(
            "point {index} is not finite"
        )));
    }
    Ok(())
}

/// k-means++ seeding.
///
/// Every point already chosen has weight zero, so `k` draws yield `k`
/// distinct centroids whenever the input holds `k` distinct values.
fn plus_plus(points: &[f64], k: usize, rng: &mut ChaCha8Rng) -> Result<Vec<f64>, ClusterError> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    let mut nearest: Vec<f64> = points
        .iter()
        .map(|&p| (p - centroids[0]).powi(2))
        .collect();
    while centroids.len() < k {
        let weights = WeightedIndex::new(&nearest)
            .map_err(|e| ClusterError::InvalidRequest(format!("k-means++ seeding: {e}")))?;
        let chosen = points[weights.sample(rng)];
        centroids.push(chosen);
        for (d, &p) in nearest.iter_mut().zip(points) {
            *d = d.min((p - chosen).powi(2));
        }
    }
    Ok(centroids)
}

/// Draw `k` of the `distinct` values uniformly without replacement.
fn sample_distinct(distinct: &[f64], k: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    rand::seq::index::sample(rng, distinct.len(), k)
        .into_iter()
        .map(|i| distinct[i])
        .collect()
}

/// Index of the centroid nearest `point`; ties go to the lower index.
fn nearest(centroids: &[f64], point: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, &c) in centroids.iter().enumerate() {
        let distance = (point - c).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Reassign every point and move each centroid to the mean of its
/// members. Empty clusters keep their centroid. Returns the largest
/// distance any centroid moved.
fn lloyd_step(points: &[f64], centroids: &mut [f64]) -> f64 {
    let mut sums = vec![0.0; centroids.len()];
    let mut counts = vec![0_usize; centroids.len()];
    for &p in points {
        let i = nearest(centroids, p);
        sums[i] += p;
        counts[i] += 1;
    }

    let mut shift = 0.0_f64;
    for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
        if count == 0 {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / count as f64;
        shift = shift.max((mean - *centroid).abs());
        *centroid = mean;
    }
    shift
}
