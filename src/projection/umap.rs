//! UMAP-style nonlinear 2D layout.
//!
//! A deliberately small implementation of the usual pipeline: exact kNN on
//! the input vectors, fuzzy neighborhood weights via the smooth-kNN
//! calibration, then negative-sampling SGD over the weighted edges. The
//! parameters favor spread-out, non-overlapping clusters over strict
//! neighborhood fidelity. Initialization is random, so two runs over the
//! same input produce different (equally valid) layouts.

use super::ProjectionError;
use rand::Rng;

/// Gradient clip bound used by the SGD updates.
const CLIP: f32 = 4.0;

/// Repulsive force applied when two points collapse onto each other.
const COLLAPSE_PUSH: f32 = 4.0;

#[derive(Debug, Clone)]
pub(crate) struct UmapParams {
    pub n_neighbors: usize,
    pub min_dist: f32,
    pub spread: f32,
    pub n_epochs: usize,
    pub learning_rate: f32,
    pub negative_sample_rate: usize,
}

impl UmapParams {
    /// Parameters scaled to the item count: neighbor count grows with the
    /// collection but stays in [2, 8]; epochs scale mildly and are capped
    /// for latency; min_dist/spread are tuned for a readable graph.
    pub fn for_item_count(n: usize) -> Self {
        Self {
            n_neighbors: ((n as f32 * 0.1).floor() as usize).clamp(2, 8),
            min_dist: 0.3,
            spread: 2.0,
            n_epochs: (n * 2).clamp(50, 100),
            learning_rate: 1.0,
            negative_sample_rate: 5,
        }
    }
}

/// Run the layout over ≥3 equal-length vectors.
///
/// Returns one 2D coordinate per input, in input order. Fails only when the
/// optimization blows up into non-finite territory; the caller downgrades
/// that to a circular fallback.
pub(crate) fn fit(
    embeddings: &[Vec<f32>],
    params: &UmapParams,
) -> Result<Vec<[f32; 2]>, ProjectionError> {
    let n = embeddings.len();
    debug_assert!(n >= 3, "fit requires at least 3 items");

    let k = params.n_neighbors.min(n - 1);

    let knn = nearest_neighbors(embeddings, k);
    let edges = fuzzy_edges(&knn, k, params.n_epochs);
    let (a, b) = fit_ab(params.min_dist, params.spread);

    let mut rng = rand::rng();
    let mut positions: Vec<[f32; 2]> = (0..n)
        .map(|_| {
            [
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
            ]
        })
        .collect();

    optimize(&mut positions, &edges, a, b, params, &mut rng);

    if positions.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(ProjectionError::NotFinite);
    }

    Ok(positions)
}

/// Exact k-nearest-neighbors by euclidean distance. Quadratic, which is
/// fine at collection scale.
fn nearest_neighbors(embeddings: &[Vec<f32>], k: usize) -> Vec<Vec<(usize, f32)>> {
    let n = embeddings.len();

    (0..n)
        .map(|i| {
            let mut dists: Vec<(usize, f32)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, euclidean(&embeddings[i], &embeddings[j])))
                .collect();

            dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            dists.truncate(k);
            dists
        })
        .collect()
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Weighted, symmetrized edge list from the kNN graph.
///
/// Per-point weights come from the smooth-kNN calibration: each point gets
/// a bandwidth sigma such that its neighbor weights sum to log2(k), with
/// the nearest neighbor (distance rho) pinned at weight 1. The directed
/// weights are then combined as `w_ij + w_ji − w_ij·w_ji`. Edges too weak
/// to ever be sampled within the epoch budget are dropped.
fn fuzzy_edges(
    knn: &[Vec<(usize, f32)>],
    k: usize,
    n_epochs: usize,
) -> Vec<(usize, usize, f32)> {
    use std::collections::HashMap;

    let target = (k as f32).log2().max(1.0);

    let mut directed: HashMap<(usize, usize), f32> = HashMap::new();
    for (i, neighbors) in knn.iter().enumerate() {
        let rho = neighbors
            .iter()
            .map(|(_, d)| *d)
            .find(|d| *d > 0.0)
            .unwrap_or(0.0);

        let sigma = calibrate_sigma(neighbors, rho, target);

        for (j, d) in neighbors {
            let w = if sigma > 0.0 {
                (-(d - rho).max(0.0) / sigma).exp()
            } else {
                1.0
            };
            directed.insert((i, *j), w);
        }
    }

    let mut undirected: HashMap<(usize, usize), (f32, f32)> = HashMap::new();
    for (&(i, j), &w) in &directed {
        let key = (i.min(j), i.max(j));
        let slot = undirected.entry(key).or_insert((0.0, 0.0));
        if i < j {
            slot.0 = w;
        } else {
            slot.1 = w;
        }
    }

    let mut edges: Vec<(usize, usize, f32)> = undirected
        .into_iter()
        .map(|((i, j), (wf, wb))| (i, j, wf + wb - wf * wb))
        .collect();

    // prune edges that would never fire given the epoch budget
    let max_w = edges.iter().map(|(_, _, w)| *w).fold(0.0f32, f32::max);
    if max_w > 0.0 {
        let floor = max_w / n_epochs as f32;
        edges.retain(|(_, _, w)| *w >= floor);
    }

    edges
}

/// Bisect the bandwidth so the neighbor weights sum to the target. The sum
/// grows monotonically with sigma, so 64 halvings pin it down to float
/// precision.
fn calibrate_sigma(neighbors: &[(usize, f32)], rho: f32, target: f32) -> f32 {
    let mut lo = 1e-5f32;
    let mut hi = 1e4f32;
    let mut sigma = 1.0f32;

    for _ in 0..64 {
        sigma = (lo + hi) / 2.0;
        let sum: f32 = neighbors
            .iter()
            .map(|(_, d)| (-(d - rho).max(0.0) / sigma).exp())
            .sum();

        if (sum - target).abs() < 1e-5 {
            break;
        }

        if sum > target {
            hi = sigma;
        } else {
            lo = sigma;
        }
    }

    sigma
}

/// Fit the differentiable curve `1 / (1 + a·x^(2b))` to the target
/// membership function defined by min_dist and spread. A two-pass grid
/// search is plenty at this precision and keeps the fit deterministic.
fn fit_ab(min_dist: f32, spread: f32) -> (f32, f32) {
    const SAMPLES: usize = 300;

    let xs: Vec<f32> = (0..SAMPLES)
        .map(|i| (i as f32 / SAMPLES as f32) * 3.0 * spread)
        .collect();
    let ys: Vec<f32> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let sse = |a: f32, b: f32| -> f32 {
        xs.iter()
            .zip(ys.iter())
            .map(|(&x, &y)| {
                let f = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (f - y) * (f - y)
            })
            .sum()
    };

    let mut best = (1.0f32, 1.0f32);
    let mut best_err = f32::MAX;

    // coarse pass
    for ai in 1..=200 {
        let a = ai as f32 * 0.05;
        for bi in 2..=50 {
            let b = bi as f32 * 0.05;
            let err = sse(a, b);
            if err < best_err {
                best_err = err;
                best = (a, b);
            }
        }
    }

    // refine around the coarse winner
    let (ca, cb) = best;
    for ai in -10i32..=10 {
        let a = (ca + ai as f32 * 0.005).max(1e-3);
        for bi in -10i32..=10 {
            let b = (cb + bi as f32 * 0.005).max(1e-2);
            let err = sse(a, b);
            if err < best_err {
                best_err = err;
                best = (a, b);
            }
        }
    }

    best
}

/// Negative-sampling SGD over the edge list. Strong edges fire every
/// epoch, weak ones proportionally less often, matching the reference
/// sampling schedule.
fn optimize(
    positions: &mut [[f32; 2]],
    edges: &[(usize, usize, f32)],
    a: f32,
    b: f32,
    params: &UmapParams,
    rng: &mut impl Rng,
) {
    let n = positions.len();
    if edges.is_empty() {
        return;
    }

    let max_w = edges.iter().map(|(_, _, w)| *w).fold(0.0f32, f32::max);
    let epochs_per_sample: Vec<f32> = edges.iter().map(|(_, _, w)| max_w / w).collect();
    let mut next_sample = epochs_per_sample.clone();

    for epoch in 1..=params.n_epochs {
        let alpha = params.learning_rate * (1.0 - epoch as f32 / params.n_epochs as f32);

        for (e, &(i, j, _)) in edges.iter().enumerate() {
            if next_sample[e] > epoch as f32 {
                continue;
            }
            next_sample[e] += epochs_per_sample[e];

            apply_attraction(positions, i, j, a, b, alpha);

            for _ in 0..params.negative_sample_rate {
                let other = rng.random_range(0..n);
                if other == i || other == j {
                    continue;
                }
                apply_repulsion(positions, i, other, a, b, alpha);
            }
        }
    }
}

fn apply_attraction(positions: &mut [[f32; 2]], i: usize, j: usize, a: f32, b: f32, alpha: f32) {
    let d2 = dist2(&positions[i], &positions[j]);
    if d2 <= 0.0 {
        return;
    }

    let coeff = (-2.0 * a * b * d2.powf(b - 1.0)) / (1.0 + a * d2.powf(b));

    for dim in 0..2 {
        let grad = clip(coeff * (positions[i][dim] - positions[j][dim]));
        positions[i][dim] += alpha * grad;
        positions[j][dim] -= alpha * grad;
    }
}

fn apply_repulsion(positions: &mut [[f32; 2]], i: usize, other: usize, a: f32, b: f32, alpha: f32) {
    let d2 = dist2(&positions[i], &positions[other]);

    for dim in 0..2 {
        let grad = if d2 > 0.0 {
            let coeff = (2.0 * b) / ((0.001 + d2) * (1.0 + a * d2.powf(b)));
            clip(coeff * (positions[i][dim] - positions[other][dim]))
        } else {
            COLLAPSE_PUSH
        };
        positions[i][dim] += alpha * grad;
    }
}

fn dist2(p: &[f32; 2], q: &[f32; 2]) -> f32 {
    let dx = p[0] - q[0];
    let dy = p[1] - q[1];
    dx * dx + dy * dy
}

fn clip(v: f32) -> f32 {
    v.clamp(-CLIP, CLIP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_scale_with_item_count() {
        let small = UmapParams::for_item_count(5);
        assert_eq!(small.n_neighbors, 2);
        assert_eq!(small.n_epochs, 50);

        let medium = UmapParams::for_item_count(40);
        assert_eq!(medium.n_neighbors, 4);
        assert_eq!(medium.n_epochs, 80);

        let large = UmapParams::for_item_count(500);
        assert_eq!(large.n_neighbors, 8);
        assert_eq!(large.n_epochs, 100);
    }

    #[test]
    fn test_fit_ab_matches_curve_shape() {
        let (a, b) = fit_ab(0.3, 2.0);
        assert!(a > 0.0 && b > 0.0);

        let f = |x: f32| 1.0 / (1.0 + a * x.powf(2.0 * b));
        // membership is 1 at the origin and decays monotonically
        assert!((f(0.0) - 1.0).abs() < 1e-3);
        assert!(f(0.5) > f(1.0));
        assert!(f(1.0) > f(3.0));
        assert!(f(6.0) < 0.3);
    }

    #[test]
    fn test_calibrate_sigma_hits_target() {
        let neighbors = vec![(1, 0.5f32), (2, 1.0), (3, 1.5), (4, 2.0)];
        let target = 2.0;
        let sigma = calibrate_sigma(&neighbors, 0.5, target);

        let sum: f32 = neighbors
            .iter()
            .map(|(_, d)| (-(d - 0.5f32).max(0.0) / sigma).exp())
            .sum();
        assert!((sum - target).abs() < 1e-3);
    }

    #[test]
    fn test_fit_produces_finite_positions() {
        let embeddings: Vec<Vec<f32>> = (0..12)
            .map(|i| {
                let base = if i < 6 { 0.0 } else { 10.0 };
                vec![base + (i % 6) as f32 * 0.1, base, base - (i % 3) as f32 * 0.1]
            })
            .collect();

        let params = UmapParams::for_item_count(embeddings.len());
        let positions = fit(&embeddings, &params).unwrap();

        assert_eq!(positions.len(), 12);
        assert!(positions
            .iter()
            .all(|p| p[0].is_finite() && p[1].is_finite()));

        // the layout must actually separate points
        let first = positions[0];
        assert!(positions.iter().any(|p| *p != first));
    }

    #[test]
    fn test_fit_handles_identical_points() {
        // all-equal vectors: every distance is zero, weights are flat
        let embeddings: Vec<Vec<f32>> = (0..5).map(|_| vec![1.0, 2.0, 3.0]).collect();
        let params = UmapParams::for_item_count(5);

        let positions = fit(&embeddings, &params).unwrap();
        assert_eq!(positions.len(), 5);
        assert!(positions
            .iter()
            .all(|p| p[0].is_finite() && p[1].is_finite()));
    }
}
