//! Greedy farthest-point (max-min diversity) selection.
//!
//! [`select`] picks `k` of `N` embeddings that spread across the pool rather
//! than clustering in its densest region. The seed is the most atypical point
//! (largest average distance to the rest); every following pick is the
//! candidate whose nearest already-selected neighbour is farthest away. This
//! is the classic greedy 2-approximation for k-center.
//!
//! Ties always go to the lowest original index, so the output is a pure
//! function of the input order. Cost is O(N²) for the distance matrix plus
//! O(k·N) for the rounds; keep N in the low hundreds.

use ndarray::Array2;

use super::vector::{check_dimensions, pairwise_distance_matrix};
use crate::error::{HistoryError, Result};

/// Select up to `k` indices into `vectors`, in selection order (seed first).
///
/// When `k >= N` every index is returned in input order without computing
/// any distances.
pub fn select<V: AsRef<[f32]>>(vectors: &[V], k: usize) -> Result<Vec<usize>> {
    if k == 0 {
        return Err(HistoryError::invalid("selection size k must be at least 1"));
    }
    check_dimensions(vectors)?;

    let n = vectors.len();
    if k >= n {
        return Ok((0..n).collect());
    }

    let matrix = pairwise_distance_matrix(vectors)?;
    Ok(select_from_matrix(&matrix, k))
}

/// Greedy selection over a precomputed distance matrix. `k` is clamped to N.
pub fn select_from_matrix(matrix: &Array2<f64>, k: usize) -> Vec<usize> {
    let n = matrix.nrows();
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }

    let seed = seed_index(matrix);
    let mut selected = Vec::with_capacity(k);
    let mut taken = vec![false; n];
    // Distance from each candidate to its nearest selected point.
    let mut nearest: Vec<f64> = matrix.row(seed).to_vec();

    selected.push(seed);
    taken[seed] = true;

    while selected.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for (j, &d) in nearest.iter().enumerate() {
            if taken[j] {
                continue;
            }
            // Strictly greater keeps the lowest index among ties.
            if best.map_or(true, |(_, best_d)| d > best_d) {
                best = Some((j, d));
            }
        }
        let Some((next, _)) = best else {
            break;
        };

        selected.push(next);
        taken[next] = true;
        for (j, d) in nearest.iter_mut().enumerate() {
            *d = d.min(matrix[[next, j]]);
        }
    }

    selected
}

/// Index with the largest average distance to all other points.
fn seed_index(matrix: &Array2<f64>) -> usize {
    let n = matrix.nrows();
    let others = n.saturating_sub(1).max(1) as f64;
    let mut best = 0;
    let mut best_avg = f64::NEG_INFINITY;
    for (i, row) in matrix.rows().into_iter().enumerate() {
        let avg = row.sum() / others;
        if avg > best_avg {
            best = i;
            best_avg = avg;
        }
    }
    best
}
