//! Cosine distance and the pairwise distance matrix.
//!
//! Distances are computed in f64 regardless of the f32 storage type.
//! Zero-magnitude vectors have no direction, so cosine is undefined for them;
//! they are placed at distance 1.0 from every non-zero vector (and 0.0 from
//! each other) so that selection stays total.

use ndarray::Array2;

use crate::error::{HistoryError, Result};

/// Cosine distance `1 - cos(a, b)`, in `[0.0, 2.0]`.
pub fn distance(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(HistoryError::invalid(format!(
            "embedding dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(distance_unchecked(a, b))
}

fn distance_unchecked(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => {
            let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
            1.0 - similarity
        }
    }
}

/// Validate that every vector has the same dimension and only finite
/// components. Returns the common dimension (0 for an empty slice).
pub fn check_dimensions<V: AsRef<[f32]>>(vectors: &[V]) -> Result<usize> {
    let Some(first) = vectors.first() else {
        return Ok(0);
    };
    let dim = first.as_ref().len();
    for (i, v) in vectors.iter().enumerate() {
        let v = v.as_ref();
        if v.len() != dim {
            return Err(HistoryError::invalid(format!(
                "embedding {i} has {} dimensions, expected {dim}",
                v.len()
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(HistoryError::invalid(format!(
                "embedding {i} contains non-finite values"
            )));
        }
    }
    Ok(dim)
}

/// Symmetric N×N cosine distance matrix with a zero diagonal.
///
/// O(N²) time and space: callers must keep N small.
pub fn pairwise_distance_matrix<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Array2<f64>> {
    check_dimensions(vectors)?;
    let n = vectors.len();
    let mut matrix = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distance_unchecked(vectors[i].as_ref(), vectors[j].as_ref());
            matrix[[i, j]] = d;
            matrix[[j, i]] = d;
        }
    }
    Ok(matrix)
}

/// Smallest distance between any two of the indexed vectors, or `None` when
/// fewer than two are given. Used to report how spread out a selection is.
pub fn min_pairwise_distance(matrix: &Array2<f64>, indices: &[usize]) -> Option<f64> {
    let mut min: Option<f64> = None;
    for (pos, &i) in indices.iter().enumerate() {
        for &j in &indices[pos + 1..] {
            let d = matrix[[i, j]];
            min = Some(min.map_or(d, |m| m.min(d)));
        }
    }
    min
}
