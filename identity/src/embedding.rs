//! Appearance embeddings and cosine similarity

use crate::error::{IdentityError, Result};

/// Fixed-length appearance descriptor produced by an external model.
///
/// Construction validates and L2-normalizes the vector, so cosine
/// similarity between two embeddings reduces to their inner product.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(IdentityError::invalid_embedding("empty vector"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(IdentityError::invalid_embedding("non-finite component"));
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return Err(IdentityError::invalid_embedding("zero-norm vector"));
        }

        Ok(Self(values.into_iter().map(|v| v / norm).collect()))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Cosine similarity in [-1, 1]. Vectors of different lengths never
    /// match (similarity 0).
    pub fn cosine(&self, other: &Embedding) -> f32 {
        if self.dim() != other.dim() {
            return 0.0;
        }
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }
}

/// Weight of the best single match in the window score.
const MAX_WEIGHT: f32 = 0.7;

/// Appearance score of a query against an identity's embedding window.
///
/// The maximum similarity dominates (the window holds several poses of the
/// same person and one good match is strong evidence) but is blended with
/// the window mean so one noisy outlier cannot carry the decision alone.
pub fn window_score<'a, I>(query: &Embedding, window: I) -> f32
where
    I: IntoIterator<Item = &'a Embedding>,
{
    let sims: Vec<f32> = window.into_iter().map(|e| query.cosine(e)).collect();
    if sims.is_empty() {
        return 0.0;
    }

    let max = sims.iter().cloned().fold(f32::MIN, f32::max);
    let mean = sims.iter().sum::<f32>() / sims.len() as f32;
    MAX_WEIGHT * max + (1.0 - MAX_WEIGHT) * mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalization() {
        let e = Embedding::new(vec![3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(e.as_slice()[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(e.as_slice()[1], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(e.cosine(&e), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rejects_bad_vectors() {
        assert!(Embedding::new(vec![]).is_err());
        assert!(Embedding::new(vec![0.0, 0.0]).is_err());
        assert!(Embedding::new(vec![1.0, f32::NAN]).is_err());
        assert!(Embedding::new(vec![1.0, f32::INFINITY]).is_err());
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]).unwrap();
        let b = Embedding::new(vec![0.0, 1.0]).unwrap();
        let neg = Embedding::new(vec![-1.0, 0.0]).unwrap();

        assert_abs_diff_eq!(a.cosine(&b), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.cosine(&neg), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_is_zero() {
        let a = Embedding::new(vec![1.0, 0.0]).unwrap();
        let b = Embedding::new(vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(a.cosine(&b), 0.0);
    }

    #[test]
    fn test_window_score_blends_max_and_mean() {
        let query = Embedding::new(vec![1.0, 0.0]).unwrap();
        let close = Embedding::new(vec![1.0, 0.1]).unwrap();
        let far = Embedding::new(vec![0.0, 1.0]).unwrap();

        let score = window_score(&query, [&close, &far]);
        let max = query.cosine(&close);
        let mean = (query.cosine(&close) + query.cosine(&far)) / 2.0;
        assert_abs_diff_eq!(score, 0.7 * max + 0.3 * mean, epsilon = 1e-5);

        // Empty window scores zero.
        assert_eq!(window_score(&query, std::iter::empty()), 0.0);
    }
}
