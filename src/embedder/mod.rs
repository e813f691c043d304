//! Embedding capability seam shared by HTTP clients and offline doubles.

pub mod hashing;
pub mod openai;

use anyhow::{anyhow, Result};

/// Tolerance used when checking that a vector is unit length.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-5;

/// A pluggable embedding model.
///
/// Implementations must be deterministic for a given model version and emit
/// fixed-dimension unit vectors. Corpus and query embeddings must come from
/// the same model so both live in the same metric space; the default
/// [`Embedder::embed_query`] guarantees that by routing through
/// [`Embedder::embed_batch`].
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts, returning one unit vector per input in
    /// input order.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single query text in the corpus metric space.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text])?;
        anyhow::ensure!(
            vectors.len() == 1,
            "embedding backend returned {} vectors for one query",
            vectors.len()
        );
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedding backend returned no vector"))
    }
}

/// Euclidean norm of a vector.
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scales a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Whether the vector norm is within [`UNIT_NORM_TOLERANCE`] of 1.
pub fn is_unit_norm(vector: &[f32]) -> bool {
    (l2_norm(vector) - 1.0).abs() < UNIT_NORM_TOLERANCE
}
