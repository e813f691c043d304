//! Deterministic feature-hashing embedder for offline use and tests.

use anyhow::Result;

use super::{normalize_in_place, Embedder};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Default dimension for hashed vectors.
pub const DEFAULT_HASH_DIMENSION: usize = 128;

/// Embedder that hashes token features onto a fixed-dimension unit vector.
///
/// No model service involved: the same text always maps to the same vector,
/// which makes it suitable as a no-network fallback and as the test double
/// behind the retrieval contract. Similarity quality is crude (shared
/// tokens and character bigrams raise the dot product) but the output
/// satisfies the [`Embedder`] contract exactly.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Builds a hashing embedder with the given vector dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Vector dimension produced by this embedder.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let lowered = token.to_lowercase();
            bump(&mut vector, &lowered);
            // Character bigrams cover scripts written without spaces.
            let chars: Vec<char> = lowered.chars().collect();
            for pair in chars.windows(2) {
                let bigram: String = pair.iter().collect();
                bump(&mut vector, &bigram);
            }
        }
        normalize_in_place(&mut vector);
        if vector.iter().all(|v| *v == 0.0) {
            // Blank input still gets a valid unit vector.
            vector[0] = 1.0;
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn bump(vector: &mut [f32], feature: &str) {
    let slot = (fnv1a(feature.as_bytes()) % vector.len() as u64) as usize;
    vector[slot] += 1.0;
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
