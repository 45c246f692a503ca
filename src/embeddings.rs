//! The embedding-model collaborator (out of scope per spec §1): this module
//! defines the trait the core depends on, plus a deterministic stand-in used
//! by tests and as the default provider — the same role the teacher's
//! `MockLocalModel` plays for its local embedding provider.

use crate::element::Vector;
use crate::error::Result;
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `Embed(text) -> vector[D]`, `Dimensions() -> D`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vector>;
    fn dimensions(&self) -> usize;
    fn name(&self) -> &str;
}

/// Deterministic, dependency-free embedding stand-in: hashes shingles of the
/// input into a seeded PRNG and projects onto a unit vector. Stable for a
/// given text within the process (and across processes, since the seed is
/// derived purely from content), which is all the embedding collaborator
/// contract in spec §6 requires.
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

/// Default embedding dimension for the stand-in provider.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vector> {
        let seed = seed_from_text(text);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut v: Vector = (0..self.dimensions)
            .map(|_| rng.random_range(-1.0f32..=1.0f32))
            .collect();
        normalize_in_place(&mut v);
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing-stand-in"
    }
}

fn seed_from_text(text: &str) -> u64 {
    let hash = blake3::hash(text.as_bytes());
    let bytes = hash.as_bytes();
    u64::from_le_bytes(bytes[0..8].try_into().expect("blake3 hash is 32 bytes"))
}

fn normalize_in_place(v: &mut [f32]) {
    let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors. Distance is `1 - cosine`.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = (a.iter().map(|x| x * x).sum::<f32>()).sqrt();
    let norm_b = (b.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedding_is_deterministic_for_same_text() {
        let provider = HashingEmbeddingProvider::new(32);
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embedding_differs_for_different_text() {
        let provider = HashingEmbeddingProvider::new(32);
        let a = provider.embed("hello").await.unwrap();
        let b = provider.embed("goodbye").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }
}
