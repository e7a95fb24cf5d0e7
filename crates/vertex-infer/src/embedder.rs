//! Embedding engine trait and the pinned hash embedder.
//!
//! Every backend must be deterministic: the same text always yields a
//! byte-identical vector, so catalog search is reproducible.

use ndarray::Array1;
use sha2::{Digest, Sha256};
use vertex_core::Result;

/// Trait for embedding backends.
pub trait EmbedderBackend: Send + Sync {
    /// Generate an embedding for a text string.
    fn embed(&self, text: &str) -> Result<Array1<f32>>;

    /// Generate embeddings for a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Identifier of the pinned model, recorded in logs and stats.
    fn name(&self) -> &str;
}

/// Weight of whole-word features relative to character trigrams.
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing embedder: SHA-256 of word and trigram features, signed
/// bucket accumulation, L2-normalized. Needs no model files.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn accumulate(&self, vector: &mut Array1<f32>, feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dim as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbedderBackend for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Array1<f32>> {
        let mut vector = Array1::<f32>::zeros(self.dim);
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.accumulate(&mut vector, word, WORD_WEIGHT);

            let padded: Vec<char> = format!("#{}#", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.dot(&vector).sqrt();
        if norm > 0.0 {
            vector /= norm;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "sha256-feature-hash-v1"
    }
}
