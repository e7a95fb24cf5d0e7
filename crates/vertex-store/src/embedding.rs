//! Embedding blob codec and cosine similarity.
//!
//! Blobs are raw little-endian f32, exactly `dim * 4` bytes.

use ndarray::Array1;
use vertex_core::{Error, Result};

/// Encode an embedding as a little-endian f32 blob.
pub fn encode_f32_le(embedding: &Array1<f32>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding.iter() {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a blob produced by [`encode_f32_le`], checking its length against `dim`.
pub fn decode_f32_le(bytes: &[u8], dim: usize) -> Result<Array1<f32>> {
    if bytes.len() != dim * 4 {
        return Err(Error::Storage(format!(
            "embedding blob is {} bytes, expected {}",
            bytes.len(),
            dim * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// `dot(a, b) / (|a||b|)`, or 0 when either norm is 0.
pub fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(b) / (norm_a * norm_b)
}
