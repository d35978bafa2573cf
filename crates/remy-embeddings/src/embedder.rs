use sha2::{Digest, Sha256};

use crate::error::{EmbeddingError, Result};
use crate::types::EMBEDDING_DIM;

/// Name reported alongside stored vectors so a future swap to a real model
/// invalidates old rows instead of silently comparing incompatible spaces.
pub const MODEL_NAME: &str = "remy-hashing-embedder-v1";

/// Deterministic local embedding function: hashes word and bigram tokens
/// into `EMBEDDING_DIM` buckets (the "hashing trick"), then L2-normalizes.
///
/// No network call and no model weights to ship — this is the local
/// fallback's own embedding story, appropriate at single-tenant scale
/// (spec §4.B only requires *a* consistent embedding space, not a
/// particular model).
pub fn embed_sync(text: &str) -> Vec<f32> {
    let mut buckets = vec![0f32; EMBEDDING_DIM];
    let tokens = tokenize(text);

    for window in tokens.windows(2) {
        hash_into(&format!("{} {}", window[0], window[1]), &mut buckets);
    }
    for tok in &tokens {
        hash_into(tok, &mut buckets);
    }

    l2_normalize(&mut buckets);
    buckets
}

/// Runs `embed_sync` on the blocking thread pool, per the "CPU-bound work
/// never blocks the event loop" resource-model rule.
pub async fn embed(text: &str) -> Result<Vec<f32>> {
    let owned = text.to_string();
    tokio::task::spawn_blocking(move || embed_sync(&owned))
        .await
        .map_err(|e| EmbeddingError::WorkerPanicked(e.to_string()))
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    // Vectors are already L2-normalized, so cosine similarity is the plain
    // dot product; distance is 1 - similarity, clamped to [0, 2].
    (1.0 - dot).clamp(0.0, 2.0)
}

pub fn vector_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn hash_into(token: &str, buckets: &mut [f32]) {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let bucket_idx = (u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize)
        % buckets.len();
    // Sign bit from a second byte avoids every token contributing positively,
    // which would otherwise bias all vectors toward the all-ones direction.
    let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
    buckets[bucket_idx] += sign;
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_identical_vector() {
        let a = embed_sync("I work as a veterinarian in Denver");
        let b = embed_sync("I work as a veterinarian in Denver");
        assert_eq!(a, b);
        assert!(cosine_distance(&a, &b) < 1e-6);
    }

    #[test]
    fn similar_text_is_closer_than_unrelated_text() {
        let base = embed_sync("I work as a veterinarian in Denver");
        let similar = embed_sync("I am a veterinarian working in Denver");
        let unrelated = embed_sync("The stock market closed up two percent today");

        let d_similar = cosine_distance(&base, &similar);
        let d_unrelated = cosine_distance(&base, &unrelated);
        assert!(d_similar < d_unrelated);
    }

    #[test]
    fn byte_round_trip_preserves_vector() {
        let v = embed_sync("round trip me");
        let bytes = vector_to_bytes(&v);
        let back = bytes_to_vector(&bytes);
        assert_eq!(v, back);
    }
}
