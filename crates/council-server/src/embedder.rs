//! Deterministic hashing `Embedder` — a bag-of-character-shingles hashing
//! embedding, a placeholder an operator is expected to replace with a real
//! model. Generalizes the same `Sha256`-for-deterministic-fingerprinting
//! approach used elsewhere for hashing a serialized payload into a lookup
//! key, from "one hash, used as a string key" to "many hashes, used as
//! float coordinates" so cosine similarity has something non-trivial to
//! compare without pulling in an ML dependency.

use council_core::collaborators::{EmbeddingFuture, Embedder};
use sha2::{Digest, Sha256};

const SHINGLE_LEN: usize = 3;
const DIMENSIONS: usize = 256;

/// Hashes every character trigram in the (lowercased) text into a bucket of
/// a fixed-size vector, then L2-normalizes it. Two texts sharing more
/// trigrams land closer together under cosine similarity — a crude but
/// genuinely content-sensitive stand-in for a real embedding model.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbeddingFuture<'a> {
        Box::pin(async move { hash_embed(text) })
    }

    fn model_id(&self) -> &str {
        "hashing-shingle-v1"
    }
}

fn hash_embed(text: &str) -> Vec<f32> {
    let normalized: Vec<char> = text.to_ascii_lowercase().chars().collect();
    let mut buckets = vec![0f32; DIMENSIONS];

    if normalized.len() < SHINGLE_LEN {
        bump_bucket(&mut buckets, &normalized.iter().collect::<String>());
    } else {
        for window in normalized.windows(SHINGLE_LEN) {
            let shingle: String = window.iter().collect();
            bump_bucket(&mut buckets, &shingle);
        }
    }

    let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for bucket in &mut buckets {
            *bucket /= norm;
        }
    }
    buckets
}

fn bump_bucket(buckets: &mut [f32], shingle: &str) {
    let digest = Sha256::digest(shingle.as_bytes());
    let index = (u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize) % DIMENSIONS;
    buckets[index] += 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_yields_identical_embedding() {
        assert_eq!(hash_embed("the quick brown fox"), hash_embed("the quick brown fox"));
    }

    #[test]
    fn embedding_is_unit_length_when_nonempty() {
        let embedding = hash_embed("some reasonably long piece of text");
        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn disjoint_texts_are_less_similar_than_identical_ones() {
        let a = hash_embed("cats are wonderful pets");
        let b = hash_embed("cats are wonderful pets");
        let c = hash_embed("quantum electrodynamics describes photon interactions");

        let dot_ab: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let dot_ac: f32 = a.iter().zip(&c).map(|(x, y)| x * y).sum();
        assert!(dot_ab > dot_ac);
    }
}
