//! Embeds each distinct text once per request and scores pairwise cosine
//! similarity. The per-request embedding cache keyed by `(text, modelId)`
//! follows the same keyed-lookup caching shape used elsewhere for caching
//! whole gateway responses, generalized here to caching embedding vectors.

use std::collections::HashMap;

use crate::collaborators::Embedder;
use crate::models::SimilarityResult;

/// Caches embeddings for the lifetime of a single request. Not shared across
/// requests, since embedding models can be swapped between requests.
#[derive(Default)]
pub struct EmbeddingCache {
    entries: HashMap<(String, String), Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_embed(&mut self, embedder: &dyn Embedder, text: &str) -> Vec<f32> {
        let key = (text.to_string(), embedder.model_id().to_string());
        if let Some(embedding) = self.entries.get(&key) {
            return embedding.clone();
        }
        let embedding = embedder.embed(text).await;
        self.entries.insert(key, embedding.clone());
        embedding
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Computes the full pairwise similarity matrix for `texts`, using `cache` to
/// avoid re-embedding a text already seen earlier in the request. The
/// diagonal is forced to `1.0` and `averageSimilarity` is the mean of the
/// strictly-upper-triangular entries.
pub async fn similarity(
    texts: &[String],
    embedder: &dyn Embedder,
    cache: &mut EmbeddingCache,
    agreement_threshold: f64,
) -> SimilarityResult {
    let n = texts.len();
    let mut embeddings = Vec::with_capacity(n);
    for text in texts {
        embeddings.push(cache.get_or_embed(embedder, text).await);
    }

    let mut matrix = vec![vec![1.0f64; n]; n];
    let mut upper_triangular = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    let mut below_threshold_pairs = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            let score = cosine_similarity(&embeddings[i], &embeddings[j]);
            matrix[i][j] = score;
            matrix[j][i] = score;
            upper_triangular.push(score);
            if score < agreement_threshold {
                below_threshold_pairs.push((i, j));
            }
        }
    }

    let average_similarity = if upper_triangular.is_empty() {
        1.0
    } else {
        upper_triangular.iter().sum::<f64>() / upper_triangular.len() as f64
    };
    let min_similarity = upper_triangular.iter().copied().fold(f64::INFINITY, f64::min);
    let max_similarity = upper_triangular.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    SimilarityResult {
        matrix,
        average_similarity,
        min_similarity: if min_similarity.is_finite() { min_similarity } else { 1.0 },
        max_similarity: if max_similarity.is_finite() { max_similarity } else { 1.0 },
        below_threshold_pairs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    struct FixedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl Embedder for FixedEmbedder {
        fn embed<'a>(&'a self, text: &'a str) -> Pin<Box<dyn Future<Output = Vec<f32>> + Send + 'a>> {
            let vector = self.vectors.get(text).cloned().unwrap_or_default();
            Box::pin(async move { vector })
        }

        fn model_id(&self) -> &str {
            "fixed-test-embedder"
        }
    }

    #[tokio::test]
    async fn matrix_is_symmetric_with_diagonal_one() {
        let embedder = FixedEmbedder {
            vectors: HashMap::from([
                ("a".to_string(), vec![1.0, 0.0]),
                ("b".to_string(), vec![0.0, 1.0]),
                ("c".to_string(), vec![1.0, 0.0]),
            ]),
        };
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut cache = EmbeddingCache::new();
        let result = similarity(&texts, &embedder, &mut cache, 0.5).await;

        for i in 0..3 {
            assert_eq!(result.matrix[i][i], 1.0);
        }
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(result.matrix[i][j], result.matrix[j][i]);
            }
        }
        assert!((result.matrix[0][2] - 1.0).abs() < 1e-9);
        assert!((result.matrix[0][1] - 0.0).abs() < 1e-9);
        assert!(result.below_threshold_pairs.contains(&(0, 1)));
        assert!(result.below_threshold_pairs.contains(&(1, 2)));
        assert!(!result.below_threshold_pairs.contains(&(0, 2)));
    }

    #[tokio::test]
    async fn single_text_has_no_pairs_and_average_one() {
        let embedder = FixedEmbedder {
            vectors: HashMap::from([("solo".to_string(), vec![1.0, 1.0])]),
        };
        let texts = vec!["solo".to_string()];
        let mut cache = EmbeddingCache::new();
        let result = similarity(&texts, &embedder, &mut cache, 0.9).await;

        assert_eq!(result.average_similarity, 1.0);
        assert!(result.below_threshold_pairs.is_empty());
    }

    #[tokio::test]
    async fn repeated_text_only_embeds_once() {
        struct CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize,
        }
        impl Embedder for CountingEmbedder {
            fn embed<'a>(&'a self, _text: &'a str) -> Pin<Box<dyn Future<Output = Vec<f32>> + Send + 'a>> {
                self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Box::pin(async move { vec![1.0, 0.0] })
            }
            fn model_id(&self) -> &str {
                "counting-embedder"
            }
        }

        let embedder = CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let texts = vec!["same".to_string(), "same".to_string(), "same".to_string()];
        let mut cache = EmbeddingCache::new();
        let _ = similarity(&texts, &embedder, &mut cache, 0.5).await;

        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
