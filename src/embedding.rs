//! Embedding collaborator contract and similarity math
//!
//! Semantic scoring is optional: the retriever holds an optional provider
//! and functions correctly with none configured. A deterministic
//! feature-hashing provider is included for tests and demos where no API
//! is available.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::Result;

/// Trait for embedding providers
///
/// Vectors are used both to embed queries at retrieval time and to embed
/// memories at save time. Provider failures disable the semantic scoring
/// factor; they never surface to the caller.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate a fixed-dimension vector for a text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;
}

/// Cosine similarity between two vectors
///
/// Length mismatch, empty input and zero vectors all yield 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Deterministic feature-hashing embedder
///
/// Term-frequency weighting with signed hashing plus bigrams, L2
/// normalized. No external dependencies, identical output for identical
/// input.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    fn hash_token(token: &str, dimensions: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % dimensions
    }

    /// Sign for feature hashing (reduces collision impact)
    fn hash_sign(token: &str) -> f32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        format!("{}_sign", token).hash(&mut hasher);
        if hasher.finish() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut embedding = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(embedding);
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let doc_len = tokens.len() as f32;
        for (token, count) in tf {
            let tf_score = (1.0 + count / doc_len).ln();
            // Longer tokens are treated as rarer
            let idf_score = 1.0 + (token.len() as f32 * 0.1);

            let idx = Self::hash_token(token, self.dimensions);
            embedding[idx] += tf_score * idf_score * Self::hash_sign(token);
        }

        for window in tokens.windows(2) {
            let bigram = format!("{}_{}", window[0], window[1]);
            let idx = Self::hash_token(&bigram, self.dimensions);
            embedding[idx] += 0.5 * Self::hash_sign(&bigram);
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);

        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);

        let c = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 0.001);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn hashing_embedder_deterministic() {
        let embedder = HashingEmbedder::new(128);
        let e1 = embedder.embed("i prefer kannada").unwrap();
        let e2 = embedder.embed("i prefer kannada").unwrap();
        assert_eq!(e1, e2);
        assert_eq!(e1.len(), 128);
    }

    #[test]
    fn hashing_embedder_similar_texts_score_higher() {
        let embedder = HashingEmbedder::new(384);
        let e1 = embedder.embed("call me after eleven in the morning").unwrap();
        let e2 = embedder.embed("please call after eleven each morning").unwrap();
        let e3 = embedder.embed("quantum physics and thermodynamics").unwrap();

        assert!(cosine_similarity(&e1, &e2) > cosine_similarity(&e1, &e3));
    }

    #[test]
    fn hashing_embedder_empty_text() {
        let embedder = HashingEmbedder::new(64);
        let e = embedder.embed("").unwrap();
        assert!(e.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn hashing_embedder_normalized() {
        let embedder = HashingEmbedder::new(384);
        let e = embedder.embed("my name is rajesh and i work at tcs").unwrap();
        let norm: f32 = e.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }
}
