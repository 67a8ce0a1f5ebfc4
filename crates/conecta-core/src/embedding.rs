//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, a deterministic [`HashEmbedder`] that needs no model, plus
//! pure helpers for vector serialization and similarity.
//!
//! Networked and model-backed providers (OpenAI, Ollama, fastembed) live in
//! the `conecta` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// Trait for embedding providers.
///
/// The same provider (and therefore the same dimensionality) must be used
/// for indexing and for queries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"paraphrase-multilingual-minilm-l12-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts. The output has one vector per input, in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(RagError::embedding(format!(
                "expected 1 vector, got {}",
                vectors.len()
            )));
        }
        let vector = vectors.remove(0);
        check_dims(&vector, self.dims())?;
        Ok(vector)
    }
}

/// Verify a batch returned by a provider: one vector per input, each of
/// length `dims`.
pub fn check_batch(vectors: &[Vec<f32>], expected_count: usize, dims: usize) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(RagError::embedding(format!(
            "expected {} vectors, got {}",
            expected_count,
            vectors.len()
        )));
    }
    for vector in vectors {
        check_dims(vector, dims)?;
    }
    Ok(())
}

fn check_dims(vector: &[f32], dims: usize) -> Result<()> {
    if vector.len() != dims {
        return Err(RagError::embedding(format!(
            "provider returned a {}-dimensional vector, expected {}",
            vector.len(),
            dims
        )));
    }
    Ok(())
}

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into a signed
/// bucket; the resulting vector is L2-normalised. Texts sharing tokens get
/// a positive cosine similarity.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(RagError::input("embedding dims must be > 0"));
        }
        Ok(Self {
            dims,
            model: format!("hash-{}", dims),
        })
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use conecta_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed_one("Loja X vende eletrônicos");
        let b = embedder.embed_one("Loja X vende eletrônicos");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_case_insensitive_tokens() {
        let embedder = HashEmbedder::new(64).unwrap();
        assert_eq!(embedder.embed_one("LOJA x"), embedder.embed_one("loja, X!"));
    }

    #[test]
    fn test_hash_embedder_shared_tokens_are_similar() {
        let embedder = HashEmbedder::new(256).unwrap();
        let doc = embedder.embed_one("Loja X vende eletrônicos");
        let query = embedder.embed_one("O que é a Loja X?");
        assert!(cosine_similarity(&doc, &query) > 0.0);
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8).unwrap();
        assert!(embedder.embed_one("  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hash_embedder_rejects_zero_dims() {
        assert!(HashEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn test_embed_query_matches_batch() {
        let embedder = HashEmbedder::new(32).unwrap();
        let q = embedder.embed_query("frete grátis").await.unwrap();
        let batch = embedder
            .embed_texts(&["frete grátis".to_string()])
            .await
            .unwrap();
        assert_eq!(q, batch[0]);
    }

    #[test]
    fn test_check_batch() {
        let good = vec![vec![0.0; 4], vec![1.0; 4]];
        assert!(check_batch(&good, 2, 4).is_ok());
        assert!(check_batch(&good, 3, 4).is_err());
        let bad = vec![vec![0.0; 4], vec![1.0; 3]];
        let err = check_batch(&bad, 2, 4).unwrap_err();
        assert_eq!(err.code(), "embedding_failure");
    }
}
