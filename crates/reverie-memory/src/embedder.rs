//! Embedder collaborator.
//!
//! Turns text into a fixed-length vector.  Reverie only ever compares
//! embeddings produced by the same embedder, so any model works as long as its
//! dimension stays constant for the lifetime of an index.
//!
//! - [`Embedder`] – the trait every embedder must implement.
//! - [`HashEmbedder`] – deterministic, always-available token-hashing fallback
//!   with no semantic meaning beyond shared vocabulary.
//! - [`OllamaEmbedder`] – calls the `/api/embeddings` endpoint of a local
//!   [Ollama](https://ollama.com) server.

use async_trait::async_trait;
use reverie_types::ReverieError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default dimension for [`HashEmbedder`].
pub const DEFAULT_HASH_DIMENSION: usize = 384;

/// Errors that can arise from embedding computation.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// The HTTP request to the embedding server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The embedding server answered with something unusable.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<EmbedError> for ReverieError {
    fn from(e: EmbedError) -> Self {
        ReverieError::Embedder(e.to_string())
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`.  Must return vectors of one fixed dimension.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HashEmbedder
// ─────────────────────────────────────────────────────────────────────────────

/// Feature-hashing embedder.
///
/// Each lower-cased alphanumeric token is hashed (FNV-1a) into one of
/// `dimension` buckets with a hash-derived sign; the resulting vector is
/// L2-normalised.  Identical text always yields an identical vector, and texts
/// sharing vocabulary land close together.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// `dimension` is raised to at least 1.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Synchronous embedding; the async trait method delegates here.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_text(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

// ─────────────────────────────────────────────────────────────────────────────
// OllamaEmbedder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// An async client for Ollama's `/api/embeddings` endpoint.
///
/// Construct once and reuse; the underlying HTTP client pools connections.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    /// Create a new embedder pointing at `base_url` (e.g.
    /// `"http://localhost:11434"`) and using `model` (e.g.
    /// `"nomic-embed-text"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };
        let response: EmbeddingResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if response.embedding.is_empty() {
            return Err(EmbedError::BadResponse("empty embedding".into()));
        }
        Ok(response.embedding)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_types::cosine_similarity;

    #[test]
    fn identical_text_is_identical_vector() {
        let e = HashEmbedder::default();
        let a = e.embed_text("Python is great");
        let b = e.embed_text("Python is great");
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let e = HashEmbedder::default();
        let a = e.embed_text("Python is great!");
        let b = e.embed_text("python IS great");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let e = HashEmbedder::default();
        let q = e.embed_text("rust borrow checker");
        let near = e.embed_text("the rust borrow checker rejects this");
        let far = e.embed_text("banana bread recipe");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn dimension_is_fixed_and_unit_norm() {
        let e = HashEmbedder::new(64);
        let v = e.embed_text("a few words here");
        assert_eq!(v.len(), 64);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashEmbedder::new(8).embed_text("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn zero_dimension_is_raised() {
        assert_eq!(HashEmbedder::new(0).dimension(), 1);
    }

    #[tokio::test]
    async fn trait_object_embeds() {
        let e: Box<dyn Embedder> = Box::new(HashEmbedder::new(16));
        assert_eq!(e.embed("hello").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn unreachable_ollama_is_http_error() {
        let e = OllamaEmbedder::new("http://127.0.0.1:9", "nomic-embed-text");
        let err = e.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::Http(_)));
    }
}
