//! # SwarmOracle Embedding Port
//!
//! Outbound port for turning answer text into fixed-dimension real vectors.
//! The consensus engine batches all answers of a question into one `embed`
//! call; both provider failure and timeout are treated by the caller as "use
//! the lexical fallback", never as a hard error.
//!
//! Two providers ship here: an HTTP provider for a real embedding service
//! and a deterministic hashing provider for development and tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding response malformed: {0}")]
    Malformed(String),

    #[error("expected {expected} vectors, provider returned {got}")]
    CountMismatch { expected: usize, got: usize },
}

/// Port for batched text embedding.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed all texts in one batch, preserving order. The returned vectors
    /// share a fixed dimension.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize;
}

/// Configuration for the embedding subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    /// Endpoint of the HTTP embedding service.
    pub endpoint: String,
    /// Model identifier forwarded to the service.
    pub model: String,
    /// Vector dimension the provider is expected to return.
    pub dimension: usize,
    /// Per-request timeout for the HTTP client.
    pub request_timeout: Duration,
}

/// Which embedding provider to wire at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Remote embedding service over HTTP.
    Http,
    /// Deterministic token-hashing vectors; no network required.
    Hashing,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hashing,
            endpoint: "http://127.0.0.1:8091/v1/embeddings".to_string(),
            model: "swarm-embed-small".to_string(),
            dimension: 256,
            request_timeout: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP provider posting one batched request per question.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Request(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        if body.embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: body.embeddings.len(),
            });
        }

        debug!(batch = texts.len(), "embedded answer batch");
        Ok(body.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic provider hashing lowercased tokens into a fixed number of
/// buckets, L2-normalized. Texts sharing vocabulary land near each other,
/// which is enough for development and for exercising the semantic path in
/// tests without a network dependency.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_provider_is_deterministic() {
        let provider = HashingEmbeddingProvider::new(64);
        let texts = vec!["the swallow flies south".to_string()];
        let a = provider.embed(&texts).await.unwrap();
        let b = provider.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn identical_texts_get_identical_vectors() {
        let provider = HashingEmbeddingProvider::new(64);
        let texts = vec![
            "rust borrow checker".to_string(),
            "rust borrow checker".to_string(),
            "unrelated topic entirely".to_string(),
        ];
        let vectors = provider.embed(&texts).await.unwrap();
        assert_eq!(vectors[0], vectors[1]);
        assert_ne!(vectors[0], vectors[2]);
    }

    #[tokio::test]
    async fn vectors_are_unit_norm() {
        let provider = HashingEmbeddingProvider::new(32);
        let vectors = provider
            .embed(&["one two three four".to_string()])
            .await
            .unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
