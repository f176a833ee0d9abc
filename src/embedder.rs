// src/embedder.rs
// Text embedding: hosted Azure OpenAI deployment, plus a deterministic
// hash-based embedder for offline use.

use crate::config::AzureConfig;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use thiserror::Error;
use tracing::{debug, info};

pub type EmbeddingVector = Vec<f32>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Embedding API error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode embedding response: {0}")]
    Decode(String),
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds passages, preserving input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError>;
    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}

/// Azure OpenAI embeddings deployment ("ada" by default).
pub struct AzureEmbedder {
    url: String,
    api_key: String,
    deployment: String,
    batch_size: usize,
    client: reqwest::Client,
    query_cache: Mutex<LruCache<String, EmbeddingVector>>,
}

impl AzureEmbedder {
    pub fn new(config: &AzureConfig, batch_size: usize) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            config.endpoint, config.embedding_deployment, config.api_version
        );
        info!(deployment = %config.embedding_deployment, batch_size, "Initializing AzureEmbedder");
        Self {
            url,
            api_key: config.api_key.clone(),
            deployment: config.embedding_deployment.clone(),
            batch_size: batch_size.max(1),
            client: reqwest::Client::new(),
            query_cache: Mutex::new(LruCache::new(NonZeroUsize::new(512).unwrap_or(NonZeroUsize::MIN))),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, batch: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&EmbeddingsRequest { input: batch })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EmbeddingError::Status { status: status.as_u16(), body });
        }
        decode_embeddings(&body, batch.len())
    }
}

/// Parses an embeddings response, ordering rows by their `index`.
pub fn decode_embeddings(body: &str, expected: usize) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
    let mut parsed: EmbeddingsResponse =
        serde_json::from_str(body).map_err(|e| EmbeddingError::Decode(e.to_string()))?;
    if parsed.data.len() != expected {
        return Err(EmbeddingError::CountMismatch { expected, actual: parsed.data.len() });
    }
    parsed.data.sort_by_key(|row| row.index);
    Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
}

#[async_trait::async_trait]
impl Embedder for AzureEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        info!(total_texts = texts.len(), batch_size = self.batch_size, "Starting batch embedding");
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            results.extend(self.request(batch).await?);
        }
        info!(total_embeddings = results.len(), "Batch embedding completed");
        Ok(results)
    }

    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        if let Some(hit) = self.query_cache.lock().get(text) {
            debug!(text_len = text.len(), "Cache hit for query embedding");
            return Ok(hit.clone());
        }
        let embedding = self
            .request(&[text.to_string()])
            .await?
            .pop()
            .ok_or(EmbeddingError::CountMismatch { expected: 1, actual: 0 })?;
        self.query_cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.deployment
    }
}

/// Deterministic bag-of-features embedder: whitespace tokens and character
/// bigrams hashed with seahash into a fixed number of signed buckets.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    pub fn embed(&self, text: &str) -> EmbeddingVector {
        let mut vec = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered.split_whitespace() {
            self.add_feature(&mut vec, token.as_bytes());
            let chars: Vec<char> = token.chars().collect();
            for pair in chars.windows(2) {
                let bigram: String = pair.iter().collect();
                self.add_feature(&mut vec, bigram.as_bytes());
            }
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vec.iter_mut().for_each(|x| *x /= norm);
        }
        vec
    }

    fn add_feature(&self, vec: &mut [f32], feature: &[u8]) {
        let hash = seahash::hash(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait::async_trait]
impl Embedder for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        Ok(self.embed(text))
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("누리호 3차 발사");
        let b = embedder.embed("누리호 3차 발사");
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hash_embedding_similarity_tracks_overlap() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("3차 발사 성공");
        let close = embedder.embed("누리호 3차 발사는 성공적이었다");
        let far = embedder.embed("위성 교신 결과 보고");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let v = HashEmbedder::new(8).embed("   ");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine_similarity(&v, &v), 0.0);
    }

    #[test]
    fn test_decode_embeddings_orders_by_index() {
        let body = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}],"model":"ada"}"#;
        let rows = decode_embeddings(body, 2).unwrap();
        assert_eq!(rows, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(matches!(
            decode_embeddings(body, 3),
            Err(EmbeddingError::CountMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(decode_embeddings("nope", 1), Err(EmbeddingError::Decode(_))));
    }

    #[test]
    fn test_azure_url() {
        let config = AzureConfig {
            endpoint: "https://res.openai.azure.com".into(),
            api_key: "k".into(),
            chat_deployment: "gpt-4o-mini".into(),
            embedding_deployment: "ada".into(),
            api_version: "2024-05-01-preview".into(),
            temperature: 0.3,
            max_tokens: 1000,
        };
        let embedder = AzureEmbedder::new(&config, 16);
        assert_eq!(
            embedder.url(),
            "https://res.openai.azure.com/openai/deployments/ada/embeddings?api-version=2024-05-01-preview"
        );
        assert_eq!(embedder.model_name(), "ada");
    }
}
