//! Embedding service abstraction and the OpenAI-compatible provider.
//!
//! [`Embedder`] maps batches of text to fixed-dimension vectors, one per
//! input and in input order. The concrete provider calls an
//! OpenAI-compatible `/embeddings` endpoint with request batching and a
//! bounded [`RetryPolicy`]:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Also provides the vector utilities shared by the index and the store:
//! [`cosine_similarity`], [`vec_to_blob`], and [`blob_to_vec`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::RagError;

/// Maps text to fixed-dimension vectors. `embed` is one-to-one and
/// order-preserving with its input; every returned vector has `dims()`
/// elements, fixed at construction.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
    fn dims(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Bounded exponential-backoff retry for external calls.
///
/// Retries only [`RagError::Transient`] failures; anything else propagates
/// on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy allowing `max_retries` retries after the initial attempt.
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries + 1,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Backoff before retry `attempt` (1-based): base × 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(1)).min(5))
    }

    pub async fn run<T, Fut, F>(&self, mut op: F) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.delay_for(attempt)).await;
            }
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "transient failure, will retry"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| RagError::Transient("retries exhausted".to_string())))
    }
}

/// Embedding provider for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    /// Build from configuration. Requires `embedding.model`,
    /// `embedding.dims`, and the `OPENAI_API_KEY` environment variable.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for openai provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::with_retries(config.max_retries),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let msg = format!("embeddings API error {}: {}", status, body_text);
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(RagError::Transient(msg));
            }
            return Err(RagError::Fatal(msg));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::Fatal(format!("invalid embeddings response: {}", e)))?;
        parse_embeddings_response(&json, texts.len(), self.dims)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.retry.run(|| self.embed_batch(batch)).await?;
            out.extend(vectors);
        }
        Ok(out)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract `data[].embedding` arrays in index order, verifying count and
/// dimension against the configured model.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected_count: usize,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, RagError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Fatal("embeddings response missing data array".to_string()))?;

    if data.len() != expected_count {
        return Err(RagError::Fatal(format!(
            "embeddings response has {} entries, expected {}",
            data.len(),
            expected_count
        )));
    }

    let mut items: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RagError::Fatal("embeddings response missing embedding".to_string()))?;
        let mut vec: Vec<f32> = Vec::with_capacity(embedding.len());
        for v in embedding {
            let value = v.as_f64().ok_or_else(|| {
                RagError::Fatal("embeddings response contains a non-numeric value".to_string())
            })?;
            vec.push(value as f32);
        }
        if vec.len() != expected_dims {
            // Dimension disagreement means the configured model changed
            // out from under a populated index; surface it loudly.
            return Err(RagError::Fatal(format!(
                "embedding dimension {} does not match configured dims {}",
                vec.len(),
                expected_dims
            )));
        }
        items.push((index, vec));
    }

    items.sort_by_key(|(i, _)| *i);
    Ok(items.into_iter().map(|(_, v)| v).collect())
}

/// Placeholder used when `embedding.provider = "disabled"`; every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::Fatal(
            "embedding provider is disabled; set [embedding] provider in config".to_string(),
        ))
    }

    fn dims(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Instantiate the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Fails when the byte length is
/// not a multiple of four, which indicates a corrupted row.
pub fn blob_to_vec(blob: &[u8]) -> Result<Vec<f32>, RagError> {
    if blob.len() % 4 != 0 {
        return Err(RagError::IndexCorruption(format!(
            "vector blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity in [-1, 1]; 0.0 for empty or mismatched lengths.
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
