//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: used when embeddings are not configured;
//!   records are stored without vectors.
//! - **[`OpenAIProvider`]**: calls an OpenAI-compatible `/embeddings`
//!   endpoint with batching, retry and backoff.
//!
//! Also provides [`vec_to_blob`] / [`blob_to_vec`] for storing vectors as
//! little-endian `f32` BLOBs in SQLite.
//!
//! # Retry Strategy
//!
//! The OpenAI provider retries through [`retry_with_backoff`] on its own
//! [`RetryPolicy`] (`embedding.max_retries`, `embedding.retry_base_delay_ms`,
//! capped at 32s), separate from the source's `[retry]` section:
//! - HTTP 429 (rate limited), 5xx and network errors → retry
//! - any other non-success status → fail immediately

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::SyncError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Text-in, vector-out embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    /// Zero means the provider produces no vectors.
    fn dims(&self) -> usize;

    /// Whether [`embed`](EmbeddingProvider::embed) produces vectors at all.
    fn is_enabled(&self) -> bool {
        self.dims() > 0
    }

    /// Embed a batch of texts. Returns one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider.
///
/// Used when `embedding.provider = "disabled"`. Any attempt to embed text
/// fails; the persister checks [`EmbeddingProvider::is_enabled`] first and
/// stores records without vectors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (or any compatible endpoint).
///
/// Calls `POST {base_url}/embeddings` with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit API key.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy {
                max_attempts: config.max_retries.saturating_add(1),
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
                max_delay: Duration::from_secs(32),
            },
            client,
        })
    }

    /// One request. Retryable failures come back as `TransientFetch`.
    async fn embed_once(
        &self,
        url: &str,
        body: &serde_json::Value,
        expected: usize,
    ) -> crate::error::Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::TransientFetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("Embedding API error {}: {}", status, body_text);
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                SyncError::TransientFetch {
                    url: url.to_string(),
                    message,
                }
            } else {
                SyncError::Embedding(message)
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Embedding(format!("bad embedding response: {}", e)))?;
        debug!(count = parsed.data.len(), "embedding batch ok");
        order_by_index(parsed, expected).map_err(|e| SyncError::Embedding(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let vectors = retry_with_backoff(&self.retry, || {
            self.embed_once(&url, &body, texts.len())
        })
        .await?;
        Ok(vectors)
    }
}

/// Put response vectors back in input order and check the count.
fn order_by_index(resp: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if resp.data.len() != expected {
        bail!(
            "Embedding API returned {} vectors for {} inputs",
            resp.data.len(),
            expected
        );
    }
    let mut data = resp.data;
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use content_sync::embedding::{vec_to_blob, blob_to_vec};
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
