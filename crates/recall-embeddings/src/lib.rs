//! Embedding service with multi-provider fallback.
//!
//! Supports Gemini, OpenAI, and Ollama embedding APIs. Providers are tried
//! once each in priority order; the first success wins. When no provider is
//! configured the service produces lexical placeholder vectors so the memory
//! core still works (token overlap only, not semantic).
//!
//! # Example
//!
//! ```no_run
//! use recall_embeddings::{EmbeddingConfig, EmbeddingProviderConfig, EmbeddingService};
//!
//! # async fn example() -> Result<(), recall_embeddings::Error> {
//! let config = EmbeddingConfig {
//!     providers: vec![EmbeddingProviderConfig {
//!         name: "openai".to_string(),
//!         base_url: "https://api.openai.com/v1".to_string(),
//!         model: "text-embedding-3-small".to_string(),
//!         api_key: "your-api-key".to_string(),
//!         priority: 1,
//!     }],
//!     dimension: 1536,
//! };
//!
//! let service = EmbeddingService::from_config(&config)?;
//! let embedding = service.embed_single("My name is John").await?;
//! # Ok(())
//! # }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

/// Maximum texts per batch for API calls
const MAX_BATCH_SIZE: usize = 100;

/// HTTP timeout for a single provider call
const REQUEST_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur in the embedding service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Internal error (HTTP client, parsing, etc.)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Provider API error
    #[error("Provider error: {0}")]
    Provider(String),

    /// No credentials configured
    #[error("No credentials configured")]
    NoCredentials,

    /// All providers failed
    #[error("All embedding providers failed")]
    AllProvidersFailed,

    /// Provider answered with vectors of the wrong size
    #[error("{provider} returned {got}-dimensional embedding, expected {expected}")]
    DimensionMismatch {
        provider: String,
        expected: usize,
        got: usize,
    },
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Configuration types
// ============================================================================

/// Configuration for the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// List of embedding providers in priority order.
    pub providers: Vec<EmbeddingProviderConfig>,
    /// Expected embedding dimension.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            dimension: 1536,
        }
    }
}

/// Configuration for a single embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    /// Provider name (e.g., "gemini", "openai", "ollama").
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// API key for authentication (empty for Ollama).
    pub api_key: String,
    /// Priority (lower = higher priority).
    pub priority: u8,
}

impl EmbeddingProviderConfig {
    /// Ollama runs locally without a key; the hosted APIs need one.
    fn has_credentials(&self) -> bool {
        self.name == "ollama" || !self.api_key.is_empty()
    }
}

// ============================================================================
// Default values
// ============================================================================

/// Get default endpoint for a provider.
pub fn default_endpoint(name: &str) -> String {
    match name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "openai" => "https://api.openai.com/v1".to_string(),
        "ollama" => "http://localhost:11434".to_string(),
        _ => "https://api.openai.com/v1".to_string(),
    }
}

/// Get default model for a provider.
pub fn default_model(name: &str) -> String {
    match name {
        "gemini" => "text-embedding-004".to_string(),
        "openai" => "text-embedding-3-small".to_string(),
        "ollama" => "nomic-embed-text".to_string(),
        _ => "text-embedding-3-small".to_string(),
    }
}

/// Get default dimension for a model.
pub fn default_dimension(model: &str) -> usize {
    if model.contains("text-embedding-004") || model.contains("embedding-001") {
        768
    } else if model.contains("text-embedding-3-small") || model.contains("text-embedding-ada-002")
    {
        1536
    } else if model.contains("text-embedding-3-large") {
        3072
    } else if model.contains("nomic-embed-text") || model.contains("all-mpnet") {
        768
    } else if model.contains("all-minilm") || model.contains("MiniLM-L6") {
        384
    } else if model.contains("bge-large") || model.contains("mxbai-embed-large") {
        1024
    } else {
        1536
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: Option<GeminiEmbedding>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    embeddings: Option<Vec<GeminiEmbedding>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedResponse {
    data: Option<Vec<OpenAIEmbedding>>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Option<Vec<f32>>,
    error: Option<String>,
}

// ============================================================================
// Embedder seam
// ============================================================================

/// Anything that turns text into a fixed-length vector.
///
/// The memory core depends on this trait rather than on [`EmbeddingService`]
/// so tests and alternative backends can be injected.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a single piece of text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_text(text).await?);
        }
        Ok(out)
    }
}

// ============================================================================
// Embedding service
// ============================================================================

/// Service for generating text embeddings with multi-provider fallback.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

struct EmbeddingServiceInner {
    providers: Vec<EmbeddingProviderConfig>,
    dimension: usize,
    client: Client,
}

impl EmbeddingService {
    /// Create a new embedding service from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let mut providers = config.providers.clone();
        providers.sort_by_key(|p| p.priority);

        if providers.is_empty() {
            warn!(
                dimension = config.dimension,
                "No embedding providers configured - using lexical placeholders"
            );
        } else {
            info!(
                providers = ?providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
                dimension = config.dimension,
                "Embedding service initialized"
            );
        }

        Ok(Self {
            inner: Arc::new(EmbeddingServiceInner {
                providers,
                dimension: config.dimension.max(1),
                client,
            }),
        })
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.inner.dimension
    }

    /// Get provider names in priority order.
    pub fn providers(&self) -> Vec<String> {
        self.inner.providers.iter().map(|p| p.name.clone()).collect()
    }

    /// Check if real embedding providers are available.
    pub fn has_providers(&self) -> bool {
        !self.inner.providers.is_empty()
    }

    /// Generate embeddings for multiple texts.
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if self.inner.providers.is_empty() {
            debug!(count = texts.len(), "Generating placeholder embeddings");
            return Ok(texts
                .iter()
                .map(|t| placeholder_embed(t, self.inner.dimension))
                .collect());
        }

        let mut last_error = None;

        for provider in &self.inner.providers {
            if !provider.has_credentials() {
                debug!(provider = %provider.name, "Skipping provider without credentials");
                continue;
            }

            let result = self
                .call_provider_batch(provider, &texts)
                .await
                .and_then(|embeddings| {
                    if embeddings.len() != texts.len() {
                        return Err(Error::Provider(format!(
                            "{} returned {} embeddings for {} texts",
                            provider.name,
                            embeddings.len(),
                            texts.len()
                        )));
                    }
                    for embedding in &embeddings {
                        self.check_dimension(provider, embedding)?;
                    }
                    Ok(embeddings)
                });

            match result {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Embedding provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::AllProvidersFailed))
    }

    /// Generate embedding for a single text.
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        if self.inner.providers.is_empty() {
            return Ok(placeholder_embed(text, self.inner.dimension));
        }

        let mut last_error = None;

        for provider in &self.inner.providers {
            if !provider.has_credentials() {
                continue;
            }

            let result = self
                .call_provider_single(provider, text)
                .await
                .and_then(|embedding| {
                    self.check_dimension(provider, &embedding)?;
                    Ok(embedding)
                });

            match result {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Embedding provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::AllProvidersFailed))
    }

    /// Generate embeddings in batches for large inputs.
    pub async fn embed_batch(&self, texts: Vec<String>, batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let embeddings = self.embed(chunk.to_vec()).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    /// Vectors of another size cannot be compared with stored ones, so a
    /// provider answering at the wrong dimension counts as failed.
    fn check_dimension(&self, provider: &EmbeddingProviderConfig, embedding: &[f32]) -> Result<()> {
        if embedding.len() == self.inner.dimension {
            return Ok(());
        }
        Err(Error::DimensionMismatch {
            provider: provider.name.clone(),
            expected: self.inner.dimension,
            got: embedding.len(),
        })
    }

    async fn call_provider_batch(
        &self,
        provider: &EmbeddingProviderConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        match provider.name.as_str() {
            "gemini" => self.call_gemini_batch(provider, texts).await,
            "openai" => self.call_openai_batch(provider, texts).await,
            "ollama" => {
                // Ollama's embeddings endpoint takes one prompt per call.
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.call_ollama_single(provider, text).await?);
                }
                Ok(out)
            }
            _ => Err(Error::Internal(format!(
                "Unknown embedding provider: {}",
                provider.name
            ))),
        }
    }

    async fn call_provider_single(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        match provider.name.as_str() {
            "gemini" => self.call_gemini_single(provider, text).await,
            "openai" => self.call_openai_single(provider, text).await,
            "ollama" => self.call_ollama_single(provider, text).await,
            _ => Err(Error::Internal(format!(
                "Unknown embedding provider: {}",
                provider.name
            ))),
        }
    }

    async fn call_gemini_single(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        if provider.api_key.is_empty() {
            return Err(Error::NoCredentials);
        }

        let url = format!(
            "{}/models/{}:embedContent?key={}",
            provider.base_url, provider.model, provider.api_key
        );

        let body = json!({
            "model": format!("models/{}", provider.model),
            "content": {
                "parts": [{"text": text}]
            }
        });

        let response = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let resp: GeminiEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "Gemini error ({}): {}",
                error.code.unwrap_or(status.as_u16() as i32),
                error.message
            )));
        }

        resp.embedding
            .map(|e| e.values)
            .ok_or_else(|| Error::Internal("No embedding in Gemini response".to_string()))
    }

    async fn call_gemini_batch(
        &self,
        provider: &EmbeddingProviderConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        if provider.api_key.is_empty() {
            return Err(Error::NoCredentials);
        }

        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            provider.base_url, provider.model, provider.api_key
        );

        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", provider.model),
                    "content": {
                        "parts": [{"text": text}]
                    }
                })
            })
            .collect();

        let response = self
            .inner
            .client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Gemini batch request failed: {}", e)))?;

        let status = response.status();
        let resp: GeminiBatchResponse = response.json().await.map_err(|e| {
            Error::Internal(format!("Failed to parse Gemini batch response: {}", e))
        })?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "Gemini batch error ({}): {}",
                error.code.unwrap_or(status.as_u16() as i32),
                error.message
            )));
        }

        resp.embeddings
            .map(|embs| embs.into_iter().map(|e| e.values).collect())
            .ok_or_else(|| Error::Internal("No embeddings in Gemini batch response".to_string()))
    }

    /// Build the OpenAI request body. Only the v3 models accept `dimensions`.
    fn openai_body(&self, provider: &EmbeddingProviderConfig, input: serde_json::Value) -> serde_json::Value {
        let mut body = json!({
            "model": provider.model,
            "input": input,
        });
        if provider.model.starts_with("text-embedding-3") {
            body["dimensions"] = json!(self.inner.dimension);
        }
        body
    }

    async fn call_openai_single(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        let mut embeddings = self
            .call_openai_batch(provider, &[text.to_string()])
            .await?;
        embeddings
            .pop()
            .ok_or_else(|| Error::Internal("No embedding in OpenAI response".to_string()))
    }

    async fn call_openai_batch(
        &self,
        provider: &EmbeddingProviderConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        if provider.api_key.is_empty() {
            return Err(Error::NoCredentials);
        }

        let url = format!("{}/embeddings", provider.base_url);
        let body = self.openai_body(provider, json!(texts));

        let response = self
            .inner
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        let resp: OpenAIEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse OpenAI response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "OpenAI error ({}): {}",
                status.as_u16(),
                error.message
            )));
        }

        let mut data = resp
            .data
            .ok_or_else(|| Error::Internal("No embeddings in OpenAI response".to_string()))?;

        // Sort by index to ensure correct order
        data.sort_by_key(|e| e.index);

        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    async fn call_ollama_single(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", provider.base_url);

        let body = json!({
            "model": provider.model,
            "prompt": text
        });

        let response = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Ollama request failed: {}", e)))?;

        let resp: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!("Ollama error: {}", error)));
        }

        resp.embedding
            .ok_or_else(|| Error::Internal("No embedding in Ollama response".to_string()))
    }
}

#[async_trait]
impl TextEmbedder for EmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single(text).await
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts.to_vec(), MAX_BATCH_SIZE).await
    }
}

/// Deterministic placeholder embedding built from word tokens.
///
/// Each lowercase alphanumeric token is hashed into one of `dim` buckets and
/// the result is normalized to unit length, so cosine similarity reflects
/// token overlap. Not semantic - a fallback for development and tests.
pub fn placeholder_embed(text: &str, dim: usize) -> Vec<f32> {
    let dim = dim.max(1);
    let mut embedding = vec![0.0f32; dim];

    let lowered = text.to_lowercase();
    let mut any_token = false;
    for token in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        any_token = true;
        embedding[bucket(token, dim)] += 1.0;
    }

    // Punctuation-only input still gets a stable, non-zero vector.
    if !any_token {
        embedding[bucket(text, dim)] = 1.0;
    }

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut embedding {
            *x /= norm;
        }
    }

    embedding
}

fn bucket(token: &str, dim: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() % dim as u64) as usize
}

// ============================================================================
// Tests
// ============================================================================
