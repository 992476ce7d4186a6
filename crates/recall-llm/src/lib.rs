//! LLM service with multi-provider fallback.
//!
//! Supports Gemini, Anthropic, OpenRouter, and OpenAI. Each provider gets a
//! single attempt per request; on failure the next provider in priority order
//! is tried. Callers that must never fail (summarization) handle the final
//! error themselves.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Minimum interval before a failing service is offered again
const HEALTH_CHECK_INTERVAL_SECS: u64 = 60;

/// Number of consecutive errors before marking unavailable
const ERROR_THRESHOLD: u32 = 3;

/// Sampling temperature for every provider.
const TEMPERATURE: f32 = 0.3;

/// Default completion budget for [`TextCompleter::complete`].
pub const DEFAULT_MAX_TOKENS: u32 = 150;

/// Error types for the LLM service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("No providers configured")]
    NoProviders,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("LLM service unavailable after repeated failures")]
    Unavailable,
}

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration for an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub priority: u8,
}

impl LlmProviderConfig {
    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Configuration for the LLM service.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub providers: Vec<LlmProviderConfig>,
}

/// Get default endpoint for a provider
pub fn default_endpoint(name: &str) -> String {
    match name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "anthropic" => "https://api.anthropic.com/v1".to_string(),
        "openrouter" => "https://openrouter.ai/api/v1".to_string(),
        "openai" => "https://api.openai.com/v1".to_string(),
        _ => "https://api.openai.com/v1".to_string(),
    }
}

/// Get default model for a provider
pub fn default_model(name: &str) -> String {
    match name {
        "gemini" => "gemini-1.5-flash".to_string(),
        "anthropic" => "claude-3-5-haiku-20241022".to_string(),
        "openrouter" => "meta-llama/llama-3-8b-instruct:free".to_string(),
        "openai" => "gpt-4o-mini".to_string(),
        _ => "gpt-4o-mini".to_string(),
    }
}

/// Something that can answer a system prompt plus user content with text.
///
/// The summarizer depends on this trait; [`LlmService`] is the production
/// implementation.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String>;
}

/// Service for LLM operations with multi-provider fallback.
#[derive(Clone)]
pub struct LlmService {
    inner: Arc<LlmServiceInner>,
}

struct LlmServiceInner {
    providers: Vec<LlmProviderConfig>,
    client: Client,
    /// Last error message from LLM call
    last_error: RwLock<Option<String>>,
    /// Consecutive error count
    error_count: AtomicU32,
    /// When the last failure was recorded
    last_failure_at: RwLock<Option<Instant>>,
}

/// Response from LLM API
#[derive(Debug, Deserialize)]
struct LlmResponse {
    choices: Option<Vec<Choice>>,
    candidates: Option<Vec<Candidate>>,     // Gemini format
    content: Option<Vec<AnthropicContent>>, // Anthropic format
    error: Option<LlmError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct LlmError {
    message: String,
}

impl LlmService {
    /// Create LLM service from config.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Request(format!("Failed to create HTTP client: {}", e)))?;

        let mut providers = config.providers.clone();
        providers.sort_by_key(|p| p.priority);

        info!(
            providers = ?providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
            "LLM service initialized from config"
        );

        Ok(Self {
            inner: Arc::new(LlmServiceInner {
                providers,
                client,
                last_error: RwLock::new(None),
                error_count: AtomicU32::new(0),
                last_failure_at: RwLock::new(None),
            }),
        })
    }

    /// Check if LLM service is available.
    ///
    /// False when nothing is configured, or after repeated failures until
    /// the health check interval has passed.
    pub async fn is_available(&self) -> bool {
        if self.inner.providers.is_empty() {
            return false;
        }

        let error_count = self.inner.error_count.load(Ordering::Relaxed);
        if error_count >= ERROR_THRESHOLD {
            let last_failure = self.inner.last_failure_at.read().await;
            if let Some(last) = *last_failure {
                if last.elapsed().as_secs() < HEALTH_CHECK_INTERVAL_SECS {
                    return false;
                }
            }
        }

        true
    }

    /// Last error message and consecutive failure count, if any.
    pub async fn get_error_info(&self) -> Option<(String, u32)> {
        let error = self.inner.last_error.read().await;
        error.as_ref().map(|msg| {
            (
                msg.clone(),
                self.inner.error_count.load(Ordering::Relaxed),
            )
        })
    }

    async fn record_error(&self, error: &str) {
        *self.inner.last_error.write().await = Some(error.to_string());
        *self.inner.last_failure_at.write().await = Some(Instant::now());
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn clear_error(&self) {
        *self.inner.last_error.write().await = None;
        self.inner.error_count.store(0, Ordering::Relaxed);
    }

    /// Get provider names in priority order
    pub fn providers(&self) -> Vec<String> {
        self.inner.providers.iter().map(|p| p.name.clone()).collect()
    }

    /// Generate a completion, trying each provider once in priority order.
    pub async fn generate(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        if self.inner.providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let mut last_error = None;

        for provider in &self.inner.providers {
            if !provider.has_credentials() {
                debug!(provider = %provider.name, "Skipping provider without credentials");
                continue;
            }

            match self
                .call_provider(provider, system_prompt, prompt, max_tokens)
                .await
            {
                Ok(response) => {
                    self.clear_error().await;
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        let error_msg = last_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "All providers failed".to_string());
        self.record_error(&error_msg).await;

        Err(last_error.unwrap_or(Error::Llm("All providers failed".to_string())))
    }

    /// Make the actual API call to a provider.
    async fn call_provider(
        &self,
        provider: &LlmProviderConfig,
        system_prompt: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        debug!(
            provider = %provider.name,
            model = %provider.model,
            "Calling LLM provider"
        );

        let (url, body) = match provider.name.as_str() {
            "gemini" => build_gemini_request(provider, system_prompt, prompt, max_tokens),
            "anthropic" => build_anthropic_request(provider, system_prompt, prompt, max_tokens),
            _ => build_openai_request(provider, system_prompt, prompt, max_tokens),
        };

        let request = self
            .inner
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        let request = match provider.name.as_str() {
            // Gemini carries the key in the query string.
            "gemini" => request,
            "anthropic" => request
                .header("x-api-key", &provider.api_key)
                .header("anthropic-version", "2023-06-01"),
            "openrouter" => request
                .header("Authorization", format!("Bearer {}", provider.api_key))
                .header("X-Title", "Recall Memory"),
            _ => request.header("Authorization", format!("Bearer {}", provider.api_key)),
        };

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Request(format!("Failed to read response: {}", e)))?;

        if status.as_u16() == 429 {
            return Err(Error::RateLimitExceeded);
        }

        if !status.is_success() {
            return Err(Error::Llm(format!("Provider returned {}: {}", status, text)));
        }

        parse_response(&provider.name, &text)
    }
}

#[async_trait]
impl TextCompleter for LlmService {
    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String> {
        if !self.inner.providers.is_empty() && !self.is_available().await {
            debug!("Skipping completion while providers are failing");
            return Err(Error::Unavailable);
        }
        self.generate(Some(system_prompt), user_content, DEFAULT_MAX_TOKENS)
            .await
    }
}

fn build_gemini_request(
    provider: &LlmProviderConfig,
    system_prompt: Option<&str>,
    prompt: &str,
    max_tokens: u32,
) -> (String, Value) {
    let url = format!(
        "{}/models/{}:generateContent?key={}",
        provider.base_url, provider.model, provider.api_key
    );

    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": prompt}]
        }],
        "generationConfig": {
            "maxOutputTokens": max_tokens,
            "temperature": TEMPERATURE
        }
    });

    if let Some(system) = system_prompt {
        body["systemInstruction"] = json!({ "parts": [{"text": system}] });
    }

    (url, body)
}

/// Build request for OpenAI-compatible APIs (OpenAI, OpenRouter)
fn build_openai_request(
    provider: &LlmProviderConfig,
    system_prompt: Option<&str>,
    prompt: &str,
    max_tokens: u32,
) -> (String, Value) {
    let url = format!("{}/chat/completions", provider.base_url);

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));

    let body = json!({
        "model": provider.model,
        "messages": messages,
        "max_tokens": max_tokens,
        "temperature": TEMPERATURE
    });

    (url, body)
}

fn build_anthropic_request(
    provider: &LlmProviderConfig,
    system_prompt: Option<&str>,
    prompt: &str,
    max_tokens: u32,
) -> (String, Value) {
    let url = format!("{}/messages", provider.base_url);

    let mut body = json!({
        "model": provider.model,
        "messages": [
            {"role": "user", "content": prompt}
        ],
        "max_tokens": max_tokens,
        "temperature": TEMPERATURE
    });

    if let Some(system) = system_prompt {
        body["system"] = json!(system);
    }

    (url, body)
}

/// Parse response from different API formats
fn parse_response(provider: &str, text: &str) -> Result<String> {
    let response: LlmResponse = serde_json::from_str(text)
        .map_err(|e| Error::Llm(format!("Failed to parse response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(Error::Llm(error.message));
    }

    // Anthropic
    if let Some(content) = response.content {
        if let Some(block) = content.first() {
            return Ok(block.text.clone());
        }
    }

    // Gemini
    if let Some(candidates) = response.candidates {
        if let Some(candidate) = candidates.first() {
            let joined: String = candidate
                .content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect();
            return Ok(joined);
        }
    }

    // OpenAI
    if let Some(choices) = response.choices {
        if let Some(choice) = choices.first() {
            if let Some(content) = choice.message.as_ref().and_then(|m| m.content.clone()) {
                return Ok(content);
            }
            if let Some(text) = &choice.text {
                return Ok(text.clone());
            }
        }
    }

    Err(Error::Llm(format!("No content in {} response", provider)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> LlmProviderConfig {
        LlmProviderConfig {
            name: name.to_string(),
            base_url: default_endpoint(name),
            model: default_model(name),
            api_key: "key".to_string(),
            priority: 1,
        }
    }

    #[test]
    fn test_parse_openai_response() {
        let text = r#"{"choices":[{"message":{"role":"assistant","content":"Short summary"}}]}"#;
        assert_eq!(parse_response("openai", text).unwrap(), "Short summary");
    }

    #[test]
    fn test_parse_anthropic_response() {
        let text = r#"{"content":[{"type":"text","text":"Claude says hi"}]}"#;
        assert_eq!(parse_response("anthropic", text).unwrap(), "Claude says hi");
    }

    #[test]
    fn test_parse_gemini_response_joins_parts() {
        let text = r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(parse_response("gemini", text).unwrap(), "ab");
    }

    #[test]
    fn test_parse_error_response() {
        let text = r#"{"error":{"message":"quota","type":"insufficient_quota"}}"#;
        let err = parse_response("openai", text).unwrap_err();
        assert!(err.to_string().contains("quota"));
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(parse_response("openai", r#"{"choices":[]}"#).is_err());
        assert!(parse_response("openai", "not json").is_err());
    }

    #[test]
    fn test_openai_request_includes_system_role() {
        let (url, body) = build_openai_request(&provider("openai"), Some("be brief"), "text", 150);
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "text");
        assert_eq!(body["max_tokens"], 150);
    }

    #[test]
    fn test_anthropic_request_uses_system_field() {
        let (_, body) = build_anthropic_request(&provider("anthropic"), Some("be brief"), "text", 99);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_gemini_request_without_system() {
        let (url, body) = build_gemini_request(&provider("gemini"), None, "text", 50);
        assert!(url.ends_with(":generateContent?key=key"));
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 50);
    }

    #[tokio::test]
    async fn test_no_providers() {
        let service = LlmService::new(&LlmConfig::default()).unwrap();
        assert!(!service.is_available().await);
        let err = service.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, Error::NoProviders));
    }

    #[test]
    fn test_default_endpoints() {
        assert_eq!(
            default_endpoint("gemini"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(default_endpoint("anthropic"), "https://api.anthropic.com/v1");
        assert_eq!(default_endpoint("openai"), "https://api.openai.com/v1");
    }

    #[test]
    fn test_default_models() {
        assert_eq!(default_model("gemini"), "gemini-1.5-flash");
        assert_eq!(default_model("anthropic"), "claude-3-5-haiku-20241022");
        assert_eq!(default_model("openai"), "gpt-4o-mini");
    }
}
