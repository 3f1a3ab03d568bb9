//! Gemini REST client
//!
//! Implements [`GenerativeBackend`] on top of the `generativelanguage`
//! `generateContent` and `streamGenerateContent` endpoints.

mod functions;
mod simple;
mod streaming;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::backend::{BackendError, GenerativeBackend, TextStream};
use super::format::gemini::error_from_body;
use super::types::{ConversationTurn, FunctionDeclaration, FunctionOutcome, GenerationOptions};

/// Public Gemini API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Longest slice of an error body copied into an error message
const MAX_ERROR_BODY: usize = 200;

/// Distinct model ids whose endpoints are kept around
const MODEL_CACHE_CAPACITY: u64 = 64;

/// Connection settings for [`GeminiClient`]
#[derive(Debug, Clone)]
pub struct GeminiClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Endpoints resolved for one model id
#[derive(Debug)]
struct ModelHandle {
    generate_url: String,
    stream_url: String,
}

impl ModelHandle {
    fn new(base_url: &str, model: &str) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let base = base_url.trim_end_matches('/');
        Self {
            generate_url: format!("{}/models/{}:generateContent", base, model),
            stream_url: format!("{}/models/{}:streamGenerateContent?alt=sse", base, model),
        }
    }
}

/// Gemini backend client
///
/// Cheap to share behind an `Arc`; model handles are cached per model id and
/// may be inserted concurrently by several connections.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    models: Cache<String, Arc<ModelHandle>>,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!("Gemini API key is required"));
        }
        // Reject keys that cannot travel in a header before the first request
        HeaderValue::from_str(&config.api_key).context("Invalid Gemini API key")?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        info!("Gemini client ready (base URL: {})", config.base_url);
        Ok(Self {
            http,
            api_key: config.api_key,
            base_url: config.base_url,
            models: Cache::new(MODEL_CACHE_CAPACITY),
        })
    }

    /// Resolve (and cache) the endpoints for a model id
    fn model(&self, model: &str) -> Arc<ModelHandle> {
        self.models.get_with(model.to_string(), || {
            debug!("Caching model handle for {}", model);
            Arc::new(ModelHandle::new(&self.base_url, model))
        })
    }

    /// Build an authenticated POST request
    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header("x-goog-api-key", &self.api_key)
    }

    /// Send a request body, turning transport failures and error statuses into [`BackendError`]
    async fn send(&self, url: &str, body: &Value) -> Result<reqwest::Response, BackendError> {
        let response = self
            .build_request(url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::network(format!("Gemini request failed: {}", e)))?;
        handle_error_response(response).await
    }

    /// POST and parse the JSON answer
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, BackendError> {
        let response = self.send(url, body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::network(format!("Failed to read response body: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::decode(format!("Failed to parse Gemini response: {}", e)))
    }
}

/// Map a non-success response to [`BackendError::Http`], passing successes through
async fn handle_error_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    // Prefer Gemini's structured error; the status line stays authoritative
    let error = match serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| json.get("error").cloned())
    {
        Some(error) => match error_from_body(&error, status.as_u16()) {
            BackendError::Http { message, .. } => BackendError::http(status.as_u16(), message),
            other => other,
        },
        None => BackendError::http(status.as_u16(), truncate(&body, MAX_ERROR_BODY)),
    };

    warn!("Gemini API error {}: {}", status, error);
    Err(error)
}

/// Cut `text` to at most `max` bytes without splitting a character
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        self.call_simple(model, prompt, options).await
    }

    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream, BackendError> {
        self.call_streaming(model, prompt, options).await
    }

    async fn chat_turn(
        &self,
        model: &str,
        history: &[ConversationTurn],
        message: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        self.call_chat(model, history, message, options).await
    }

    async fn invoke_with_functions(
        &self,
        model: &str,
        prompt: &str,
        functions: &[FunctionDeclaration],
        options: &GenerationOptions,
    ) -> Result<FunctionOutcome, BackendError> {
        self.call_with_functions(model, prompt, functions, options)
            .await
    }
}
