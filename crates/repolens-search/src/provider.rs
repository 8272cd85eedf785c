//! Embedding provider abstraction and OpenAI-compatible HTTP implementation
//!
//! The core never computes embeddings itself; it talks to a provider through
//! [`EmbeddingProvider`]. The bundled implementation targets any
//! OpenAI-compatible `/embeddings` endpoint (OpenAI, OpenRouter, Azure
//! OpenAI, Ollama):
//!
//! - POST `{base_url}/embeddings`
//! - Request: `{"model": "...", "input": ["text1", "text2", ...]}`
//! - Response: `{"data": [{"embedding": [...], "index": 0}, ...]}`
//!
//! Transient failures (429, timeouts, 5xx) are retried with exponential
//! backoff up to a fixed attempt ceiling; auth and bad-request failures are
//! surfaced immediately. Outbound requests are paced by a local rate
//! limiter so bursts of batches respect the provider's limits.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SearchError};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default max retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Default requests per second limit
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// Type alias for the rate limiter
type ProviderRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Embedding provider trait
///
/// Maps batches of text to fixed-length vectors. Implementations must be
/// `Send + Sync`; all methods are async to support remote providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts.
    ///
    /// Returns one vector per input, in input order. Implementations may
    /// return fewer vectors than inputs when individual items fail; callers
    /// align by index and treat the missing tail as per-item failures.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the model producing the embeddings.
    fn model_id(&self) -> &str;

    /// Dimensionality of the produced vectors.
    fn dimension(&self) -> usize;
}

/// Configuration for the OpenAI-compatible HTTP provider
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the API (e.g. "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// API key (optional for local endpoints like Ollama)
    pub api_key: Option<String>,
    /// Embedding model name
    pub model: String,
    /// Expected vector dimensionality; responses are validated against it
    pub dimension: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Requests per second limit
    pub requests_per_second: u32,
}

impl EmbeddingConfig {
    /// Create a config for the given endpoint and model.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            dimension,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Request body for the /embeddings endpoint
#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

/// Single embedding in the response
#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Response from the /embeddings endpoint
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// OpenAI-compatible embedding provider
pub struct HttpEmbeddingProvider {
    client: Client,
    config: EmbeddingConfig,
    rate_limiter: Arc<ProviderRateLimiter>,
}

impl HttpEmbeddingProvider {
    /// Create a new provider from configuration.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;

        let rps = NonZeroU32::new(config.requests_per_second)
            .unwrap_or_else(|| NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Get the embeddings endpoint URL
    fn embeddings_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{}/embeddings", base)
    }

    /// Send request with retry logic for transient failures
    async fn request_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut retry_delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 0..=self.config.max_retries {
            self.rate_limiter.until_ready().await;

            match self.send_request(texts.clone()).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    warn!(
                        "Embedding request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        Err(SearchError::ProviderUnavailable(
            "Request failed after retries".into(),
        ))
    }

    /// Send a single request to the endpoint
    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = self.embeddings_url();
        let request_body = EmbeddingsRequest {
            model: self.config.model.clone(),
            input: texts,
        };

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body);

        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::ProviderUnavailable("Request timed out".into())
            } else if e.is_connect() {
                SearchError::ProviderUnavailable(format!("Connection failed: {}", e))
            } else {
                SearchError::ProviderUnavailable(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();

        match status {
            StatusCode::OK => {
                let embed_response: EmbeddingsResponse = response
                    .json()
                    .await
                    .map_err(|e| SearchError::Embedding(format!("Invalid response: {}", e)))?;

                // Sort by index so vectors line up with input order
                let mut data = embed_response.data;
                data.sort_by_key(|d| d.index);

                let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

                for vector in &embeddings {
                    if vector.len() != self.config.dimension {
                        return Err(SearchError::DimensionMismatch {
                            expected: self.config.dimension,
                            actual: vector.len(),
                        });
                    }
                }

                debug!("Embedded {} texts", embeddings.len());
                Ok(embeddings)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::Auth(body))
            }
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::InvalidRequest(body))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());

                Err(SearchError::RateLimited { retry_after })
            }
            s if s.is_server_error() => Err(SearchError::ProviderUnavailable(format!(
                "Service unavailable: {}",
                s
            ))),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderUnavailable(format!(
                    "Request failed with status {}: {}",
                    status, body
                )))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.request_with_retry(texts).await
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn mock_response(dim: usize, count: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "object": "embedding",
                    "embedding": vec![0.1_f32; dim],
                    "index": i
                })
            })
            .collect();

        serde_json::json!({
            "object": "list",
            "data": data,
            "model": "test-model"
        })
    }

    fn test_config(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig::new(server.uri(), "test-model", 8)
            .with_api_key("test-key")
            .with_max_retries(1)
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(8, 2)))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();
        let embeddings = provider
            .embed(vec!["one".into(), "two".into()])
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 8);
    }

    #[tokio::test]
    async fn test_empty_input_skips_request() {
        let server = MockServer::start().await;
        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();

        let embeddings = provider.embed(vec![]).await.unwrap();
        assert!(embeddings.is_empty());
    }

    #[tokio::test]
    async fn test_response_sorted_by_index() {
        let server = MockServer::start().await;

        // Items deliberately out of order; index 1 has a marker value
        let body = serde_json::json!({
            "object": "list",
            "data": [
                {"embedding": vec![2.0_f32; 8], "index": 1},
                {"embedding": vec![1.0_f32; 8], "index": 0}
            ]
        });

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();
        let embeddings = provider
            .embed(vec!["first".into(), "second".into()])
            .await
            .unwrap();

        assert_eq!(embeddings[0][0], 1.0);
        assert_eq!(embeddings[1][0], 2.0);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();
        let result = provider.embed(vec!["test".into()]).await;

        assert!(matches!(result, Err(SearchError::Auth(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_reports_retry_after() {
        let server = MockServer::start().await;

        let mut config = test_config(&server);
        config.max_retries = 0;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "60")
                    .set_body_string("Rate limited"),
            )
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(config).unwrap();
        let result = provider.embed(vec!["test".into()]).await;

        match result {
            Err(SearchError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(60));
            }
            other => panic!("Expected RateLimited, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_succeeds() {
        let server = MockServer::start().await;

        // First attempt fails with 503, the retry succeeds
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(8, 1)))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();
        let embeddings = provider.embed(vec!["test".into()]).await.unwrap();
        assert_eq!(embeddings.len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(16, 1)))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();
        let result = provider.embed(vec!["test".into()]).await;

        assert!(matches!(
            result,
            Err(SearchError::DimensionMismatch {
                expected: 8,
                actual: 16
            })
        ));
    }

    #[tokio::test]
    async fn test_bad_request_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();
        let result = provider.embed(vec!["test".into()]).await;

        assert!(matches!(result, Err(SearchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_request_carries_model_and_input() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(|req: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                body["model"] == "test-model" && body["input"][0] == "hello"
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(8, 1)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(test_config(&server)).unwrap();
        provider.embed(vec!["hello".into()]).await.unwrap();
    }
}
