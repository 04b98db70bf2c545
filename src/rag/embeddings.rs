//! Embedding generation with a deterministic local fallback.
//!
//! The service prefers a remote provider (Gemini `embedContent`) and falls
//! through to a local hashed-bag-of-words embedding whenever the provider
//! is unconfigured, unreachable, or returns a malformed response. Provider
//! trouble never surfaces to callers: `embed` always returns a vector of
//! length [`EMBEDDING_DIM`].
//!
//! The fallback is a pure function of the input text — no randomness, no
//! external state — so tests can assert exact vectors and cosine scores
//! between fallback-generated embeddings are meaningful.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::EmbeddingConfig;
use crate::types::{AppError, Result, EMBEDDING_DIM};

/// Outcome of a provider embedding attempt.
///
/// Modeled as data instead of an error path so the decision to absorb a
/// provider failure is made exactly once, here.
enum ProviderOutcome {
    Ok(Vec<f32>),
    UseFallback,
}

/// Embedding service with a primary provider path and a deterministic
/// local fallback.
pub struct EmbeddingService {
    provider: Option<GeminiEmbedder>,
}

impl EmbeddingService {
    /// Create a service from configuration. With no API key configured the
    /// provider path is disabled and every call uses the local fallback.
    ///
    /// # Errors
    ///
    /// Returns a provider error if the HTTP client cannot be constructed.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let provider = match &config.api_key {
            Some(api_key) => Some(GeminiEmbedder::new(
                config.base_url.clone(),
                config.model.clone(),
                api_key.clone(),
                config.timeout_secs,
            )?),
            None => None,
        };
        Ok(Self { provider })
    }

    /// Create a service that only ever uses the local fallback.
    pub fn local() -> Self {
        Self { provider: None }
    }

    /// Whether a remote provider is configured.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Embed `text` into a vector of length [`EMBEDDING_DIM`].
    ///
    /// Never fails: provider errors and dimension mismatches fall through
    /// to the local embedding.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.try_provider(text).await {
            ProviderOutcome::Ok(vector) => vector,
            ProviderOutcome::UseFallback => fallback_embedding(text),
        }
    }

    async fn try_provider(&self, text: &str) -> ProviderOutcome {
        let Some(provider) = &self.provider else {
            return ProviderOutcome::UseFallback;
        };
        match provider.embed_content(text).await {
            Ok(vector) if vector.len() == EMBEDDING_DIM => ProviderOutcome::Ok(vector),
            Ok(vector) => {
                tracing::debug!(
                    got = vector.len(),
                    expected = EMBEDDING_DIM,
                    "embedding provider returned wrong dimension, using local embedding"
                );
                ProviderOutcome::UseFallback
            }
            Err(err) => {
                tracing::debug!(error = %err, "embedding provider failed, using local embedding");
                ProviderOutcome::UseFallback
            }
        }
    }
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

// ============================================================================
// Gemini Provider
// ============================================================================

/// Gemini `embedContent` client.
struct GeminiEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    fn new(base_url: String, model: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                AppError::EmbeddingProvider(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    async fn embed_content(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url, self.model
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "model": format!("models/{}", self.model),
                "content": { "parts": [{ "text": text }] },
            }))
            .send()
            .await
            .map_err(|e| AppError::EmbeddingProvider(format!("Request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::EmbeddingProvider(format!("Provider returned error: {}", e)))?;

        let body: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::EmbeddingProvider(format!("Malformed response: {}", e)))?;

        Ok(body.embedding.values)
    }
}

// ============================================================================
// Deterministic Fallback
// ============================================================================

/// Deterministic local embedding: hashed bag of words, L2-normalized.
///
/// Tokens are the lowercased whitespace-split words of the text; each token
/// increments one bucket selected by a 32-bit rolling hash. Whitespace-only
/// input produces the zero vector.
pub fn fallback_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];

    for token in text.to_lowercase().split_whitespace() {
        let bucket = token_hash(token).unsigned_abs() as usize % EMBEDDING_DIM;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }

    vector
}

/// 32-bit rolling hash with multiply-by-31 accumulation and wrapping
/// (two's-complement) overflow semantics.
fn token_hash(token: &str) -> i32 {
    let mut hash: i32 = 0;
    for ch in token.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as i32);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server_url: &str) -> EmbeddingService {
        EmbeddingService::new(&EmbeddingConfig {
            api_key: Some("test-key".to_string()),
            base_url: server_url.to_string(),
            model: "text-embedding-004".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn token_hash_matches_rolling_accumulator() {
        // (((104*31 + 101)*31 + 108)*31 + 108)*31 + 111
        assert_eq!(token_hash("hello"), 99_162_322);
        assert_eq!(token_hash(""), 0);
    }

    #[test]
    fn token_hash_wraps_on_overflow() {
        // Long tokens overflow i32; wrapping must stay deterministic and
        // may go negative.
        let long = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(token_hash(long), token_hash(long));
        let negative = token_hash("zzzzzzzzzz");
        assert_eq!(negative, token_hash("zzzzzzzzzz"));
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = fallback_embedding("The quick brown Fox");
        let b = fallback_embedding("The quick brown Fox");
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_has_unit_norm() {
        let vector = fallback_embedding("some words to embed here");
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {}", norm);
    }

    #[test]
    fn fallback_empty_input_is_zero_vector() {
        let vector = fallback_embedding("   \n\t ");
        assert_eq!(vector.len(), EMBEDDING_DIM);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn fallback_dimension_is_fixed() {
        assert_eq!(fallback_embedding("x").len(), EMBEDDING_DIM);
        assert_eq!(fallback_embedding("many different words").len(), EMBEDDING_DIM);
    }

    #[test]
    fn fallback_is_case_insensitive() {
        assert_eq!(
            fallback_embedding("Hello World"),
            fallback_embedding("hello world")
        );
    }

    #[test]
    fn distinct_texts_produce_distinct_vectors() {
        assert_ne!(
            fallback_embedding("rust systems programming"),
            fallback_embedding("python machine learning")
        );
    }

    #[tokio::test]
    async fn unconfigured_service_uses_fallback() {
        let service = EmbeddingService::local();
        assert!(!service.has_provider());
        let vector = service.embed("hello world").await;
        assert_eq!(vector, fallback_embedding("hello world"));
    }

    #[tokio::test]
    async fn provider_path_returns_provider_vector() {
        let server = MockServer::start().await;
        let values: Vec<f32> = (0..EMBEDDING_DIM).map(|i| i as f32 / 1000.0).collect();
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-embedding-004:embedContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": { "values": values }
            })))
            .mount(&server)
            .await;

        let service = service_for(&server.uri());
        let vector = service.embed("hello").await;
        assert_eq!(vector.len(), EMBEDDING_DIM);
        assert!((vector[1] - 0.001).abs() < 1e-6);
    }

    #[tokio::test]
    async fn provider_failure_falls_back_silently() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = service_for(&server.uri());
        let vector = service.embed("hello world").await;
        assert_eq!(vector, fallback_embedding("hello world"));
    }

    #[tokio::test]
    async fn wrong_dimension_response_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": { "values": [0.1, 0.2, 0.3] }
            })))
            .mount(&server)
            .await;

        let service = service_for(&server.uri());
        let vector = service.embed("hello world").await;
        assert_eq!(vector, fallback_embedding("hello world"));
    }
}
