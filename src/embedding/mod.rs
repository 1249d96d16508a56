//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and the closed set of backends:
//! - **[`LocalProvider`]** — runs a bundled sentence-embedding model via
//!   fastembed on a blocking worker thread; no network after model download.
//! - **[`OpenAiProvider`]** — OpenAI-compatible `POST /v1/embeddings` with
//!   bearer auth; also serves the `generic` provider with a configurable
//!   base URL and optional auth.
//! - **[`GoogleProvider`]** — Google-style `:embedContent` endpoint with
//!   `taskType` role mapping.
//!
//! Providers that need instruction prefixes apply them internally, keyed by
//! [`EmbeddingRole`]; callers never prepend prefixes themselves.
//!
//! Also provides vector utilities shared by the store and the retrieval
//! engine:
//! - [`l2_normalize`] — unit-length copy of a vector
//! - [`dot`] / [`cosine_similarity`] — similarity kernels
//! - [`encode_vector`] / [`decode_vector`] — JSON float-array codec for the
//!   legacy-compatible embedding column
//!
//! # Retry Strategy
//!
//! HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

#[cfg(feature = "local-embeddings")]
mod local;

#[cfg(feature = "local-embeddings")]
pub use local::LocalProvider;

use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Whether a text is being embedded as corpus content or as a query.
///
/// Instruction-aware models produce asymmetric embeddings; the role lets the
/// provider pick the matching instruction prefix or task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingRole {
    Document,
    Query,
}

/// One embedding result.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_id: String,
    pub processing_ms: u64,
}

/// Capability interface over the provider variants. No inheritance; the
/// factory [`create_provider`] picks the variant from configuration.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded alongside stored vectors.
    fn model_id(&self) -> &str;

    /// Declared dimensionality, when the provider knows it up front. HTTP
    /// providers learn it from the first response instead.
    fn dims(&self) -> Option<usize>;

    /// Embed one text in the given role.
    async fn embed(&self, text: &str, role: EmbeddingRole) -> Result<Embedding>;
}

/// Instantiate the provider selected by `config.provider`.
///
/// | Config value | Provider |
/// |--------------|----------|
/// | `"local"` | [`LocalProvider`] (feature `local-embeddings`) |
/// | `"openai"` | [`OpenAiProvider`] against api.openai.com |
/// | `"generic"` | [`OpenAiProvider`] against `api_endpoint` |
/// | `"google"` | [`GoogleProvider`] |
///
/// Construction is cheap; the local model is loaded lazily on first embed.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(Error::InvalidConfig(
            "local embedding provider requires --features local-embeddings".to_string(),
        )),
        "openai" => Ok(Box::new(OpenAiProvider::openai(config)?)),
        "generic" => Ok(Box::new(OpenAiProvider::generic(config)?)),
        "google" => Ok(Box::new(GoogleProvider::new(config)?)),
        other => Err(Error::InvalidConfig(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ OpenAI-compatible provider ============

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Embedding provider speaking the OpenAI embeddings wire format.
///
/// Sends `{"model": …, "input": …}` with optional bearer auth and accepts
/// any of the response shapes seen in the wild: `data[].embedding`, a
/// top-level `embedding`, or a bare array.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    /// For error messages: `openai` or `generic`.
    label: &'static str,
}

impl OpenAiProvider {
    pub fn openai(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                return Err(Error::InvalidConfig(
                    "embedding.api_key is required for the openai provider".to_string(),
                ))
            }
        };
        Ok(Self {
            client: build_client(config)?,
            endpoint: OPENAI_ENDPOINT.to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            api_key: Some(api_key),
            max_retries: config.max_retries,
            label: "openai",
        })
    }

    /// OpenAI-compatible server at a configurable base URL; auth optional.
    pub fn generic(config: &EmbeddingConfig) -> Result<Self> {
        let base = match config.api_endpoint.as_deref() {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => {
                return Err(Error::InvalidConfig(
                    "embedding.api_endpoint is required for the generic provider".to_string(),
                ))
            }
        };
        let endpoint = if base.ends_with("/embeddings") {
            base
        } else {
            format!("{}/v1/embeddings", base)
        };
        let model = config.model.clone().ok_or_else(|| {
            Error::InvalidConfig("embedding.model is required for the generic provider".to_string())
        })?;
        Ok(Self {
            client: build_client(config)?,
            endpoint,
            model,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            max_retries: config.max_retries,
            label: "generic",
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, text: &str, _role: EmbeddingRole) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let started = Instant::now();
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            self.label,
        )
        .await?;
        let vector = parse_openai_style(&json, self.label)?;

        Ok(Embedding {
            vector,
            model_id: self.model.clone(),
            processing_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Extract the embedding vector from an OpenAI-style response.
///
/// Accepted shapes, tried in order: `{"data":[{"embedding":[…]}]}`,
/// `{"embedding":[…]}`, or a bare `[…]`. Explicit branching on the parsed
/// JSON rather than typed deserialization, since servers disagree here.
fn parse_openai_style(json: &Value, label: &str) -> Result<Vec<f32>> {
    let array = if let Some(data) = json.get("data").and_then(|d| d.as_array()) {
        data.first()
            .and_then(|item| item.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::ProviderTransport(format!(
                    "invalid {} response: data array without embeddings",
                    label
                ))
            })?
    } else if let Some(embedding) = json.get("embedding").and_then(|e| e.as_array()) {
        embedding
    } else if let Some(bare) = json.as_array() {
        bare
    } else {
        return Err(Error::ProviderTransport(format!(
            "invalid {} response: no embedding found",
            label
        )));
    };

    let vector = json_floats(array);
    if vector.is_empty() {
        return Err(Error::ProviderTransport(format!(
            "invalid {} response: empty embedding",
            label
        )));
    }
    Ok(vector)
}

// ============ Google-style provider ============

const GOOGLE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GOOGLE_DEFAULT_MODEL: &str = "text-embedding-004";

/// Embedding provider speaking the Google `:embedContent` wire format.
///
/// Sends `{"content":{"parts":[{"text": …}]}, "taskType": …}` and reads the
/// vector from `embedding.values`. The role maps to
/// `RETRIEVAL_QUERY`/`RETRIEVAL_DOCUMENT`.
pub struct GoogleProvider {
    client: reqwest::Client,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl GoogleProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                return Err(Error::InvalidConfig(
                    "embedding.api_key is required for the google provider".to_string(),
                ))
            }
        };
        Ok(Self {
            client: build_client(config)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GOOGLE_DEFAULT_MODEL.to_string()),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GoogleProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, text: &str, role: EmbeddingRole) -> Result<Embedding> {
        let task_type = match role {
            EmbeddingRole::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingRole::Query => "RETRIEVAL_QUERY",
        };
        let body = serde_json::json!({
            "content": { "parts": [ { "text": text } ] },
            "taskType": task_type,
        });
        let url = format!(
            "{}/{}:embedContent?key={}",
            GOOGLE_BASE, self.model, self.api_key
        );

        let started = Instant::now();
        let json =
            post_json_with_retry(&self.client, &url, None, &body, self.max_retries, "google")
                .await?;
        let vector = parse_google(&json)?;

        Ok(Embedding {
            vector,
            model_id: self.model.clone(),
            processing_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn parse_google(json: &Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            Error::ProviderTransport("invalid google response: missing embedding.values".to_string())
        })?;

    let vector = json_floats(values);
    if vector.is_empty() {
        return Err(Error::ProviderTransport(
            "invalid google response: empty embedding".to_string(),
        ));
    }
    Ok(vector)
}

// ============ Shared HTTP plumbing ============

fn build_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::ProviderTransport(format!("failed to build HTTP client: {}", e)))
}

/// POST a JSON body with retry/backoff and return the parsed response.
///
/// Retries 429, 5xx, and network errors; other client errors fail
/// immediately.
async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    label: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<Value>().await.map_err(|e| {
                        Error::ProviderTransport(format!("{} returned malformed JSON: {}", label, e))
                    });
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(Error::ProviderTransport(format!(
                        "{} API error {}: {}",
                        label, status, body_text
                    )));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                return Err(Error::ProviderTransport(format!(
                    "{} API error {}: {}",
                    label, status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(Error::ProviderTransport(format!(
                    "{} request failed: {}",
                    label, e
                )));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        Error::ProviderTransport(format!("{} embedding failed after retries", label))
    }))
}

fn json_floats(array: &[Value]) -> Vec<f32> {
    array
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Vector utilities ============

/// Unit-length copy of a vector, or `None` for empty/zero-norm input.
pub fn l2_normalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
    let norm = norm_sq.sqrt();
    if vector.is_empty() || norm < f32::EPSILON {
        return None;
    }
    Some(vector.iter().map(|x| x / norm).collect())
}

/// Inner product. For unit-length inputs this equals cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// vectors.
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

/// Encode a vector as the JSON float array stored in the embedding column.
pub fn encode_vector(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 12 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // Non-finite values cannot be represented in JSON; store as 0.
        if v.is_finite() {
            out.push_str(&format!("{}", v));
        } else {
            out.push('0');
        }
    }
    out.push(']');
    out
}

/// Decode a stored JSON float array. `None` for unparseable input; callers
/// treat such rows as absent.
pub fn decode_vector(text: &str) -> Option<Vec<f32>> {
    serde_json::from_str::<Vec<f32>>(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_data_shape() {
        let json = serde_json::json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]});
        let v = parse_openai_style(&json, "openai").unwrap();
        assert_eq!(v.len(), 3);
        assert!((v[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_openai_flat_shape() {
        let json = serde_json::json!({"embedding": [1.0, 2.0]});
        let v = parse_openai_style(&json, "generic").unwrap();
        assert_eq!(v, vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_openai_bare_array() {
        let json = serde_json::json!([0.5, -0.5]);
        let v = parse_openai_style(&json, "generic").unwrap();
        assert_eq!(v, vec![0.5, -0.5]);
    }

    #[test]
    fn test_parse_openai_rejects_garbage() {
        let json = serde_json::json!({"message": "no embeddings here"});
        assert!(parse_openai_style(&json, "openai").is_err());

        let json = serde_json::json!({"data": []});
        assert!(parse_openai_style(&json, "openai").is_err());
    }

    #[test]
    fn test_parse_google_values() {
        let json = serde_json::json!({"embedding": {"values": [0.1, 0.9]}});
        let v = parse_google(&json).unwrap();
        assert_eq!(v, vec![0.1, 0.9]);
    }

    #[test]
    fn test_parse_google_rejects_missing_values() {
        let json = serde_json::json!({"embedding": {}});
        assert!(parse_google(&json).is_err());
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let v = l2_normalize(&[3.0, 4.0]).unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert!(l2_normalize(&[0.0, 0.0, 0.0]).is_none());
        assert!(l2_normalize(&[]).is_none());
    }

    #[test]
    fn test_dot_of_units_is_cosine() {
        let a = l2_normalize(&[1.0, 0.0]).unwrap();
        let b = l2_normalize(&[1.0, 1.0]).unwrap();
        let expected = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0]);
        assert!((dot(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_vector_codec_roundtrip() {
        let v = vec![1.0f32, -2.5, 0.0, 3.125];
        let encoded = encode_vector(&v);
        assert_eq!(decode_vector(&encoded).unwrap(), v);
    }

    #[test]
    fn test_decode_vector_rejects_garbage() {
        assert!(decode_vector("not json").is_none());
        assert!(decode_vector("{\"a\": 1}").is_none());
    }
}
