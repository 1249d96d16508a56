//! Local embedding provider backed by fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that, embedding runs entirely offline. Inference happens on a blocking
//! worker thread so the async executor (and the host event loop it drives)
//! is never stalled by a model call.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{l2_normalize, Embedding, EmbeddingProvider, EmbeddingRole};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Default model: 768-d, 8192-token context, instruction-aware.
const DEFAULT_MODEL: &str = "nomic-embed-text-v1.5";

/// Inputs are cut to this many chars before the model call; embedding cost
/// grows super-linearly with sequence length.
const MAX_INPUT_CHARS: usize = 8000;

/// Embedding provider for local inference.
///
/// The fastembed session is created lazily inside the first embed call (a
/// cold start can take tens of seconds while the model downloads, which is
/// why the per-embed timeout is generous) and reused afterwards.
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    session: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        // Fail on unknown model names at construction, not first embed.
        fastembed_model(&model_name)?;
        let dims = model_dims(&model_name);
        Ok(Self {
            model_name,
            dims,
            session: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_id(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed(&self, text: &str, role: EmbeddingRole) -> Result<Embedding> {
        let input = prepare_input(&self.model_name, text, role);
        let model = fastembed_model(&self.model_name)?;
        let session = Arc::clone(&self.session);
        let started = Instant::now();

        let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = session
                .lock()
                .map_err(|_| Error::ProviderTransport("local model worker poisoned".to_string()))?;
            if guard.is_none() {
                let session = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| {
                    Error::ProviderTransport(format!(
                        "failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(session);
            }
            let session = guard.as_mut().expect("session initialized above");
            session
                .embed(vec![input], None)
                .map_err(|e| Error::ProviderTransport(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| Error::ProviderTransport(format!("local embedding worker died: {}", e)))??;

        let raw = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::ProviderTransport("local model returned no vector".to_string()))?;
        // Mean pooling happens inside fastembed; normalize here so output is
        // always unit length regardless of model config.
        let vector = l2_normalize(&raw)
            .ok_or_else(|| Error::ProviderTransport("local model returned a zero vector".to_string()))?;

        Ok(Embedding {
            vector,
            model_id: self.model_name.clone(),
            processing_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Truncate to the input cap and apply the instruction prefix for
/// instruction-aware models.
fn prepare_input(model_name: &str, text: &str, role: EmbeddingRole) -> String {
    let truncated = truncate_chars(text, MAX_INPUT_CHARS);
    if model_name.starts_with("nomic-embed-text") {
        match role {
            EmbeddingRole::Document => format!("search_document: {}", truncated),
            EmbeddingRole::Query => format!("search_query: {}", truncated),
        }
    } else {
        truncated.to_string()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => Err(Error::InvalidConfig(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ))),
    }
}

fn model_dims(name: &str) -> usize {
    match name {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" => 384,
        _ => 768,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_input_applies_role_prefix() {
        let doc = prepare_input("nomic-embed-text-v1.5", "hello", EmbeddingRole::Document);
        assert_eq!(doc, "search_document: hello");
        let query = prepare_input("nomic-embed-text-v1.5", "hello", EmbeddingRole::Query);
        assert_eq!(query, "search_query: hello");
    }

    #[test]
    fn test_prepare_input_plain_for_symmetric_models() {
        let out = prepare_input("bge-base-en-v1.5", "hello", EmbeddingRole::Query);
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(9000);
        let out = truncate_chars(&text, MAX_INPUT_CHARS);
        assert_eq!(out.chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let config = EmbeddingConfig {
            model: Some("colbert-xxl".to_string()),
            ..Default::default()
        };
        assert!(LocalProvider::new(&config).is_err());
    }
}
