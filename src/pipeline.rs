//! Embedding pipeline: provider selection, batching, progress.
//!
//! One [`EmbeddingPipeline`] owns at most one provider at a time. The
//! provider is created lazily from configuration on first use and torn down
//! by [`EmbeddingPipeline::reset`]; the next call re-initializes from fresh
//! configuration.
//!
//! Failure semantics:
//! - A failed provider init propagates and leaves the pipeline not-ready.
//! - A failed single embed propagates.
//! - A failed `embed_batch` entry is logged and omitted from the result map.
//! - Every embed is bounded by the configured per-call deadline.
//! - `embed_batch` polls its cancellation token before every embedding call
//!   and returns [`Error::Cancelled`] as soon as the token fires.

use log::warn;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::embedding::{create_provider, Embedding, EmbeddingProvider, EmbeddingRole};
use crate::error::{Error, Result};
use crate::progress::{CancelToken, ProgressEvent, ProgressReporter};

/// How often batch loops yield back to the host event loop.
const YIELD_EVERY: usize = 8;

pub struct EmbeddingPipeline {
    config: std::sync::Mutex<EmbeddingConfig>,
    provider: tokio::sync::Mutex<Option<Arc<dyn EmbeddingProvider>>>,
}

impl EmbeddingPipeline {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config: std::sync::Mutex::new(config),
            provider: tokio::sync::Mutex::new(None),
        }
    }

    /// Pipeline with a pre-built provider. Used by hosts that construct
    /// their own provider and by tests injecting deterministic embedders.
    pub fn with_provider(config: EmbeddingConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config: std::sync::Mutex::new(config),
            provider: tokio::sync::Mutex::new(Some(provider)),
        }
    }

    fn config_snapshot(&self) -> EmbeddingConfig {
        self.config.lock().expect("config lock").clone()
    }

    /// Initialize the provider from configuration if necessary.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let mut guard = self.provider.lock().await;
        if let Some(provider) = guard.as_ref() {
            return Ok(Arc::clone(provider));
        }
        let config = self.config_snapshot();
        let provider: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config)?);
        *guard = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Whether a provider is currently initialized.
    pub fn is_ready(&self) -> bool {
        self.provider
            .try_lock()
            .map(|guard| guard.is_some())
            .unwrap_or(true)
    }

    /// Model identifier of the active provider, if any.
    pub async fn model_id(&self) -> Option<String> {
        self.provider
            .lock()
            .await
            .as_ref()
            .map(|p| p.model_id().to_string())
    }

    /// Embed one text. The call is bounded by `embedding.timeout_secs`; a
    /// timeout rejects this job but leaves the pipeline usable.
    pub async fn embed(&self, text: &str, role: EmbeddingRole) -> Result<Embedding> {
        let provider = self.ensure_ready().await?;
        let timeout_secs = self.config_snapshot().timeout_secs;
        match tokio::time::timeout(Duration::from_secs(timeout_secs), provider.embed(text, role))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::EmbeddingTimeout(timeout_secs)),
        }
    }

    pub async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed(text, EmbeddingRole::Query).await
    }

    pub async fn embed_document(&self, text: &str) -> Result<Embedding> {
        self.embed(text, EmbeddingRole::Document).await
    }

    /// Embed a batch of `(id, text)` pairs in input order.
    ///
    /// Per-entry failures are logged and omitted from the result map. The
    /// loop yields to the host event loop every few items, reports progress
    /// through `reporter`, and polls `cancel` before every embedding call;
    /// a fired token returns [`Error::Cancelled`] immediately, discarding
    /// nothing the caller has already committed.
    pub async fn embed_batch<K>(
        &self,
        items: &[(K, String)],
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<HashMap<K, Embedding>>
    where
        K: Eq + Hash + Clone + std::fmt::Debug,
    {
        // Fail fast when the provider cannot initialize at all.
        self.ensure_ready().await?;

        let total = items.len() as u64;
        let mut results = HashMap::with_capacity(items.len());

        for (i, (id, text)) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.embed(text, EmbeddingRole::Document).await {
                Ok(embedding) => {
                    results.insert(id.clone(), embedding);
                }
                Err(e) => {
                    warn!("embedding failed for {:?}, skipping: {}", id, e);
                }
            }

            if (i + 1) % YIELD_EVERY == 0 {
                reporter.report(ProgressEvent::Embedding {
                    n: (i + 1) as u64,
                    total,
                });
                tokio::task::yield_now().await;
            }
        }

        reporter.report(ProgressEvent::Embedding { n: total, total });
        Ok(results)
    }

    /// Destroy the current provider. The next embed re-initializes from the
    /// configuration active at that point.
    pub async fn reset(&self) {
        let mut guard = self.provider.lock().await;
        *guard = None;
    }

    /// Swap in a new embedding configuration and drop the current provider.
    pub async fn set_config(&self, config: EmbeddingConfig) {
        {
            let mut guard = self.config.lock().expect("config lock");
            *guard = config;
        }
        self.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic test provider: the vector is derived from text length.
    /// Optionally fails on a marker, sleeps, or cancels a token after each
    /// call to exercise mid-batch cancellation.
    struct StubProvider {
        fail_marker: Option<&'static str>,
        delay: Option<Duration>,
        cancel_after_call: Option<CancelToken>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn plain() -> Self {
            Self {
                fail_marker: None,
                delay: None,
                cancel_after_call: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        fn model_id(&self) -> &str {
            "stub-model"
        }

        fn dims(&self) -> Option<usize> {
            Some(3)
        }

        async fn embed(&self, text: &str, _role: EmbeddingRole) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(token) = &self.cancel_after_call {
                token.cancel();
            }
            if let Some(marker) = self.fail_marker {
                if text.contains(marker) {
                    return Err(Error::ProviderTransport("stub failure".to_string()));
                }
            }
            Ok(Embedding {
                vector: vec![text.len() as f32, 1.0, 0.0],
                model_id: "stub-model".to_string(),
                processing_ms: 0,
            })
        }
    }

    fn pipeline_with(provider: StubProvider) -> EmbeddingPipeline {
        EmbeddingPipeline::with_provider(EmbeddingConfig::default(), Arc::new(provider))
    }

    #[tokio::test]
    async fn test_embed_roles() {
        let pipeline = pipeline_with(StubProvider::plain());
        let doc = pipeline.embed_document("hello").await.unwrap();
        let query = pipeline.embed_query("hello").await.unwrap();
        assert_eq!(doc.model_id, "stub-model");
        assert_eq!(doc.vector.len(), 3);
        assert_eq!(query.vector, doc.vector);
    }

    #[tokio::test]
    async fn test_embed_batch_skips_failures() {
        let pipeline = pipeline_with(StubProvider {
            fail_marker: Some("poison"),
            ..StubProvider::plain()
        });
        let items = vec![
            (1i64, "first text".to_string()),
            (2i64, "poison pill".to_string()),
            (3i64, "third text".to_string()),
        ];
        let results = pipeline
            .embed_batch(&items, &CancelToken::new(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.contains_key(&1));
        assert!(!results.contains_key(&2));
        assert!(results.contains_key(&3));
    }

    #[tokio::test]
    async fn test_embed_batch_stops_between_embedding_calls() {
        // The provider fires the token during the first call; the batch
        // must stop before the second call, not at a batch boundary.
        let cancel = CancelToken::new();
        let provider = Arc::new(StubProvider {
            cancel_after_call: Some(cancel.clone()),
            ..StubProvider::plain()
        });
        let pipeline =
            EmbeddingPipeline::with_provider(
                EmbeddingConfig::default(),
                Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            );

        let items = vec![
            (1i64, "first".to_string()),
            (2i64, "second".to_string()),
            (3i64, "third".to_string()),
        ];
        let err = pipeline
            .embed_batch(&items, &cancel, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(pipeline.is_ready());
    }

    #[tokio::test]
    async fn test_embed_batch_rejects_cancelled_token_up_front() {
        let pipeline = pipeline_with(StubProvider::plain());
        let cancel = CancelToken::new();
        cancel.cancel();
        let items = vec![(1i64, "text".to_string())];
        let err = pipeline
            .embed_batch(&items, &cancel, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_embed_timeout_leaves_pipeline_usable() {
        let pipeline = pipeline_with(StubProvider {
            delay: Some(Duration::from_secs(120)),
            ..StubProvider::plain()
        });
        let err = pipeline.embed_document("slow").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingTimeout(60)));
        assert!(pipeline.is_ready());
    }

    #[tokio::test]
    async fn test_reset_drops_provider() {
        let pipeline = pipeline_with(StubProvider::plain());
        assert!(pipeline.is_ready());
        pipeline.reset().await;
        assert!(!pipeline.is_ready());
        assert!(pipeline.model_id().await.is_none());
    }
}
