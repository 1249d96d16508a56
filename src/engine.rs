//! The owned engine facade.
//!
//! One [`Engine`] composes the vector store, the embedding pipeline, and
//! the host catalog handle, constructed eagerly at startup. Dependencies
//! run one way: retrieval reads the store through the engine, never the
//! reverse.
//!
//! A single indexing run is allowed at a time; a global flag rejects
//! concurrent runs. Retrieval calls may run concurrently with each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::catalog::HostCatalog;
use crate::chunk::IndexingMode;
use crate::config::{self, Config, EmbeddingConfig};
use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::index::{self, IndexReport};
use crate::models::{Item, SearchHit, SemanticHit, StoreStats};
use crate::pipeline::EmbeddingPipeline;
use crate::progress::{CancelToken, ProgressReporter};
use crate::search::{self, SearchOptions};
use crate::store::VectorStore;

pub struct Engine {
    config: Config,
    store: VectorStore,
    pipeline: EmbeddingPipeline,
    catalog: Arc<dyn HostCatalog>,
    indexing: AtomicBool,
}

impl Engine {
    /// Open the store at `config.store.path` and build the pipeline from
    /// configuration. The embedding provider itself initializes lazily on
    /// first use.
    pub async fn open(config: Config, catalog: Arc<dyn HostCatalog>) -> Result<Self> {
        config::validate(&config)?;
        let pool = db::connect(&config.store.path).await?;
        Self::from_parts(config, catalog, pool, None).await
    }

    /// Engine over an in-memory store. For tests and ephemeral hosts.
    pub async fn open_in_memory(config: Config, catalog: Arc<dyn HostCatalog>) -> Result<Self> {
        config::validate(&config)?;
        let pool = db::connect_in_memory().await?;
        Self::from_parts(config, catalog, pool, None).await
    }

    /// Engine with a host-supplied embedding provider instead of one built
    /// from configuration.
    pub async fn open_with_provider(
        config: Config,
        catalog: Arc<dyn HostCatalog>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config::validate(&config)?;
        let pool = db::connect(&config.store.path).await?;
        Self::from_parts(config, catalog, pool, Some(provider)).await
    }

    /// In-memory store plus a supplied provider.
    pub async fn open_in_memory_with_provider(
        config: Config,
        catalog: Arc<dyn HostCatalog>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config::validate(&config)?;
        let pool = db::connect_in_memory().await?;
        Self::from_parts(config, catalog, pool, Some(provider)).await
    }

    async fn from_parts(
        config: Config,
        catalog: Arc<dyn HostCatalog>,
        pool: sqlx::SqlitePool,
        provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let store = VectorStore::open(pool).await?;
        let pipeline = match provider {
            Some(provider) => EmbeddingPipeline::with_provider(config.embedding.clone(), provider),
            None => EmbeddingPipeline::new(config.embedding.clone()),
        };
        Ok(Self {
            config,
            store,
            pipeline,
            catalog,
            indexing: AtomicBool::new(false),
        })
    }

    // ============ Indexing ============

    /// Index an explicit set of items in the configured mode. Rejected with
    /// [`Error::IndexingInProgress`] while another run is active.
    pub async fn index(
        &self,
        items: &[Item],
        force: bool,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<IndexReport> {
        if self
            .indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::IndexingInProgress);
        }

        let mode = IndexingMode::parse(&self.config.indexing.mode)
            .unwrap_or(IndexingMode::Abstract);
        let result = index::index_items(
            &self.store,
            &self.pipeline,
            self.catalog.as_ref(),
            &self.config,
            items,
            mode,
            force,
            cancel,
            reporter,
        )
        .await;

        self.indexing.store(false, Ordering::SeqCst);
        result
    }

    /// Index everything the catalog reports for a library.
    pub async fn index_library(
        &self,
        library_id: Option<i64>,
        force: bool,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<IndexReport> {
        let items = self
            .catalog
            .get_library_items(library_id)
            .await
            .map_err(Error::Catalog)?;
        self.index(&items, force, cancel, reporter).await
    }

    /// Index the host's current selection.
    pub async fn index_selected(
        &self,
        force: bool,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<IndexReport> {
        let items = self
            .catalog
            .get_selected_items()
            .await
            .map_err(Error::Catalog)?;
        self.index(&items, force, cancel, reporter).await
    }

    /// Index one collection.
    pub async fn index_collection(
        &self,
        collection_id: i64,
        force: bool,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<IndexReport> {
        let items = self
            .catalog
            .get_collection_items(collection_id)
            .await
            .map_err(Error::Catalog)?;
        self.index(&items, force, cancel, reporter).await
    }

    pub fn is_indexing(&self) -> bool {
        self.indexing.load(Ordering::SeqCst)
    }

    // ============ Retrieval ============

    /// Free-text search in the configured mode (hybrid by default).
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        search::search(
            &self.store,
            &self.pipeline,
            self.catalog.as_ref(),
            &self.config,
            query,
            opts,
        )
        .await
    }

    /// Items most similar to an already-indexed item.
    pub async fn find_similar(
        &self,
        item_id: i64,
        opts: &SearchOptions,
    ) -> Result<Vec<SemanticHit>> {
        search::find_similar(&self.store, &self.config, item_id, opts).await
    }

    // ============ Maintenance ============

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.get_stats().await
    }

    pub async fn is_indexed(&self, item_id: i64) -> Result<bool> {
        self.store.is_indexed(item_id).await
    }

    /// Whether an item would be re-indexed for the given content hash.
    pub async fn needs_reindex(&self, item_id: i64, content_hash: &str) -> Result<bool> {
        self.store.needs_reindex(item_id, content_hash).await
    }

    /// Drop every stored embedding.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Tear down the embedding provider. With a new config, subsequent
    /// embeds use it; with `None`, they re-initialize from the existing
    /// configuration.
    pub async fn reset_pipeline(&self, embedding: Option<EmbeddingConfig>) {
        match embedding {
            Some(config) => self.pipeline.set_config(config).await,
            None => self.pipeline.reset().await,
        }
    }

    /// Direct store access for hosts that need raw rows or metadata.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
