//! # refseek
//!
//! **Semantic retrieval core for a personal reference library.**
//!
//! refseek turns the bibliographic items of a host reference manager into
//! dense vector embeddings of semantically meaningful chunks, persists them
//! in SQLite with an in-memory normalized cache, and answers free-text and
//! item-by-example queries with MaxSim cosine ranking, optionally fused
//! with a keyword ranking via Reciprocal Rank Fusion.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │ Host Catalog │──▶│   Indexer     │──▶│  SQLite    │
//! │ items + text │   │ Chunk + Embed │   │ + vec cache│
//! └──────┬───────┘   └───────────────┘   └─────┬─────┘
//!        │                                     │
//!        │  keyword ids      ┌─────────────────┘
//!        ▼                   ▼
//!   ┌─────────────────────────────┐
//!   │      Retrieval engine       │
//!   │ MaxSim · rescoring · RRF    │
//!   └─────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The host catalog ([`catalog`]) yields [`models::Item`]s and extracted
//!    full text.
//! 2. The chunker ([`chunk`]) produces a summary chunk plus section-aware
//!    body chunks under a token budget.
//! 3. The pipeline ([`pipeline`]) embeds chunk texts through the configured
//!    provider ([`embedding`]), batching with progress and yields.
//! 4. The store ([`store`]) persists one row per chunk and serves a
//!    five-minute L2-normalized snapshot to the scan.
//! 5. The retrieval engine ([`search`]) ranks by MaxSim cosine, rescores
//!    the catalog's keyword matches, and fuses both rankings.
//! 6. The engine facade ([`engine`]) owns all of the above and guards
//!    single-flight indexing.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types: `Item`, `Chunk`, `StoredEmbedding`, results |
//! | [`catalog`] | Host catalog trait (items, full text, keyword matching) |
//! | [`chunk`] | Section-aware title-prefixed chunker |
//! | [`embedding`] | Provider trait, HTTP/local providers, vector math |
//! | [`pipeline`] | Provider lifecycle, batching, timeouts |
//! | [`store`] | Durable rows + normalized read-through cache |
//! | [`search`] | MaxSim, keyword rescoring, RRF, query analysis |
//! | [`index`] | Indexing orchestration with cooperative cancellation |
//! | [`progress`] | Progress reporters and cooperative cancellation |
//! | [`engine`] | Owned facade composing the subsystems |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use refseek::{CancelToken, Config, Engine, HostCatalog, NoProgress, SearchOptions};
//! # async fn run(catalog: Arc<dyn HostCatalog>) -> refseek::Result<()> {
//! let engine = Engine::open(Config::default(), catalog).await?;
//! engine.index_library(None, false, &CancelToken::new(), &NoProgress).await?;
//! let hits = engine.search("how was the model evaluated", &SearchOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod store;

pub use catalog::{HostCatalog, KeywordScope};
pub use chunk::{chunk_item, estimate_tokens, ChunkOptions, IndexingMode};
pub use config::{load_config, Config, EmbeddingConfig, IndexingConfig, SearchConfig, StoreConfig};
pub use embedding::{Embedding, EmbeddingProvider, EmbeddingRole};
pub use engine::Engine;
pub use error::{Error, Result};
pub use index::IndexReport;
pub use models::{
    CachedChunk, Chunk, ChunkKind, Creator, Item, KeywordHit, SearchHit, SemanticHit,
    StoreStats, StoredEmbedding,
};
pub use pipeline::EmbeddingPipeline;
pub use progress::{
    CancelToken, JsonProgress, NoProgress, ProgressEvent, ProgressReporter, StderrProgress,
};
pub use search::{analyze_query, SearchMode, SearchOptions};
pub use store::{VectorStore, SCHEMA_VERSION};
