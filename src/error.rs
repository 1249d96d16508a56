//! Error taxonomy for the retrieval core.
//!
//! Single-item paths propagate these errors; batch-oriented paths (indexing,
//! batch embedding, metadata hydration) log and continue. See the policy
//! notes on the individual variants.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or contradictory configuration (e.g. no API key for an HTTP
    /// provider). Fatal for that provider. Also covers a failed lazy
    /// provider init, which leaves the pipeline not-ready.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP non-2xx, malformed response body, or a failed model call.
    #[error("embedding provider error: {0}")]
    ProviderTransport(String),

    /// A single embed call exceeded the configured deadline. The pipeline
    /// remains usable afterwards.
    #[error("embedding timed out after {0}s")]
    EmbeddingTimeout(u64),

    /// SQL execution failure. Committed batches are never rolled back.
    #[error("store error: {0}")]
    StoreIo(#[from] sqlx::Error),

    /// A persisted vector failed to decode or has the wrong dimension.
    /// Readers treat the row as absent.
    #[error("corrupt stored vector for item {item_id} chunk {chunk_index}")]
    CorruptVector { item_id: i64, chunk_index: i64 },

    /// Item-by-example was asked for an item with no usable chunks.
    #[error("item {0} has no indexed chunks")]
    NotIndexed(i64),

    /// A second indexing run was requested while one is active.
    #[error("an indexing run is already in progress")]
    IndexingInProgress,

    /// Cooperative cancellation fired. Returned by the batch embedder when
    /// its token fires; the indexer, having requested the cancellation,
    /// converts it into a non-error run report.
    #[error("operation cancelled")]
    Cancelled,

    /// The host catalog failed. Host errors are arbitrary, so they are
    /// carried as-is.
    #[error("host catalog error: {0}")]
    Catalog(#[source] anyhow::Error),
}
