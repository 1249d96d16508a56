//! Core data types flowing through the indexing and retrieval pipeline.

use serde::Serialize;

/// A contributor to a bibliographic item.
#[derive(Debug, Clone, Default)]
pub struct Creator {
    pub first_name: Option<String>,
    pub last_name: String,
}

/// Bibliographic item as described by the host catalog.
///
/// Items are externally owned; the core never writes them back. `item_id` is
/// the stable integer key, `item_key` an opaque host-side string.
#[derive(Debug, Clone, Default)]
pub struct Item {
    pub item_id: i64,
    pub item_key: String,
    pub library_id: i64,
    pub title: String,
    pub abstract_text: Option<String>,
    pub creators: Vec<Creator>,
    /// Free-form date string from the host (usually contains a year).
    pub date: Option<String>,
    pub item_type: String,
}

/// Semantic role of a chunk within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Title plus abstract (or title alone). Always chunk 0.
    Summary,
    /// Text before the findings-style section boundary.
    Methods,
    /// Text from the findings-style section boundary onward.
    Findings,
    /// Whole-body text when no section boundary was found.
    Content,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Summary => "summary",
            ChunkKind::Methods => "methods",
            ChunkKind::Findings => "findings",
            ChunkKind::Content => "content",
        }
    }

    /// Map a stored `text_source` value to a kind. Legacy rows may carry
    /// `fulltext` or `hybrid`; both behave as content. The stored string is
    /// preserved as-is, only its interpretation is mapped.
    pub fn from_source(source: &str) -> ChunkKind {
        match source {
            "summary" => ChunkKind::Summary,
            "methods" => ChunkKind::Methods,
            "findings" => ChunkKind::Findings,
            _ => ChunkKind::Content,
        }
    }
}

/// A bounded-size text unit prepared for embedding.
///
/// `text` always starts with the (possibly truncated) item title, a blank
/// line, then the chunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position within the item; 0 is always the summary.
    pub index: usize,
    pub kind: ChunkKind,
    pub text: String,
    pub estimated_tokens: usize,
}

/// Persisted per-chunk row. Primary key is `(item_id, chunk_index)`.
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub item_id: i64,
    pub chunk_index: i64,
    pub item_key: String,
    pub library_id: i64,
    pub title: String,
    pub abstract_text: Option<String>,
    pub chunk_text: Option<String>,
    /// Chunk kind as stored; legacy values are preserved verbatim.
    pub text_source: String,
    pub embedding: Vec<f32>,
    pub model_id: String,
    /// ISO 8601 timestamp of the indexing run.
    pub indexed_at: String,
    /// Change-detection digest; identical for every chunk of the same item
    /// within one run.
    pub content_hash: String,
}

/// In-memory cache entry derived from a [`StoredEmbedding`].
///
/// The vector is L2-normalized, so a dot product against another cached
/// vector (or a normalized query) is a cosine similarity.
#[derive(Debug, Clone)]
pub struct CachedChunk {
    pub item_id: i64,
    pub chunk_index: i64,
    pub item_key: String,
    pub title: String,
    pub kind: ChunkKind,
    pub vector: Vec<f32>,
}

/// Per-item result of a semantic (MaxSim) scan.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub item_id: i64,
    pub item_key: String,
    pub title: String,
    /// Maximum cosine similarity over the item's chunks.
    pub similarity: f32,
    /// Chunk that produced the maximum.
    pub chunk_index: i64,
    pub kind: ChunkKind,
}

/// Per-item result of the keyword rescoring pass.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub item_id: i64,
    pub score: f64,
}

/// Final fused result returned to the host.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub item_id: i64,
    pub item_key: Option<String>,
    pub title: String,
    pub creators: Option<String>,
    pub year: Option<String>,
    /// Fused score; in pure-semantic or pure-keyword mode this is the raw
    /// score of the single source list.
    pub rrf_score: f64,
    pub semantic_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
    pub semantic_similarity: Option<f32>,
    pub keyword_score: Option<f64>,
    /// Best-matching chunk, when the item appeared in the semantic list.
    pub matched_chunk_index: Option<i64>,
    pub matched_section: Option<ChunkKind>,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub indexed_items: i64,
    pub total_chunks: i64,
    pub avg_chunks_per_item: f64,
    pub model_id: Option<String>,
    pub last_indexed_at: Option<String>,
    pub storage_bytes_estimate: u64,
}
