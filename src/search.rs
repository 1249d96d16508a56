//! Retrieval engine: semantic, keyword, and hybrid search.
//!
//! - **Semantic** — cosine scan over the store's normalized cache with
//!   MaxSim aggregation: an item scores the maximum similarity over its
//!   chunks, so a query about evaluation lands on a methods chunk even when
//!   the abstract says nothing about it.
//! - **Keyword** — the host catalog's conjunctive match primitive, rescored
//!   locally by title/date/creator heuristics (the catalog returns ids
//!   relevance-unranked).
//! - **Hybrid** — Reciprocal Rank Fusion of both rankings with a semantic
//!   weight that can be derived from query-shape analysis.
//!
//! Ties on MaxSim and RRF are broken by cache insertion order (which is
//! ordered by `(item_id, chunk_index)`) through stable sorts, making
//! identical queries deterministic.

use log::warn;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use crate::catalog::{HostCatalog, KeywordScope};
use crate::config::Config;
use crate::embedding::{dot, l2_normalize, EmbeddingRole};
use crate::error::{Error, Result};
use crate::models::{CachedChunk, ChunkKind, Item, KeywordHit, SearchHit, SemanticHit};
use crate::pipeline::EmbeddingPipeline;
use crate::store::{CacheSnapshot, VectorStore};

/// Which rankings feed the final list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Hybrid,
    Semantic,
    Keyword,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<SearchMode> {
        match s {
            "hybrid" => Some(SearchMode::Hybrid),
            "semantic" => Some(SearchMode::Semantic),
            "keyword" => Some(SearchMode::Keyword),
            _ => None,
        }
    }
}

/// Per-call overrides; unset fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub min_similarity: Option<f32>,
    pub library_id: Option<i64>,
    pub collection_id: Option<i64>,
    pub exclude_ids: Vec<i64>,
    pub mode: Option<SearchMode>,
    /// Explicit semantic weight; bypasses query analysis.
    pub semantic_weight: Option<f64>,
}

// ============ Semantic search ============

/// Rank items by semantic similarity to a free-text query.
pub async fn semantic_search(
    store: &VectorStore,
    pipeline: &EmbeddingPipeline,
    config: &Config,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<SemanticHit>> {
    let embedding = pipeline.embed(query, EmbeddingRole::Query).await?;
    let query_vec = l2_normalize(&embedding.vector)
        .ok_or_else(|| Error::ProviderTransport("query embedding has zero norm".to_string()))?;

    let exclude: HashSet<i64> = opts.exclude_ids.iter().copied().collect();
    let candidates = candidate_chunks(store, opts.library_id).await?;

    Ok(max_sim_rank(
        std::slice::from_ref(&query_vec),
        candidates.chunks(),
        &exclude,
        opts.min_similarity
            .unwrap_or_else(|| config.search.min_similarity()),
        opts.top_k.unwrap_or(config.search.top_k),
    ))
}

/// Rank items by similarity to an already-indexed item ("more like this").
///
/// Every chunk of the source item acts as a query; a candidate chunk scores
/// the maximum over the source chunks, then items aggregate by MaxSim as in
/// free-text search. The source item is always excluded.
pub async fn find_similar(
    store: &VectorStore,
    config: &Config,
    item_id: i64,
    opts: &SearchOptions,
) -> Result<Vec<SemanticHit>> {
    let source_chunks = store.get_item_chunks(item_id).await?;
    let sources: Vec<Vec<f32>> = source_chunks
        .iter()
        .filter_map(|row| l2_normalize(&row.embedding))
        .collect();
    if sources.is_empty() {
        return Err(Error::NotIndexed(item_id));
    }

    let mut exclude: HashSet<i64> = opts.exclude_ids.iter().copied().collect();
    exclude.insert(item_id);
    let candidates = candidate_chunks(store, opts.library_id).await?;

    Ok(max_sim_rank(
        &sources,
        candidates.chunks(),
        &exclude,
        opts.min_similarity
            .unwrap_or_else(|| config.search.min_similarity()),
        opts.top_k.unwrap_or(config.search.top_k),
    ))
}

enum CandidateSet {
    Cached(Arc<CacheSnapshot>),
    Owned(Vec<CachedChunk>),
}

impl CandidateSet {
    fn chunks(&self) -> &[CachedChunk] {
        match self {
            CandidateSet::Cached(snapshot) => &snapshot.chunks,
            CandidateSet::Owned(chunks) => chunks,
        }
    }
}

/// Global searches go through the store cache; library-scoped searches
/// filter and normalize on the fly without touching the global snapshot.
async fn candidate_chunks(store: &VectorStore, library_id: Option<i64>) -> Result<CandidateSet> {
    match library_id {
        None => Ok(CandidateSet::Cached(store.get_all_cached().await?)),
        Some(library_id) => {
            let rows = store.get_by_library(library_id).await?;
            let chunks = rows
                .into_iter()
                .filter_map(|row| {
                    let vector = l2_normalize(&row.embedding)?;
                    Some(CachedChunk {
                        item_id: row.item_id,
                        chunk_index: row.chunk_index,
                        item_key: row.item_key,
                        title: row.title,
                        kind: ChunkKind::from_source(&row.text_source),
                        vector,
                    })
                })
                .collect();
            Ok(CandidateSet::Owned(chunks))
        }
    }
}

/// MaxSim aggregation over normalized chunks.
///
/// For each chunk the similarity is the maximum dot product over the query
/// vectors (all unit length, so this is cosine similarity); for each item
/// only the best chunk survives. Items below `min_similarity` are dropped;
/// the rest are sorted descending with ties kept in input order.
fn max_sim_rank(
    queries: &[Vec<f32>],
    chunks: &[CachedChunk],
    exclude: &HashSet<i64>,
    min_similarity: f32,
    top_k: usize,
) -> Vec<SemanticHit> {
    let mut hits: Vec<SemanticHit> = Vec::new();
    let mut index_of: HashMap<i64, usize> = HashMap::new();

    for chunk in chunks {
        if exclude.contains(&chunk.item_id) {
            continue;
        }
        let sim = queries
            .iter()
            .filter(|q| q.len() == chunk.vector.len())
            .map(|q| dot(q, &chunk.vector))
            .fold(None::<f32>, |best, s| match best {
                Some(b) if b >= s => Some(b),
                _ => Some(s),
            });
        let Some(sim) = sim else { continue };

        match index_of.get(&chunk.item_id) {
            Some(&i) => {
                if sim > hits[i].similarity {
                    hits[i].similarity = sim;
                    hits[i].chunk_index = chunk.chunk_index;
                    hits[i].kind = chunk.kind;
                }
            }
            None => {
                index_of.insert(chunk.item_id, hits.len());
                hits.push(SemanticHit {
                    item_id: chunk.item_id,
                    item_key: chunk.item_key.clone(),
                    title: chunk.title.clone(),
                    similarity: sim,
                    chunk_index: chunk.chunk_index,
                    kind: chunk.kind,
                });
            }
        }
    }

    hits.retain(|h| h.similarity >= min_similarity);
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k);
    hits
}

// ============ Keyword search ============

/// Ask the host catalog for conjunctive matches and rescore them locally.
pub async fn keyword_search(
    catalog: &dyn HostCatalog,
    config: &Config,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<KeywordHit>> {
    let keyword_top_k = config.search.keyword_top_k;
    let mut scope = KeywordScope {
        library_id: opts.library_id,
        collection_id: opts.collection_id,
        exclude_types: Vec::new(),
    };
    if config.indexing.exclude_books {
        scope.exclude_types.push("book".to_string());
    }

    let ids = catalog
        .keyword_search(query, &scope)
        .await
        .map_err(Error::Catalog)?;

    let exclude: HashSet<i64> = opts.exclude_ids.iter().copied().collect();
    let mut hits = Vec::new();

    for item_id in ids.into_iter().take(2 * keyword_top_k) {
        if exclude.contains(&item_id) {
            continue;
        }
        let item = match catalog.get_item(item_id).await {
            Ok(Some(item)) => item,
            Ok(None) => continue,
            Err(e) => {
                warn!("keyword hydration failed for item {}: {}", item_id, e);
                continue;
            }
        };
        if config.indexing.exclude_books && item.item_type == "book" {
            continue;
        }
        hits.push(KeywordHit {
            item_id,
            score: score_keyword_item(query, &item),
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(keyword_top_k);
    Ok(hits)
}

/// Rescore a conjunctive match. The catalog guarantees the item matched the
/// query somewhere; this estimates how central the match is.
fn score_keyword_item(query: &str, item: &Item) -> f64 {
    let query_lower = query.to_lowercase();
    let title_lower = item.title.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();
    let significant: Vec<&str> = terms.iter().copied().filter(|t| t.len() > 1).collect();

    let mut score = 0.50;

    if !significant.is_empty() {
        let matched = significant
            .iter()
            .filter(|t| title_lower.contains(**t))
            .count();
        score += 0.30 * matched as f64 / significant.len() as f64;
    }

    if !terms.is_empty() && terms.iter().all(|t| title_lower.contains(*t)) {
        score += 0.15;
    }

    if let Some(date) = item.date.as_deref() {
        if YEAR_RE
            .find_iter(query)
            .any(|year| date.contains(year.as_str()))
        {
            score += 0.15;
        }
    }

    for creator in &item.creators {
        let last = creator.last_name.to_lowercase();
        if last.len() >= 3 && query_lower.contains(&last) {
            score += 0.10;
            break;
        }
    }

    score.min(1.0)
}

// ============ Query analysis ============

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year regex"));
static AUTHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\s+(et al\.?|&|and)\b").expect("author regex"));
static ACRONYM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}\b").expect("acronym regex"));
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]+""#).expect("quoted regex"));
static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(what|how|why|when|where|which|who)\b").expect("question regex")
});

/// Phrases that mark a conceptual query. Deliberately small and preserved
/// as-is; extending it is a product decision.
const CONCEPTUAL_PHRASES: [&str; 5] =
    ["related to", "similar to", "about", "regarding", "concerning"];

/// Recommend a semantic weight in `[0.2, 0.8]` from the shape of the query.
///
/// Year, author, acronym, quoting, comparison operators, and very short
/// queries pull toward keyword search; question prefixes, longer conceptual
/// queries, and conceptual cue phrases pull toward semantic search.
pub fn analyze_query(query: &str) -> f64 {
    let mut keyword: f64 = 0.0;
    let mut semantic: f64 = 0.0;

    let has_year = YEAR_RE.is_match(query);
    let has_author = AUTHOR_RE.is_match(query);

    if has_year {
        keyword += 0.15;
    }
    if has_author {
        keyword += 0.20;
    }
    if ACRONYM_RE.is_match(query) {
        keyword += 0.10;
    }
    if QUOTED_RE.is_match(query) {
        keyword += 0.15;
    }
    if query.contains(['<', '>', '=']) {
        keyword += 0.10;
    }

    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.len() <= 2 && tokens.iter().any(|t| t.len() <= 3) {
        keyword += 0.10;
    }

    if QUESTION_RE.is_match(query) {
        semantic += 0.15;
    }
    if tokens.len() >= 4 && !has_year && !has_author {
        semantic += 0.10;
    }
    let query_lower = query.to_lowercase();
    if CONCEPTUAL_PHRASES.iter().any(|p| query_lower.contains(p)) {
        semantic += 0.10;
    }

    (0.5 + semantic - keyword).clamp(0.2, 0.8)
}

// ============ Rank fusion ============

#[derive(Debug, Clone)]
struct Fused {
    item_id: i64,
    rrf_score: f64,
    semantic_rank: Option<usize>,
    keyword_rank: Option<usize>,
}

/// Reciprocal Rank Fusion with 1-based ranks:
/// `score = w_s / (k + semantic_rank) + (1 - w_s) / (k + keyword_rank)`,
/// each term present only when the item appears in that list.
fn fuse_rrf(
    semantic: &[SemanticHit],
    keyword: &[KeywordHit],
    semantic_weight: f64,
    k_rrf: f64,
) -> Vec<Fused> {
    let keyword_weight = 1.0 - semantic_weight;
    let mut fused: Vec<Fused> = Vec::new();
    let mut index_of: HashMap<i64, usize> = HashMap::new();

    for (i, hit) in semantic.iter().enumerate() {
        let rank = i + 1;
        index_of.insert(hit.item_id, fused.len());
        fused.push(Fused {
            item_id: hit.item_id,
            rrf_score: semantic_weight / (k_rrf + rank as f64),
            semantic_rank: Some(rank),
            keyword_rank: None,
        });
    }

    for (i, hit) in keyword.iter().enumerate() {
        let rank = i + 1;
        let contribution = keyword_weight / (k_rrf + rank as f64);
        match index_of.get(&hit.item_id) {
            Some(&idx) => {
                fused[idx].rrf_score += contribution;
                fused[idx].keyword_rank = Some(rank);
            }
            None => {
                index_of.insert(hit.item_id, fused.len());
                fused.push(Fused {
                    item_id: hit.item_id,
                    rrf_score: contribution,
                    semantic_rank: None,
                    keyword_rank: Some(rank),
                });
            }
        }
    }

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

// ============ Top-level search ============

/// Run the configured search mode end to end and hydrate results through
/// the host catalog.
pub async fn search(
    store: &VectorStore,
    pipeline: &EmbeddingPipeline,
    catalog: &dyn HostCatalog,
    config: &Config,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mode = opts
        .mode
        .unwrap_or_else(|| SearchMode::parse(&config.search.mode).unwrap_or(SearchMode::Hybrid));
    let semantic_weight = opts.semantic_weight.unwrap_or_else(|| {
        if config.search.auto_adjust_weights {
            analyze_query(query)
        } else {
            config.search.semantic_weight
        }
    });
    let final_top_k = opts.top_k.unwrap_or(config.search.top_k);

    let semantic = if mode != SearchMode::Keyword {
        semantic_search(store, pipeline, config, query, opts).await?
    } else {
        Vec::new()
    };
    let keyword = if mode != SearchMode::Semantic {
        keyword_search(catalog, config, query, opts).await?
    } else {
        Vec::new()
    };

    let mut fused = match mode {
        SearchMode::Hybrid => fuse_rrf(&semantic, &keyword, semantic_weight, config.search.rrf_k),
        // Single-source modes carry the raw score of their list.
        SearchMode::Semantic => semantic
            .iter()
            .enumerate()
            .map(|(i, hit)| Fused {
                item_id: hit.item_id,
                rrf_score: hit.similarity as f64,
                semantic_rank: Some(i + 1),
                keyword_rank: None,
            })
            .collect(),
        SearchMode::Keyword => keyword
            .iter()
            .enumerate()
            .map(|(i, hit)| Fused {
                item_id: hit.item_id,
                rrf_score: hit.score,
                semantic_rank: None,
                keyword_rank: Some(i + 1),
            })
            .collect(),
    };
    fused.truncate(final_top_k);

    let semantic_by_id: HashMap<i64, &SemanticHit> =
        semantic.iter().map(|h| (h.item_id, h)).collect();
    let keyword_by_id: HashMap<i64, f64> = keyword.iter().map(|h| (h.item_id, h.score)).collect();

    let mut results = Vec::with_capacity(fused.len());
    for f in &fused {
        let semantic_hit = semantic_by_id.get(&f.item_id).copied();

        let mut hit = SearchHit {
            item_id: f.item_id,
            item_key: semantic_hit.map(|h| h.item_key.clone()),
            title: semantic_hit.map(|h| h.title.clone()).unwrap_or_default(),
            creators: None,
            year: None,
            rrf_score: f.rrf_score,
            semantic_rank: f.semantic_rank,
            keyword_rank: f.keyword_rank,
            semantic_similarity: semantic_hit.map(|h| h.similarity),
            keyword_score: keyword_by_id.get(&f.item_id).copied(),
            matched_chunk_index: semantic_hit.map(|h| h.chunk_index),
            matched_section: semantic_hit.map(|h| h.kind),
        };

        // Hydration failures keep the hit with whatever the store knew.
        match catalog.get_item(f.item_id).await {
            Ok(Some(item)) => {
                hit.item_key = Some(item.item_key.clone());
                hit.title = item.title.clone();
                hit.creators = join_creators(&item);
                hit.year = item
                    .date
                    .as_deref()
                    .and_then(|d| YEAR_RE.find(d).map(|m| m.as_str().to_string()));
            }
            Ok(None) => {
                warn!(
                    "item {} vanished from the catalog, keeping stored metadata",
                    f.item_id
                );
            }
            Err(e) => {
                warn!("hydration failed for item {}: {}", f.item_id, e);
            }
        }

        results.push(hit);
    }

    Ok(results)
}

fn join_creators(item: &Item) -> Option<String> {
    if item.creators.is_empty() {
        return None;
    }
    Some(
        item.creators
            .iter()
            .map(|c| c.last_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Creator;

    fn cached(item_id: i64, chunk_index: i64, vector: Vec<f32>) -> CachedChunk {
        CachedChunk {
            item_id,
            chunk_index,
            item_key: format!("KEY{}", item_id),
            title: format!("Title {}", item_id),
            kind: if chunk_index == 0 {
                ChunkKind::Summary
            } else {
                ChunkKind::Content
            },
            vector: l2_normalize(&vector).unwrap(),
        }
    }

    fn sem(item_id: i64, similarity: f32) -> SemanticHit {
        SemanticHit {
            item_id,
            item_key: String::new(),
            title: String::new(),
            similarity,
            chunk_index: 0,
            kind: ChunkKind::Summary,
        }
    }

    fn kw(item_id: i64, score: f64) -> KeywordHit {
        KeywordHit { item_id, score }
    }

    // ---- MaxSim ----

    #[test]
    fn test_maxsim_takes_best_chunk() {
        // Item A has chunks [1,0,0] and [0,1,0]; query [0,1,0] must score
        // 1.0 through chunk 1, not an average.
        let chunks = vec![
            cached(1, 0, vec![1.0, 0.0, 0.0]),
            cached(1, 1, vec![0.0, 1.0, 0.0]),
        ];
        let query = l2_normalize(&[0.0, 1.0, 0.0]).unwrap();
        let hits = max_sim_rank(&[query], &chunks, &HashSet::new(), 0.0, 20);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(hits[0].chunk_index, 1);
    }

    #[test]
    fn test_maxsim_multiple_sources() {
        let chunks = vec![cached(2, 0, vec![0.0, 1.0, 0.0])];
        let sources = vec![
            l2_normalize(&[1.0, 0.0, 0.0]).unwrap(),
            l2_normalize(&[0.0, 1.0, 0.0]).unwrap(),
        ];
        let hits = max_sim_rank(&sources, &chunks, &HashSet::new(), 0.0, 20);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_maxsim_threshold_and_top_k() {
        let chunks = vec![
            cached(1, 0, vec![1.0, 0.0]),
            cached(2, 0, vec![0.9, 0.1]),
            cached(3, 0, vec![0.0, 1.0]),
        ];
        let query = l2_normalize(&[1.0, 0.0]).unwrap();
        let hits = max_sim_rank(&[query.clone()], &chunks, &HashSet::new(), 0.3, 20);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item_id, 1);

        let hits = max_sim_rank(&[query], &chunks, &HashSet::new(), 0.0, 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_maxsim_excludes_items() {
        let chunks = vec![cached(1, 0, vec![1.0, 0.0]), cached(2, 0, vec![1.0, 0.0])];
        let query = l2_normalize(&[1.0, 0.0]).unwrap();
        let exclude: HashSet<i64> = [1].into_iter().collect();
        let hits = max_sim_rank(&[query], &chunks, &exclude, 0.0, 20);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id, 2);
    }

    #[test]
    fn test_maxsim_ties_keep_cache_order() {
        let chunks = vec![cached(7, 0, vec![1.0, 0.0]), cached(3, 0, vec![1.0, 0.0])];
        let query = l2_normalize(&[1.0, 0.0]).unwrap();
        let hits = max_sim_rank(&[query], &chunks, &HashSet::new(), 0.0, 20);
        assert_eq!(hits[0].item_id, 7);
        assert_eq!(hits[1].item_id, 3);
    }

    #[test]
    fn test_maxsim_skips_mismatched_dimensions() {
        let chunks = vec![
            cached(1, 0, vec![1.0, 0.0, 0.0]),
            cached(2, 0, vec![1.0, 0.0]),
        ];
        let query = l2_normalize(&[1.0, 0.0, 0.0]).unwrap();
        let hits = max_sim_rank(&[query], &chunks, &HashSet::new(), 0.0, 20);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id, 1);
    }

    // ---- RRF ----

    #[test]
    fn test_rrf_fusion_ordering() {
        // Semantic ranking [X, Y, Z], keyword ranking [Y, W, X].
        let (x, y, z, w) = (1, 2, 3, 4);
        let semantic = vec![sem(x, 0.9), sem(y, 0.8), sem(z, 0.7)];
        let keyword = vec![kw(y, 0.9), kw(w, 0.8), kw(x, 0.7)];

        let fused = fuse_rrf(&semantic, &keyword, 0.5, 60.0);
        let order: Vec<i64> = fused.iter().map(|f| f.item_id).collect();
        assert_eq!(order, vec![y, x, w, z]);

        let by_id: HashMap<i64, &Fused> = fused.iter().map(|f| (f.item_id, f)).collect();
        assert!((by_id[&y].rrf_score - (0.5 / 62.0 + 0.5 / 61.0)).abs() < 1e-12);
        assert!((by_id[&x].rrf_score - (0.5 / 61.0 + 0.5 / 63.0)).abs() < 1e-12);
        assert!((by_id[&z].rrf_score - 0.5 / 63.0).abs() < 1e-12);
        assert!((by_id[&w].rrf_score - 0.5 / 62.0).abs() < 1e-12);
        assert_eq!(by_id[&y].semantic_rank, Some(2));
        assert_eq!(by_id[&y].keyword_rank, Some(1));
    }

    #[test]
    fn test_rrf_monotone_in_rank() {
        // Moving an item up in either list strictly increases its score.
        let base = fuse_rrf(&[sem(1, 0.5), sem(2, 0.4)], &[], 0.5, 60.0);
        let better = fuse_rrf(&[sem(2, 0.5), sem(1, 0.4)], &[], 0.5, 60.0);
        let base_score = base.iter().find(|f| f.item_id == 2).unwrap().rrf_score;
        let better_score = better.iter().find(|f| f.item_id == 2).unwrap().rrf_score;
        assert!(better_score > base_score);
    }

    #[test]
    fn test_rrf_weights_shift_ranking() {
        let semantic = vec![sem(1, 0.9)];
        let keyword = vec![kw(2, 0.9)];
        let semantic_heavy = fuse_rrf(&semantic, &keyword, 0.8, 60.0);
        assert_eq!(semantic_heavy[0].item_id, 1);
        let keyword_heavy = fuse_rrf(&semantic, &keyword, 0.2, 60.0);
        assert_eq!(keyword_heavy[0].item_id, 2);
    }

    // ---- Keyword rescoring ----

    fn item(title: &str, date: Option<&str>, creators: &[&str]) -> Item {
        Item {
            item_id: 1,
            item_key: "KEY".to_string(),
            library_id: 1,
            title: title.to_string(),
            abstract_text: None,
            creators: creators
                .iter()
                .map(|last| Creator {
                    first_name: None,
                    last_name: last.to_string(),
                })
                .collect(),
            date: date.map(|d| d.to_string()),
            item_type: "journalArticle".to_string(),
        }
    }

    #[test]
    fn test_keyword_score_base() {
        let score = score_keyword_item("quantum", &item("Completely unrelated", None, &[]));
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_score_full_title_match() {
        let score = score_keyword_item("deep learning", &item("Deep Learning Review", None, &[]));
        // 0.5 + 0.30 (both terms) + 0.15 (all terms in title)
        assert!((score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_score_year_and_creator() {
        let score = score_keyword_item(
            "smith 2021 transformers",
            &item(
                "Transformers at scale",
                Some("2021-03-01"),
                &["Smith", "Jones"],
            ),
        );
        // 0.5 + 0.30 × (1/3) + 0.15 (year) + 0.10 (creator)
        assert!((score - (0.5 + 0.1 + 0.15 + 0.10)).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_score_clamped() {
        let score = score_keyword_item(
            "attention 2017 vaswani",
            &item(
                "Attention 2017 vaswani attention",
                Some("2017"),
                &["Vaswani"],
            ),
        );
        assert!(score <= 1.0);
    }

    #[test]
    fn test_keyword_score_ignores_short_creator_names() {
        let score = score_keyword_item("ng on learning", &item("Unrelated", None, &["Ng"]));
        assert!((score - 0.5).abs() < 1e-9);
    }

    // ---- Query analysis ----

    #[test]
    fn test_analysis_citation_style_query() {
        // Author (+0.20), year (+0.15), acronym (+0.10) → 0.5 − 0.45,
        // clamped to the floor.
        let weight = analyze_query("Smith et al. 2021 RLHF");
        assert!((weight - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_analysis_conceptual_question() {
        // Question (+0.15) and ≥4 tokens without year/author (+0.10);
        // "relate to" is not in the cue-phrase list.
        let weight = analyze_query("how does contrastive learning relate to mutual information");
        assert!((weight - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_analysis_neutral_query() {
        let weight = analyze_query("transformer interpretability");
        assert!((weight - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_analysis_quoted_phrase_leans_keyword() {
        let weight = analyze_query("\"exact phrase\" in context retrieval");
        assert!(weight < 0.5);
    }

    #[test]
    fn test_analysis_short_query_leans_keyword() {
        let weight = analyze_query("BERT ner");
        // Acronym (+0.10) and short query (+0.10).
        assert!((weight - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_analysis_conceptual_phrase() {
        let weight = analyze_query("papers related to sparse autoencoders");
        // ≥4 tokens (+0.10) and cue phrase (+0.10).
        assert!((weight - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_analysis_stays_in_bounds() {
        for query in [
            "Smith et al. 2021 RLHF \"quoted\" x <= y",
            "how and why does something about everything regarding anything relate",
            "",
            "a",
        ] {
            let weight = analyze_query(query);
            assert!(
                (0.2..=0.8).contains(&weight),
                "weight {} for {:?}",
                weight,
                query
            );
        }
    }
}
