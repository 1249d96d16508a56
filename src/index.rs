//! Indexing orchestration.
//!
//! Coordinates the full flow for a set of items: chunk → content-hash →
//! batch-embed → transactional replace in the store. Runs cooperatively:
//! the loop yields to the host event loop every few items, polls the
//! cancellation token between items and between embedding calls (the batch
//! embedder checks it before every call), and commits in item batches so
//! that on cancellation everything already committed stays durable and no
//! further item is touched.

use log::{info, warn};
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::catalog::HostCatalog;
use crate::chunk::{chunk_item, ChunkOptions, IndexingMode};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Chunk, Item, StoredEmbedding};
use crate::pipeline::EmbeddingPipeline;
use crate::progress::{CancelToken, ProgressEvent, ProgressReporter};
use crate::store::VectorStore;

/// Items per commit batch; also the yield cadence of the chunking loop.
const ITEM_BATCH: usize = 8;

/// Summary of one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub items_indexed: usize,
    /// Unchanged (hash match), excluded by type, or empty items.
    pub items_skipped: usize,
    pub chunks_written: usize,
    /// Chunks whose embedding failed and were left out of the store.
    pub embeddings_failed: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

struct PendingItem {
    item: Item,
    chunks: Vec<Chunk>,
    content_hash: String,
}

/// Index a set of items.
///
/// With `force` unset, items whose content hash matches the store are
/// skipped. Cancellation is polled between items and between embedding
/// calls; everything committed up to that point remains and no further
/// item is touched.
#[allow(clippy::too_many_arguments)]
pub async fn index_items(
    store: &VectorStore,
    pipeline: &EmbeddingPipeline,
    catalog: &dyn HostCatalog,
    config: &Config,
    items: &[Item],
    mode: IndexingMode,
    force: bool,
    cancel: &CancelToken,
    reporter: &dyn ProgressReporter,
) -> Result<IndexReport> {
    let started = Instant::now();
    let mut report = IndexReport::default();

    // Fail fast when the provider cannot initialize.
    let provider = pipeline.ensure_ready().await?;
    let model_id = provider.model_id().to_string();

    let options = ChunkOptions {
        max_tokens: config.indexing.max_tokens,
        max_chunks: config.indexing.max_chunks_per_paper,
    };

    // Phase 1: chunk everything, deciding per item whether work is needed.
    let mut pending: Vec<PendingItem> = Vec::new();
    let total_items = items.len() as u64;

    for (i, item) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        if config.indexing.exclude_books && item.item_type == "book" {
            report.items_skipped += 1;
            continue;
        }

        let fulltext = if mode == IndexingMode::Full {
            match catalog.get_full_text(item.item_id).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "full text unavailable for item {}, indexing summary only: {}",
                        item.item_id, e
                    );
                    None
                }
            }
        } else {
            None
        };

        let chunks = chunk_item(
            &item.title,
            item.abstract_text.as_deref(),
            fulltext.as_deref(),
            mode,
            &options,
        );
        let content_hash = content_hash(&chunks);

        if !force && !store.needs_reindex(item.item_id, &content_hash).await? {
            report.items_skipped += 1;
            continue;
        }

        pending.push(PendingItem {
            item: item.clone(),
            chunks,
            content_hash,
        });

        if (i + 1) % ITEM_BATCH == 0 {
            reporter.report(ProgressEvent::Chunking {
                n: (i + 1) as u64,
                total: total_items,
            });
            tokio::task::yield_now().await;
        }
    }
    reporter.report(ProgressEvent::Chunking {
        n: total_items,
        total: total_items,
    });

    // Phase 2: embed and commit, one batch of items at a time. Each commit
    // replaces every chunk of its items inside one transaction.
    let indexed_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

    for batch in pending.chunks(ITEM_BATCH) {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let texts: Vec<((i64, i64), String)> = batch
            .iter()
            .flat_map(|p| {
                p.chunks
                    .iter()
                    .map(|c| ((p.item.item_id, c.index as i64), c.text.clone()))
            })
            .collect();

        // The batch embedder polls the token before every embedding call.
        // Requested cancellation is a non-error termination: the current
        // batch is abandoned uncommitted, earlier commits remain.
        let embeddings = match pipeline.embed_batch(&texts, cancel, reporter).await {
            Ok(embeddings) => embeddings,
            Err(Error::Cancelled) => {
                report.cancelled = true;
                break;
            }
            Err(e) => return Err(e),
        };

        let mut item_ids = Vec::with_capacity(batch.len());
        let mut rows: Vec<StoredEmbedding> = Vec::new();

        for p in batch {
            item_ids.push(p.item.item_id);
            for chunk in &p.chunks {
                let Some(embedding) = embeddings.get(&(p.item.item_id, chunk.index as i64)) else {
                    report.embeddings_failed += 1;
                    continue;
                };
                rows.push(StoredEmbedding {
                    item_id: p.item.item_id,
                    chunk_index: chunk.index as i64,
                    item_key: p.item.item_key.clone(),
                    library_id: p.item.library_id,
                    title: p.item.title.clone(),
                    abstract_text: p.item.abstract_text.clone(),
                    chunk_text: Some(chunk.text.clone()),
                    text_source: chunk.kind.as_str().to_string(),
                    embedding: embedding.vector.clone(),
                    model_id: model_id.clone(),
                    indexed_at: indexed_at.clone(),
                    content_hash: p.content_hash.clone(),
                });
            }
        }

        report.chunks_written += rows.len();
        report.items_indexed += item_ids.len();
        store.replace_items(&item_ids, &rows).await?;
        reporter.report(ProgressEvent::Committed {
            items: report.items_indexed as u64,
        });
    }

    report.duration_ms = started.elapsed().as_millis() as u64;

    store
        .set_metadata("indexing_mode", &serde_json::json!(mode.as_str()))
        .await?;
    store
        .set_metadata(
            "last_index_duration_ms",
            &serde_json::json!(report.duration_ms),
        )
        .await?;

    info!(
        "indexed {} items ({} skipped, {} chunks, {} embedding failures{}) in {} ms",
        report.items_indexed,
        report.items_skipped,
        report.chunks_written,
        report.embeddings_failed,
        if report.cancelled { ", cancelled" } else { "" },
        report.duration_ms
    );

    Ok(report)
}

/// Change-detection digest over the concatenated chunk texts: SHA-256
/// truncated to 16 hex chars. Identical for every chunk of an item within
/// one run.
pub fn content_hash(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.text.as_bytes());
    }
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            index: 0,
            kind: ChunkKind::Summary,
            text: text.to_string(),
            estimated_tokens: 0,
        }
    }

    #[test]
    fn test_content_hash_is_stable() {
        let chunks = vec![chunk("alpha"), chunk("beta")];
        assert_eq!(content_hash(&chunks), content_hash(&chunks));
        assert_eq!(content_hash(&chunks).len(), 16);
    }

    #[test]
    fn test_content_hash_tracks_text() {
        let a = content_hash(&[chunk("alpha")]);
        let b = content_hash(&[chunk("beta")]);
        assert_ne!(a, b);
    }
}
