//! Durable vector store with a normalized in-memory cache.
//!
//! One row per chunk, keyed by `(item_id, chunk_index)`. Vectors are stored
//! as a JSON array of floats in the `embedding` column for compatibility
//! with earlier schema generations. A sibling `metadata` table holds
//! JSON-encoded key/value pairs (`schema_version`, `indexing_mode`, …).
//!
//! Reads for retrieval go through [`VectorStore::get_all_cached`]: every row
//! is materialized once into an L2-normalized snapshot that is reused for
//! five minutes and invalidated by every write path. The snapshot pointer is
//! swapped atomically, so a reader observes either the old or the new
//! snapshot, never a partial one.
//!
//! Rows whose vector fails to decode, is empty, or has the wrong dimension
//! are logged and skipped by the cache builder; retrieval treats them as
//! absent.

use log::{debug, warn};
use sqlx::{Row, SqlitePool};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::embedding::{decode_vector, encode_vector, l2_normalize};
use crate::error::{Error, Result};
use crate::models::{CachedChunk, ChunkKind, StoredEmbedding, StoreStats};

/// Current schema generation. Generation 1 had no `chunk_index` column;
/// migrating from it is out of scope.
pub const SCHEMA_VERSION: i64 = 2;

/// How long a cache snapshot is served before it is rebuilt.
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Immutable, L2-normalized view of the store, ordered by
/// `(item_id, chunk_index)`.
pub struct CacheSnapshot {
    pub chunks: Vec<CachedChunk>,
    built_at: Instant,
}

impl CacheSnapshot {
    fn is_fresh(&self) -> bool {
        self.built_at.elapsed() < CACHE_TTL
    }
}

pub struct VectorStore {
    pool: SqlitePool,
    cache: Mutex<Option<Arc<CacheSnapshot>>>,
}

const UPSERT_SQL: &str = r#"
INSERT INTO embeddings (item_id, chunk_index, item_key, library_id, title, abstract,
                        chunk_text, text_source, embedding, model_id, indexed_at, content_hash)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(item_id, chunk_index) DO UPDATE SET
    item_key = excluded.item_key,
    library_id = excluded.library_id,
    title = excluded.title,
    abstract = excluded.abstract,
    chunk_text = excluded.chunk_text,
    text_source = excluded.text_source,
    embedding = excluded.embedding,
    model_id = excluded.model_id,
    indexed_at = excluded.indexed_at,
    content_hash = excluded.content_hash
"#;

impl VectorStore {
    /// Wrap a pool and ensure the schema exists.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        let store = Self {
            pool,
            cache: Mutex::new(None),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                item_id INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                item_key TEXT NOT NULL,
                library_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                abstract TEXT,
                chunk_text TEXT,
                text_source TEXT NOT NULL,
                embedding TEXT NOT NULL,
                model_id TEXT NOT NULL,
                indexed_at TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                PRIMARY KEY (item_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_item_id ON embeddings(item_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_embeddings_library_id ON embeddings(library_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_embeddings_content_hash ON embeddings(content_hash)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?)")
            .bind(SCHEMA_VERSION.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ============ Writes ============

    /// UPSERT one row.
    pub async fn put(&self, row: &StoredEmbedding) -> Result<()> {
        bind_row(row).execute(&self.pool).await?;
        self.invalidate_cache();
        Ok(())
    }

    /// UPSERT many rows inside a single transaction.
    pub async fn put_batch(&self, rows: &[StoredEmbedding]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            bind_row(row).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        self.invalidate_cache();
        Ok(())
    }

    /// Atomically replace every chunk of the given items with `rows`: one
    /// transaction containing the delete-then-insert sequence, so an item is
    /// never left partially replaced.
    pub async fn replace_items(&self, item_ids: &[i64], rows: &[StoredEmbedding]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item_id in item_ids {
            sqlx::query("DELETE FROM embeddings WHERE item_id = ?")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }
        for row in rows {
            bind_row(row).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        self.invalidate_cache();
        Ok(())
    }

    /// Remove all chunks of one item.
    pub async fn delete_item_chunks(&self, item_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE item_id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        self.invalidate_cache();
        Ok(())
    }

    /// Drop every row.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM embeddings")
            .execute(&self.pool)
            .await?;
        self.invalidate_cache();
        Ok(())
    }

    // ============ Reads ============

    /// One row for the item: chunk 0 when present, otherwise any chunk,
    /// otherwise `None`.
    pub async fn get(&self, item_id: i64) -> Result<Option<StoredEmbedding>> {
        let row = sqlx::query(
            "SELECT * FROM embeddings WHERE item_id = ? ORDER BY chunk_index ASC LIMIT 1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_stored))
    }

    /// All chunks of one item, ordered by `chunk_index`.
    pub async fn get_item_chunks(&self, item_id: i64) -> Result<Vec<StoredEmbedding>> {
        let rows = sqlx::query("SELECT * FROM embeddings WHERE item_id = ? ORDER BY chunk_index")
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_stored).collect())
    }

    /// Every row, ordered by `(item_id, chunk_index)`.
    pub async fn get_all(&self) -> Result<Vec<StoredEmbedding>> {
        let rows = sqlx::query("SELECT * FROM embeddings ORDER BY item_id, chunk_index")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_stored).collect())
    }

    /// Rows of one library, ordered by `(item_id, chunk_index)`.
    pub async fn get_by_library(&self, library_id: i64) -> Result<Vec<StoredEmbedding>> {
        let rows =
            sqlx::query("SELECT * FROM embeddings WHERE library_id = ? ORDER BY item_id, chunk_index")
                .bind(library_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(row_to_stored).collect())
    }

    pub async fn is_indexed(&self, item_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE item_id = ?")
            .bind(item_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// True iff the item has no rows or its stored hash differs. Every chunk
    /// of an item carries the same hash, so one row is enough.
    pub async fn needs_reindex(&self, item_id: i64, content_hash: &str) -> Result<bool> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM embeddings WHERE item_id = ? LIMIT 1")
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(stored.as_deref() != Some(content_hash))
    }

    pub async fn get_stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT item_id) AS items, COUNT(*) AS chunks FROM embeddings",
        )
        .fetch_one(&self.pool)
        .await?;
        let indexed_items: i64 = row.get("items");
        let total_chunks: i64 = row.get("chunks");

        let model_id: Option<String> = sqlx::query_scalar("SELECT model_id FROM embeddings LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        let last_indexed_at: Option<String> =
            sqlx::query_scalar("SELECT MAX(indexed_at) FROM embeddings")
                .fetch_one(&self.pool)
                .await?;

        let storage_bytes: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(LENGTH(embedding) + LENGTH(COALESCE(chunk_text, '')) + LENGTH(title)), 0) FROM embeddings",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            indexed_items,
            total_chunks,
            avg_chunks_per_item: if indexed_items > 0 {
                total_chunks as f64 / indexed_items as f64
            } else {
                0.0
            },
            model_id,
            last_indexed_at,
            storage_bytes_estimate: storage_bytes.max(0) as u64,
        })
    }

    // ============ Metadata ============

    pub async fn get_metadata(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.and_then(|v| match serde_json::from_str(&v) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("unreadable metadata value for '{}': {}", key, e);
                None
            }
        }))
    }

    pub async fn set_metadata(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metadata (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ============ Normalized cache ============

    /// The normalized snapshot, rebuilt when absent or older than five
    /// minutes.
    pub async fn get_all_cached(&self) -> Result<Arc<CacheSnapshot>> {
        {
            let guard = self.cache.lock().expect("cache lock");
            if let Some(snapshot) = guard.as_ref() {
                if snapshot.is_fresh() {
                    return Ok(Arc::clone(snapshot));
                }
            }
        }

        let snapshot = Arc::new(self.build_cache().await?);
        let mut guard = self.cache.lock().expect("cache lock");
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop the snapshot. Called by every write path.
    pub fn invalidate_cache(&self) {
        let mut guard = self.cache.lock().expect("cache lock");
        *guard = None;
    }

    async fn build_cache(&self) -> Result<CacheSnapshot> {
        let rows = sqlx::query(
            "SELECT item_id, chunk_index, item_key, title, text_source, embedding
             FROM embeddings ORDER BY item_id, chunk_index",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        let mut expected_dims: Option<usize> = None;

        for row in &rows {
            let item_id: i64 = row.get("item_id");
            let chunk_index: i64 = row.get("chunk_index");
            let encoded: String = row.get("embedding");

            let normalized =
                match normalize_stored_vector(item_id, chunk_index, &encoded, expected_dims) {
                    Ok(vector) => vector,
                    Err(e) => {
                        warn!("{}; treating row as absent", e);
                        continue;
                    }
                };
            if expected_dims.is_none() {
                expected_dims = Some(normalized.len());
            }

            let text_source: String = row.get("text_source");
            chunks.push(CachedChunk {
                item_id,
                chunk_index,
                item_key: row.get("item_key"),
                title: row.get("title"),
                kind: ChunkKind::from_source(&text_source),
                vector: normalized,
            });
        }

        debug!("rebuilt embedding cache: {} chunks", chunks.len());
        Ok(CacheSnapshot {
            chunks,
            built_at: Instant::now(),
        })
    }
}

/// Decode and L2-normalize one stored vector. Undecodable, empty, zero-norm,
/// or wrong-dimension vectors are a [`Error::CorruptVector`]; the cache
/// builder logs it once per row and treats the row as absent.
fn normalize_stored_vector(
    item_id: i64,
    chunk_index: i64,
    encoded: &str,
    expected_dims: Option<usize>,
) -> Result<Vec<f32>> {
    let corrupt = || Error::CorruptVector {
        item_id,
        chunk_index,
    };

    let vector = decode_vector(encoded)
        .filter(|v| !v.is_empty())
        .ok_or_else(corrupt)?;
    if expected_dims.is_some_and(|dims| vector.len() != dims) {
        return Err(corrupt());
    }
    l2_normalize(&vector).ok_or_else(corrupt)
}

fn bind_row(
    row: &StoredEmbedding,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(UPSERT_SQL)
        .bind(row.item_id)
        .bind(row.chunk_index)
        .bind(&row.item_key)
        .bind(row.library_id)
        .bind(&row.title)
        .bind(&row.abstract_text)
        .bind(&row.chunk_text)
        .bind(&row.text_source)
        .bind(encode_vector(&row.embedding))
        .bind(&row.model_id)
        .bind(&row.indexed_at)
        .bind(&row.content_hash)
}

fn row_to_stored(row: &sqlx::sqlite::SqliteRow) -> StoredEmbedding {
    let encoded: String = row.get("embedding");
    StoredEmbedding {
        item_id: row.get("item_id"),
        chunk_index: row.get("chunk_index"),
        item_key: row.get("item_key"),
        library_id: row.get("library_id"),
        title: row.get("title"),
        abstract_text: row.get("abstract"),
        chunk_text: row.get("chunk_text"),
        text_source: row.get("text_source"),
        // Undecodable vectors surface as empty and are treated as absent.
        embedding: decode_vector(&encoded).unwrap_or_default(),
        model_id: row.get("model_id"),
        indexed_at: row.get("indexed_at"),
        content_hash: row.get("content_hash"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn make_row(item_id: i64, chunk_index: i64, vector: Vec<f32>) -> StoredEmbedding {
        StoredEmbedding {
            item_id,
            chunk_index,
            item_key: format!("KEY{}", item_id),
            library_id: 1,
            title: format!("Title {}", item_id),
            abstract_text: None,
            chunk_text: Some(format!("chunk {} of {}", chunk_index, item_id)),
            text_source: if chunk_index == 0 { "summary" } else { "content" }.to_string(),
            embedding: vector,
            model_id: "test-model".to_string(),
            indexed_at: "2024-06-01T12:00:00Z".to_string(),
            content_hash: format!("hash{}", item_id),
        }
    }

    async fn open_store() -> VectorStore {
        let pool = db::connect_in_memory().await.unwrap();
        VectorStore::open(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = open_store().await;
        let row = make_row(1, 0, vec![1.0, 2.0, 3.0]);
        store.put(&row).await.unwrap();

        let loaded = store.get(1).await.unwrap().unwrap();
        assert_eq!(loaded.item_id, 1);
        assert_eq!(loaded.chunk_index, 0);
        assert_eq!(loaded.embedding, vec![1.0, 2.0, 3.0]);
        assert_eq!(loaded.text_source, "summary");
        assert!(store.get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_prefers_chunk_zero() {
        let store = open_store().await;
        store.put(&make_row(1, 2, vec![1.0, 0.0])).await.unwrap();
        assert_eq!(store.get(1).await.unwrap().unwrap().chunk_index, 2);
        store.put(&make_row(1, 0, vec![0.0, 1.0])).await.unwrap();
        assert_eq!(store.get(1).await.unwrap().unwrap().chunk_index, 0);
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let store = open_store().await;
        store.put(&make_row(1, 0, vec![1.0, 0.0])).await.unwrap();
        let mut updated = make_row(1, 0, vec![0.0, 1.0]);
        updated.title = "Updated".to_string();
        store.put(&updated).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Updated");
        assert_eq!(all[0].embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_get_all_ordering() {
        let store = open_store().await;
        let rows = vec![
            make_row(2, 1, vec![1.0, 0.0]),
            make_row(1, 0, vec![1.0, 0.0]),
            make_row(2, 0, vec![1.0, 0.0]),
        ];
        store.put_batch(&rows).await.unwrap();

        let all = store.get_all().await.unwrap();
        let keys: Vec<(i64, i64)> = all.iter().map(|r| (r.item_id, r.chunk_index)).collect();
        assert_eq!(keys, vec![(1, 0), (2, 0), (2, 1)]);
    }

    #[tokio::test]
    async fn test_replace_items_drops_stale_chunks() {
        let store = open_store().await;
        store
            .put_batch(&[
                make_row(1, 0, vec![1.0, 0.0]),
                make_row(1, 1, vec![1.0, 0.0]),
                make_row(1, 2, vec![1.0, 0.0]),
                make_row(2, 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        store
            .replace_items(&[1], &[make_row(1, 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.get_item_chunks(1).await.unwrap().len(), 1);
        assert_eq!(store.get_item_chunks(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = open_store().await;
        store
            .put_batch(&[
                make_row(1, 0, vec![1.0, 0.0]),
                make_row(2, 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        store.delete_item_chunks(1).await.unwrap();
        assert!(!store.is_indexed(1).await.unwrap());
        assert!(store.is_indexed(2).await.unwrap());

        store.clear().await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_by_library() {
        let store = open_store().await;
        let mut other = make_row(2, 0, vec![1.0, 0.0]);
        other.library_id = 7;
        store
            .put_batch(&[make_row(1, 0, vec![1.0, 0.0]), other])
            .await
            .unwrap();

        let rows = store.get_by_library(7).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item_id, 2);
    }

    #[tokio::test]
    async fn test_needs_reindex() {
        let store = open_store().await;
        assert!(store.needs_reindex(1, "hash1").await.unwrap());
        store.put(&make_row(1, 0, vec![1.0, 0.0])).await.unwrap();
        assert!(!store.needs_reindex(1, "hash1").await.unwrap());
        assert!(store.needs_reindex(1, "different").await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_faithful_and_invalidated_on_write() {
        let store = open_store().await;
        store.put(&make_row(1, 0, vec![3.0, 4.0])).await.unwrap();

        let snapshot = store.get_all_cached().await.unwrap();
        assert_eq!(snapshot.chunks.len(), 1);
        // Vectors come back L2-normalized.
        assert!((snapshot.chunks[0].vector[0] - 0.6).abs() < 1e-6);
        assert!((snapshot.chunks[0].vector[1] - 0.8).abs() < 1e-6);

        store.put(&make_row(2, 0, vec![0.0, 1.0])).await.unwrap();
        let snapshot = store.get_all_cached().await.unwrap();
        let cached: Vec<(i64, i64)> = snapshot
            .chunks
            .iter()
            .map(|c| (c.item_id, c.chunk_index))
            .collect();
        let stored: Vec<(i64, i64)> = store
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|r| (r.item_id, r.chunk_index))
            .collect();
        assert_eq!(cached, stored);
    }

    #[tokio::test]
    async fn test_cache_skips_corrupt_and_mismatched_vectors() {
        let store = open_store().await;
        store
            .put_batch(&[
                make_row(1, 0, vec![1.0, 0.0, 0.0]),
                make_row(2, 0, vec![0.0, 1.0, 0.0]),
                // Wrong dimension relative to the rest of the store.
                make_row(3, 0, vec![1.0, 0.0]),
                // Zero vector.
                make_row(4, 0, vec![0.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        // Corrupt a row behind the codec's back.
        sqlx::query("UPDATE embeddings SET embedding = 'not json' WHERE item_id = 2")
            .execute(&store.pool)
            .await
            .unwrap();
        store.invalidate_cache();

        let snapshot = store.get_all_cached().await.unwrap();
        let ids: Vec<i64> = snapshot.chunks.iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_normalize_stored_vector_classifies_corruption() {
        let ok = normalize_stored_vector(1, 0, "[3.0, 4.0]", None).unwrap();
        assert!((ok[0] - 0.6).abs() < 1e-6);

        for (encoded, dims) in [
            ("not json", None),
            ("[]", None),
            ("[0.0, 0.0]", None),
            ("[1.0, 0.0]", Some(3)),
        ] {
            let err = normalize_stored_vector(7, 2, encoded, dims).unwrap_err();
            assert!(matches!(
                err,
                Error::CorruptVector {
                    item_id: 7,
                    chunk_index: 2
                }
            ));
        }
    }

    #[tokio::test]
    async fn test_legacy_text_source_maps_to_content() {
        let store = open_store().await;
        let mut row = make_row(1, 1, vec![1.0, 0.0]);
        row.text_source = "fulltext".to_string();
        store.put(&row).await.unwrap();

        let snapshot = store.get_all_cached().await.unwrap();
        assert_eq!(snapshot.chunks[0].kind, crate::models::ChunkKind::Content);
        // The stored value is preserved verbatim.
        assert_eq!(store.get(1).await.unwrap().unwrap().text_source, "fulltext");
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let store = open_store().await;
        assert_eq!(
            store.get_metadata("schema_version").await.unwrap(),
            Some(serde_json::json!(SCHEMA_VERSION))
        );

        store
            .set_metadata("indexing_mode", &serde_json::json!("full"))
            .await
            .unwrap();
        assert_eq!(
            store.get_metadata("indexing_mode").await.unwrap(),
            Some(serde_json::json!("full"))
        );
        assert_eq!(store.get_metadata("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = open_store().await;
        store
            .put_batch(&[
                make_row(1, 0, vec![1.0, 0.0]),
                make_row(1, 1, vec![1.0, 0.0]),
                make_row(2, 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.indexed_items, 2);
        assert_eq!(stats.total_chunks, 3);
        assert!((stats.avg_chunks_per_item - 1.5).abs() < 1e-9);
        assert_eq!(stats.model_id.as_deref(), Some("test-model"));
        assert_eq!(stats.last_indexed_at.as_deref(), Some("2024-06-01T12:00:00Z"));
        assert!(stats.storage_bytes_estimate > 0);
    }
}
