//! Host catalog interface.
//!
//! The reference manager that embeds this core owns the item database, the
//! full-text extraction of attachments, and a conjunctive keyword-match
//! primitive. The core consumes all three through this trait and never
//! reaches around it. Host errors are arbitrary, so methods return
//! `anyhow::Result`; callers wrap failures into [`crate::Error::Catalog`].

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Item;

/// Scope restrictions for the host's keyword-match primitive.
#[derive(Debug, Clone, Default)]
pub struct KeywordScope {
    pub library_id: Option<i64>,
    pub collection_id: Option<i64>,
    /// Item types to leave out (e.g. `book` when books are excluded).
    pub exclude_types: Vec<String>,
}

/// The narrow interface onto the host reference manager.
#[async_trait]
pub trait HostCatalog: Send + Sync {
    /// Items currently selected in the host UI.
    async fn get_selected_items(&self) -> Result<Vec<Item>>;

    /// All items of one library, or of every library when `library_id` is
    /// `None`.
    async fn get_library_items(&self, library_id: Option<i64>) -> Result<Vec<Item>>;

    /// Items of a collection.
    async fn get_collection_items(&self, collection_id: i64) -> Result<Vec<Item>>;

    /// A single item, or `None` when the host no longer knows the id.
    async fn get_item(&self, item_id: i64) -> Result<Option<Item>>;

    /// Concatenated extracted text of the item's PDF/HTML attachments, or
    /// `None` when nothing was extracted.
    async fn get_full_text(&self, item_id: i64) -> Result<Option<String>>;

    /// Item ids matching the query conjunctively across title, creators,
    /// date, and tags. Relevance-unranked; the retrieval engine rescoring
    /// puts them in order.
    async fn keyword_search(&self, query: &str, scope: &KeywordScope) -> Result<Vec<i64>>;
}
