//! Storage abstraction for the two vector collections.
//!
//! The [`VectorStore`] trait covers everything the [`VectorIndex`](crate::index::VectorIndex)
//! needs from a backend: idempotent upserts into the **catalog** and
//! **content** collections, nearest-neighbour lookups over each, and the
//! small amount of bookkeeping used by statistics and re-indexing.
//!
//! Backends:
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | in-memory | [`memory`] | default; one `RwLock` over both collections |
//! | SQLite | [`sqlite`] | persistent; BLOB embeddings, brute-force cosine |
//!
//! Implementations must be `Send + Sync`. A single `upsert_content` call
//! must become visible to readers all at once, never partially.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::models::{CatalogEntry, ContentRecord};

/// Optional metadata restrictions applied before ranking content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    /// Exact catalog title.
    pub course_title: Option<String>,
    pub lesson_number: Option<u32>,
}

impl ContentFilter {
    pub fn matches(&self, record: &ContentRecord) -> bool {
        self.course_title
            .as_deref()
            .map_or(true, |t| t == record.course_title)
            && self
                .lesson_number
                .map_or(true, |n| n == record.lesson_number)
    }
}

/// A content record with its cosine distance (`1 - similarity`) to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHit {
    pub record: ContentRecord,
    pub distance: f32,
}

/// A catalog entry with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogHit {
    pub entry: CatalogEntry,
    pub similarity: f32,
}

/// Abstract backend for the catalog and content collections.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_catalog`](VectorStore::upsert_catalog) | Insert or replace one course's catalog entry |
/// | [`upsert_content`](VectorStore::upsert_content) | Insert or replace a batch of chunks |
/// | [`catalog_nearest`](VectorStore::catalog_nearest) | Catalog entries by similarity, best first |
/// | [`content_search`](VectorStore::content_search) | Filtered content by distance, nearest first |
/// | [`catalog_entry`](VectorStore::catalog_entry) | Exact-title catalog lookup |
/// | [`catalog_titles`](VectorStore::catalog_titles) | All titles, sorted |
/// | [`clear`](VectorStore::clear) | Empty both collections |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Keyed by `entry.title`; a second upsert with the same title replaces the first.
    async fn upsert_catalog(&self, entry: &CatalogEntry, embedding: &[f32]) -> Result<()>;

    /// Keyed by [`ContentRecord::id`]. The whole batch is applied atomically.
    async fn upsert_content(&self, records: &[(ContentRecord, Vec<f32>)]) -> Result<()>;

    async fn catalog_nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CatalogHit>>;

    async fn content_search(
        &self,
        query_vec: &[f32],
        filter: &ContentFilter,
        limit: usize,
    ) -> Result<Vec<ContentHit>>;

    async fn catalog_entry(&self, title: &str) -> Result<Option<CatalogEntry>>;

    async fn catalog_titles(&self) -> Result<Vec<String>>;

    /// Number of stored content records.
    async fn content_count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

/// Create the backend selected by `[store]`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(memory::InMemoryStore::new())),
        "sqlite" => Ok(Arc::new(sqlite::SqliteStore::open(&config.path).await?)),
        other => Err(Error::store(format!("Unknown store backend: {}", other))),
    }
}

/// Sort hits nearest first and keep the top `limit`.
pub(crate) fn rank_content(mut hits: Vec<ContentHit>, limit: usize) -> Vec<ContentHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id().cmp(&b.record.id()))
    });
    hits.truncate(limit);
    hits
}

/// Sort catalog hits most similar first and keep the top `limit`.
pub(crate) fn rank_catalog(mut hits: Vec<CatalogHit>, limit: usize) -> Vec<CatalogHit> {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry.title.cmp(&b.entry.title))
    });
    hits.truncate(limit);
    hits
}
