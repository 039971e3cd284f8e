//! Dual-collection vector index.
//!
//! [`VectorIndex`] sits on top of a [`VectorStore`] and an
//! [`EmbeddingProvider`] and owns the retrieval semantics:
//!
//! | Operation | Behaviour |
//! |-----------|-----------|
//! | [`upsert_catalog`](VectorIndex::upsert_catalog) | embed the course title, write one catalog entry |
//! | [`upsert_content`](VectorIndex::upsert_content) | embed prefixed chunk text, write content records |
//! | [`resolve_course_name`](VectorIndex::resolve_course_name) | fuzzy title → exact catalog title |
//! | [`search`](VectorIndex::search) | filtered top-k content, nearest first |
//!
//! Reads run concurrently with each other. Writes take an exclusive guard,
//! so a search never observes a half-written course.
//!
//! # Name resolution
//!
//! A course filter that already equals a catalog title is used as is.
//! Otherwise the name is embedded and the closest catalog entry wins. When
//! `resolve_min_similarity` is set, a best match below that cosine floor
//! counts as not found.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::models::{CatalogEntry, CatalogStats, Chunk, ContentRecord};
use crate::store::{ContentFilter, ContentHit, VectorStore};

/// Optional restrictions on a content search, as supplied by a caller.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Course name as typed by the user; resolved through the catalog.
    pub course_name: Option<String>,
    pub lesson_number: Option<u32>,
}

/// Result of [`VectorIndex::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Nearest first.
    pub hits: Vec<ContentHit>,
    /// The exact catalog title the course filter resolved to, if any.
    pub resolved_course: Option<String>,
    /// Explanation when the result is empty for a reason other than "no matches".
    pub note: Option<String>,
}

impl SearchResults {
    fn unresolved(name: &str) -> Self {
        Self {
            hits: Vec::new(),
            resolved_course: None,
            note: Some(format!("No course found matching '{}'", name)),
        }
    }
}

pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_results: usize,
    resolve_min_similarity: Option<f32>,
    guard: RwLock<()>,
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            max_results: retrieval.max_results.max(1),
            resolve_min_similarity: retrieval.resolve_min_similarity,
            guard: RwLock::new(()),
        }
    }

    /// Insert or replace the catalog entry for `entry.title`.
    pub async fn upsert_catalog(&self, entry: &CatalogEntry) -> Result<()> {
        let vector = self.embedder.embed_query(&entry.title).await?;
        let _write = self.guard.write().await;
        self.store.upsert_catalog(entry, &vector).await
    }

    /// Insert or replace content records for `chunks`. Returns the number written.
    pub async fn upsert_content(&self, chunks: &[Chunk]) -> Result<usize> {
        let batch = self.embed_chunks(chunks).await?;
        let _write = self.guard.write().await;
        self.store.upsert_content(&batch).await?;
        Ok(batch.len())
    }

    /// Write a course's content and then its catalog entry under one write guard.
    ///
    /// Embedding happens before the guard is taken; a failure there leaves
    /// both collections untouched.
    pub async fn upsert_course(&self, entry: &CatalogEntry, chunks: &[Chunk]) -> Result<usize> {
        let batch = self.embed_chunks(chunks).await?;
        let title_vector = self.embedder.embed_query(&entry.title).await?;

        let _write = self.guard.write().await;
        self.store.upsert_content(&batch).await?;
        self.store.upsert_catalog(entry, &title_vector).await?;
        Ok(batch.len())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<(ContentRecord, Vec<f32>)>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<ContentRecord> = chunks.iter().map(ContentRecord::from_chunk).collect();
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        if vectors.len() != records.len() {
            return Err(Error::embedding(format!(
                "expected {} vectors, got {}",
                records.len(),
                vectors.len()
            )));
        }
        Ok(records.into_iter().zip(vectors).collect())
    }

    /// Translate a user-typed course reference into an exact catalog title.
    ///
    /// Returns `Ok(None)` when the catalog is empty, the name is blank, or
    /// the best match falls below the configured similarity floor.
    pub async fn resolve_course_name(&self, partial_name: &str) -> Result<Option<String>> {
        let name = partial_name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let _read = self.guard.read().await;
        if self.store.catalog_entry(name).await?.is_some() {
            return Ok(Some(name.to_string()));
        }

        let query_vec = self.embedder.embed_query(name).await?;
        let best = self.store.catalog_nearest(&query_vec, 1).await?.into_iter().next();

        let resolved = match best {
            Some(hit) if self.passes_floor(hit.similarity) => {
                tracing::debug!(query = name, title = %hit.entry.title, similarity = hit.similarity, "resolved course name");
                Some(hit.entry.title)
            }
            Some(hit) => {
                tracing::debug!(query = name, closest = %hit.entry.title, similarity = hit.similarity, "course name below similarity floor");
                None
            }
            None => None,
        };
        Ok(resolved)
    }

    fn passes_floor(&self, similarity: f32) -> bool {
        self.resolve_min_similarity
            .map_or(true, |floor| similarity >= floor)
    }

    /// Filtered similarity search over the content collection.
    ///
    /// `k` defaults to the configured `max_results`. An unresolvable course
    /// filter yields empty hits plus a note, not an error.
    pub async fn search(
        &self,
        query_text: &str,
        filters: &SearchFilters,
        k: Option<usize>,
    ) -> Result<SearchResults> {
        if query_text.trim().is_empty() {
            return Err(Error::invalid("search query must not be empty"));
        }
        let limit = k.unwrap_or(self.max_results);

        let resolved_course = match filters.course_name.as_deref() {
            Some(name) => match self.resolve_course_name(name).await? {
                Some(title) => Some(title),
                None => return Ok(SearchResults::unresolved(name)),
            },
            None => None,
        };

        let query_vec = self.embedder.embed_query(query_text).await?;
        let filter = ContentFilter {
            course_title: resolved_course.clone(),
            lesson_number: filters.lesson_number,
        };

        let _read = self.guard.read().await;
        let hits = self.store.content_search(&query_vec, &filter, limit).await?;
        tracing::debug!(
            query = query_text,
            course = ?resolved_course,
            lesson = ?filters.lesson_number,
            hits = hits.len(),
            "content search"
        );

        Ok(SearchResults {
            hits,
            resolved_course,
            note: None,
        })
    }

    pub async fn course_exists(&self, title: &str) -> Result<bool> {
        Ok(self.catalog_entry(title).await?.is_some())
    }

    pub async fn catalog_entry(&self, title: &str) -> Result<Option<CatalogEntry>> {
        let _read = self.guard.read().await;
        self.store.catalog_entry(title).await
    }

    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        let _read = self.guard.read().await;
        let titles = self.store.catalog_titles().await?;
        Ok(CatalogStats {
            course_count: titles.len(),
            titles,
        })
    }

    pub async fn content_count(&self) -> Result<usize> {
        let _read = self.guard.read().await;
        self.store.content_count().await
    }

    /// Empty both collections.
    pub async fn clear(&self) -> Result<()> {
        let _write = self.guard.write().await;
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_course, ChunkingParams};
    use crate::embedding::HashProvider;
    use crate::models::{Course, Lesson};
    use crate::store::memory::InMemoryStore;

    fn course(title: &str, bodies: &[&str]) -> Course {
        Course {
            title: title.to_string(),
            course_link: None,
            instructor: None,
            lessons: bodies
                .iter()
                .enumerate()
                .map(|(i, b)| Lesson {
                    lesson_number: i as u32,
                    title: format!("Part {}", i),
                    lesson_link: None,
                    body: b.to_string(),
                })
                .collect(),
        }
    }

    fn index(floor: Option<f32>) -> VectorIndex {
        VectorIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashProvider::new(256)),
            &RetrievalConfig {
                max_results: 5,
                resolve_min_similarity: floor,
            },
        )
    }

    async fn add(index: &VectorIndex, c: &Course) {
        let chunks = chunk_course(
            c,
            ChunkingParams {
                chunk_size: 200,
                chunk_overlap: 20,
            },
        );
        index
            .upsert_course(&CatalogEntry::from_course(c), &chunks)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_exact_and_fuzzy() {
        let idx = index(None);
        add(&idx, &course("Introduction to Rust Programming", &["ownership borrowing"])).await;
        add(&idx, &course("Advanced French Cooking", &["sauces and butter"])).await;

        assert_eq!(
            idx.resolve_course_name("Advanced French Cooking").await.unwrap().as_deref(),
            Some("Advanced French Cooking")
        );
        assert_eq!(
            idx.resolve_course_name("rust programming").await.unwrap().as_deref(),
            Some("Introduction to Rust Programming")
        );
        assert_eq!(idx.resolve_course_name("   ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_on_empty_catalog_is_not_found() {
        let idx = index(None);
        assert_eq!(idx.resolve_course_name("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_similarity_floor_rejects_weak_matches() {
        let idx = index(Some(0.99));
        add(&idx, &course("Introduction to Rust Programming", &["ownership"])).await;
        assert_eq!(idx.resolve_course_name("cooking").await.unwrap(), None);

        let results = idx
            .search(
                "ownership",
                &SearchFilters {
                    course_name: Some("cooking".to_string()),
                    lesson_number: None,
                },
                None,
            )
            .await
            .unwrap();
        assert!(results.hits.is_empty());
        assert!(results.note.unwrap().contains("cooking"));
    }

    #[tokio::test]
    async fn test_search_restricts_to_resolved_course_and_lesson() {
        let idx = index(None);
        add(&idx, &course("Introduction to Rust Programming", &["ownership rules", "borrowing rules"])).await;
        add(&idx, &course("Advanced French Cooking", &["ownership of the kitchen rules"])).await;

        let results = idx
            .search(
                "rules",
                &SearchFilters {
                    course_name: Some("rust programming".to_string()),
                    lesson_number: Some(1),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(results.resolved_course.as_deref(), Some("Introduction to Rust Programming"));
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].record.lesson_number, 1);
        assert_eq!(results.hits[0].record.body(), "borrowing rules");
    }

    #[tokio::test]
    async fn test_search_respects_k_and_orders_by_distance() {
        let idx = index(None);
        let bodies: Vec<String> = (0..8).map(|i| format!("topic {} alpha beta", i)).collect();
        let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
        add(&idx, &course("Many Lessons", &refs)).await;

        let results = idx.search("alpha beta", &SearchFilters::default(), Some(3)).await.unwrap();
        assert_eq!(results.hits.len(), 3);
        assert!(results
            .hits
            .windows(2)
            .all(|w| w[0].distance <= w[1].distance));

        let results = idx.search("alpha beta", &SearchFilters::default(), None).await.unwrap();
        assert_eq!(results.hits.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let idx = index(None);
        assert!(idx.search("  ", &SearchFilters::default(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_reupsert_does_not_duplicate() {
        let idx = index(None);
        let c = course("Repeatable", &["same body"]);
        add(&idx, &c).await;
        add(&idx, &c).await;
        assert_eq!(idx.content_count().await.unwrap(), 1);
        assert_eq!(idx.catalog_stats().await.unwrap().course_count, 1);
    }
}
