//! In-memory [`VectorStore`] implementation.
//!
//! Both collections live behind a single `parking_lot::RwLock`, so a
//! batch upsert is observed by readers either entirely or not at all.
//! Searches are brute-force cosine similarity over every stored vector.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::{CatalogEntry, ContentRecord};

use super::{rank_catalog, rank_content, CatalogHit, ContentFilter, ContentHit, VectorStore};

struct StoredEntry {
    entry: CatalogEntry,
    vector: Vec<f32>,
}

struct StoredContent {
    record: ContentRecord,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Collections {
    catalog: BTreeMap<String, StoredEntry>,
    content: HashMap<String, StoredContent>,
}

/// In-memory store; the default backend and the one used in tests.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert_catalog(&self, entry: &CatalogEntry, embedding: &[f32]) -> Result<()> {
        self.inner.write().catalog.insert(
            entry.title.clone(),
            StoredEntry {
                entry: entry.clone(),
                vector: embedding.to_vec(),
            },
        );
        Ok(())
    }

    async fn upsert_content(&self, records: &[(ContentRecord, Vec<f32>)]) -> Result<()> {
        let mut inner = self.inner.write();
        for (record, vector) in records {
            inner.content.insert(
                record.id(),
                StoredContent {
                    record: record.clone(),
                    vector: vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn catalog_nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CatalogHit>> {
        let inner = self.inner.read();
        let hits = inner
            .catalog
            .values()
            .map(|s| CatalogHit {
                entry: s.entry.clone(),
                similarity: cosine_similarity(query_vec, &s.vector),
            })
            .collect();
        Ok(rank_catalog(hits, limit))
    }

    async fn content_search(
        &self,
        query_vec: &[f32],
        filter: &ContentFilter,
        limit: usize,
    ) -> Result<Vec<ContentHit>> {
        let inner = self.inner.read();
        let hits = inner
            .content
            .values()
            .filter(|s| filter.matches(&s.record))
            .map(|s| ContentHit {
                record: s.record.clone(),
                distance: 1.0 - cosine_similarity(query_vec, &s.vector),
            })
            .collect();
        Ok(rank_content(hits, limit))
    }

    async fn catalog_entry(&self, title: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.inner.read().catalog.get(title).map(|s| s.entry.clone()))
    }

    async fn catalog_titles(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().catalog.keys().cloned().collect())
    }

    async fn content_count(&self) -> Result<usize> {
        Ok(self.inner.read().content.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.catalog.clear();
        inner.content.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> CatalogEntry {
        CatalogEntry {
            title: title.to_string(),
            instructor: None,
            course_link: None,
            lesson_count: 0,
            lessons: Vec::new(),
        }
    }

    fn record(course: &str, lesson: u32, chunk: u32) -> ContentRecord {
        ContentRecord {
            text: format!("header\n\nbody {} {} {}", course, lesson, chunk),
            course_title: course.to_string(),
            lesson_number: lesson,
            chunk_index: chunk,
            body_offset: "header\n\n".len(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let batch = vec![(record("A", 1, 0), vec![1.0, 0.0]), (record("A", 1, 1), vec![0.0, 1.0])];
        store.upsert_content(&batch).await.unwrap();
        store.upsert_content(&batch).await.unwrap();
        store.upsert_catalog(&entry("A"), &[1.0, 0.0]).await.unwrap();
        store.upsert_catalog(&entry("A"), &[1.0, 0.0]).await.unwrap();

        assert_eq!(store.content_count().await.unwrap(), 2);
        assert_eq!(store.catalog_titles().await.unwrap(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_content_search_filters_and_orders() {
        let store = InMemoryStore::new();
        store
            .upsert_content(&[
                (record("A", 1, 0), vec![1.0, 0.0]),
                (record("A", 2, 0), vec![0.6, 0.8]),
                (record("B", 1, 0), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = ContentFilter {
            course_title: Some("A".to_string()),
            lesson_number: None,
        };
        let hits = store.content_search(&[1.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.record.course_title == "A"));
        assert_eq!(hits[0].record.lesson_number, 1);
        assert!(hits[0].distance <= hits[1].distance);

        let filter = ContentFilter {
            course_title: Some("A".to_string()),
            lesson_number: Some(2),
        };
        let hits = store.content_search(&[1.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.lesson_number, 2);
    }

    #[tokio::test]
    async fn test_catalog_nearest_and_clear() {
        let store = InMemoryStore::new();
        store.upsert_catalog(&entry("A"), &[1.0, 0.0]).await.unwrap();
        store.upsert_catalog(&entry("B"), &[0.0, 1.0]).await.unwrap();

        let hits = store.catalog_nearest(&[0.1, 0.9], 1).await.unwrap();
        assert_eq!(hits[0].entry.title, "B");

        store.clear().await.unwrap();
        assert!(store.catalog_titles().await.unwrap().is_empty());
        assert_eq!(store.content_count().await.unwrap(), 0);
    }
}
