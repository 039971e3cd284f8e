//! SQLite-backed [`VectorStore`].
//!
//! Embeddings are stored as little-endian `f32` BLOBs (see
//! [`vec_to_blob`]) and ranked in Rust by cosine similarity after
//! filtering in SQL. Content batches are written in one transaction.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{CatalogEntry, ContentRecord, LessonEntry};

use super::{rank_catalog, rank_content, CatalogHit, ContentFilter, ContentHit, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogEntry> {
    let lessons_json: String = row.get("lessons_json");
    let lessons: Vec<LessonEntry> = serde_json::from_str(&lessons_json)?;
    let lesson_count: i64 = row.get("lesson_count");
    Ok(CatalogEntry {
        title: row.get("title"),
        instructor: row.get("instructor"),
        course_link: row.get("course_link"),
        lesson_count: lesson_count as usize,
        lessons,
    })
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> ContentRecord {
    let lesson_number: i64 = row.get("lesson_number");
    let chunk_index: i64 = row.get("chunk_index");
    let body_offset: i64 = row.get("body_offset");
    ContentRecord {
        text: row.get("text"),
        course_title: row.get("course_title"),
        lesson_number: lesson_number as u32,
        chunk_index: chunk_index as u32,
        body_offset: body_offset as usize,
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_catalog(&self, entry: &CatalogEntry, embedding: &[f32]) -> Result<()> {
        let lessons_json = serde_json::to_string(&entry.lessons)?;
        sqlx::query(
            r#"
            INSERT INTO catalog (title, instructor, course_link, lesson_count, lessons_json, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                instructor = excluded.instructor,
                course_link = excluded.course_link,
                lesson_count = excluded.lesson_count,
                lessons_json = excluded.lessons_json,
                embedding = excluded.embedding
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.instructor)
        .bind(&entry.course_link)
        .bind(entry.lesson_count as i64)
        .bind(lessons_json)
        .bind(vec_to_blob(embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_content(&self, records: &[(ContentRecord, Vec<f32>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (record, vector) in records {
            sqlx::query(
                r#"
                INSERT INTO content (id, course_title, lesson_number, chunk_index, text, body_offset, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    body_offset = excluded.body_offset,
                    embedding = excluded.embedding
                "#,
            )
            .bind(record.id())
            .bind(&record.course_title)
            .bind(record.lesson_number as i64)
            .bind(record.chunk_index as i64)
            .bind(&record.text)
            .bind(record.body_offset as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn catalog_nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CatalogHit>> {
        let rows = sqlx::query(
            "SELECT title, instructor, course_link, lesson_count, lessons_json, embedding FROM catalog",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            hits.push(CatalogHit {
                entry: entry_from_row(row)?,
                similarity: cosine_similarity(query_vec, &blob_to_vec(&blob)),
            });
        }
        Ok(rank_catalog(hits, limit))
    }

    async fn content_search(
        &self,
        query_vec: &[f32],
        filter: &ContentFilter,
        limit: usize,
    ) -> Result<Vec<ContentHit>> {
        let rows = sqlx::query(
            r#"
            SELECT course_title, lesson_number, chunk_index, text, body_offset, embedding
            FROM content
            WHERE (?1 IS NULL OR course_title = ?1)
              AND (?2 IS NULL OR lesson_number = ?2)
            "#,
        )
        .bind(filter.course_title.as_deref())
        .bind(filter.lesson_number.map(|n| n as i64))
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ContentHit {
                    record: record_from_row(row),
                    distance: 1.0 - cosine_similarity(query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();
        Ok(rank_content(hits, limit))
    }

    async fn catalog_entry(&self, title: &str) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(
            "SELECT title, instructor, course_link, lesson_count, lessons_json FROM catalog WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn catalog_titles(&self) -> Result<Vec<String>> {
        let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM catalog ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(titles)
    }

    async fn content_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content")
            .fetch_one(&self.pool)
            .await?;
        usize::try_from(count).map_err(|e| Error::store(e.to_string()))
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM content").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM catalog").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(title: &str) -> CatalogEntry {
        CatalogEntry {
            title: title.to_string(),
            instructor: Some("Ferris".to_string()),
            course_link: None,
            lesson_count: 1,
            lessons: vec![LessonEntry {
                lesson_number: 1,
                lesson_title: "Basics".to_string(),
                lesson_link: Some("https://example.com/1".to_string()),
            }],
        }
    }

    fn record(course: &str, lesson: u32, chunk: u32) -> ContentRecord {
        ContentRecord {
            text: format!("Course: {}\n\nbody", course),
            course_title: course.to_string(),
            lesson_number: lesson,
            chunk_index: chunk,
            body_offset: format!("Course: {}\n\n", course).len(),
        }
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_and_persistence() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("store.sqlite");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.upsert_catalog(&entry("Rust"), &[1.0, 0.0]).await.unwrap();
            store
                .upsert_content(&[(record("Rust", 1, 0), vec![1.0, 0.0])])
                .await
                .unwrap();
            store
                .upsert_content(&[(record("Rust", 1, 0), vec![1.0, 0.0])])
                .await
                .unwrap();
            store.pool().close().await;
        }

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.catalog_titles().await.unwrap(), vec!["Rust".to_string()]);
        assert_eq!(store.content_count().await.unwrap(), 1);

        let loaded = store.catalog_entry("Rust").await.unwrap().unwrap();
        assert_eq!(loaded, entry("Rust"));

        let hits = store
            .content_search(&[1.0, 0.0], &ContentFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.body(), "body");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sqlite_filter_by_lesson() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("s.sqlite")).await.unwrap();
        store
            .upsert_content(&[
                (record("Rust", 1, 0), vec![1.0, 0.0]),
                (record("Rust", 2, 0), vec![1.0, 0.0]),
                (record("Go", 1, 0), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = ContentFilter {
            course_title: Some("Rust".to_string()),
            lesson_number: Some(2),
        };
        let hits = store.content_search(&[1.0, 0.0], &filter, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.lesson_number, 2);

        store.clear().await.unwrap();
        assert_eq!(store.content_count().await.unwrap(), 0);
    }
}
