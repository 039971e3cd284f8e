//! Schema for the SQLite store. Every statement is idempotent.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Catalog collection: one row per course
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog (
            title TEXT PRIMARY KEY,
            instructor TEXT,
            course_link TEXT,
            lesson_count INTEGER NOT NULL,
            lessons_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Content collection: one row per chunk
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            course_title TEXT NOT NULL,
            lesson_number INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            body_offset INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(course_title, lesson_number, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_course ON content(course_title)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_course_lesson ON content(course_title, lesson_number)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
