//! Core data models used throughout the ingestion and query pipeline.
//!
//! A [`Course`] is parsed from one document and owns its [`Lesson`]s.
//! Ingestion derives one [`CatalogEntry`] and a sequence of [`Chunk`]s
//! from it; the course `title` is the only key linking the two.

use serde::{Deserialize, Serialize};

/// A course parsed from a single document.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    /// Unique course title, the primary key across both collections.
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    /// Lessons in document order.
    pub lessons: Vec<Lesson>,
}

/// A single lesson within a course.
#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub lesson_number: u32,
    pub title: String,
    pub lesson_link: Option<String>,
    /// Raw lesson body, exactly as it appeared between markers (trimmed).
    pub body: String,
}

/// A bounded, context-prefixed slice of lesson text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Back-reference to the owning course.
    pub course_title: String,
    pub lesson_number: u32,
    /// Contiguous, 0-based within a lesson.
    pub chunk_index: u32,
    /// Generated context header naming the course and lesson.
    pub header: String,
    /// The literal body slice.
    pub body: String,
}

impl Chunk {
    /// Text that gets embedded and persisted: header followed by body.
    pub fn text(&self) -> String {
        format!("{}{}", self.header, self.body)
    }

    /// Deterministic identity within the content collection.
    pub fn id(&self) -> String {
        content_id(&self.course_title, self.lesson_number, self.chunk_index)
    }
}

/// Deterministic content identity: `"<course>::<lesson>::<chunk>"`.
pub fn content_id(course_title: &str, lesson_number: u32, chunk_index: u32) -> String {
    format!("{}::{}::{}", course_title, lesson_number, chunk_index)
}

/// Course-level metadata stored in the catalog collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub instructor: Option<String>,
    pub course_link: Option<String>,
    pub lesson_count: usize,
    pub lessons: Vec<LessonEntry>,
}

impl CatalogEntry {
    /// Build the catalog record for a parsed course.
    pub fn from_course(course: &Course) -> Self {
        Self {
            title: course.title.clone(),
            instructor: course.instructor.clone(),
            course_link: course.course_link.clone(),
            lesson_count: course.lessons.len(),
            lessons: course
                .lessons
                .iter()
                .map(|l| LessonEntry {
                    lesson_number: l.lesson_number,
                    lesson_title: l.title.clone(),
                    lesson_link: l.lesson_link.clone(),
                })
                .collect(),
        }
    }

    pub fn lesson(&self, lesson_number: u32) -> Option<&LessonEntry> {
        self.lessons
            .iter()
            .find(|l| l.lesson_number == lesson_number)
    }
}

/// One lesson line in a [`CatalogEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonEntry {
    pub lesson_number: u32,
    pub lesson_title: String,
    pub lesson_link: Option<String>,
}

/// Persisted content record: the prefixed text plus its typed metadata.
///
/// `body_offset` is the byte offset at which the lesson body starts inside
/// `text`, so the context header can be stripped on the way out.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub text: String,
    pub course_title: String,
    pub lesson_number: u32,
    pub chunk_index: u32,
    pub body_offset: usize,
}

impl ContentRecord {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text(),
            course_title: chunk.course_title.clone(),
            lesson_number: chunk.lesson_number,
            chunk_index: chunk.chunk_index,
            body_offset: chunk.header.len(),
        }
    }

    pub fn id(&self) -> String {
        content_id(&self.course_title, self.lesson_number, self.chunk_index)
    }

    /// The lesson body without its generated context header.
    pub fn body(&self) -> &str {
        self.text.get(self.body_offset..).unwrap_or(&self.text)
    }
}

/// A structured source record reported alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub course_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_link: Option<String>,
}

impl Source {
    /// Human-readable label, e.g. `"Intro to Rust - Lesson 2"`.
    pub fn label(&self) -> String {
        match self.lesson_number {
            Some(n) => format!("{} - Lesson {}", self.course_title, n),
            None => self.course_title.clone(),
        }
    }
}

/// One query/answer exchange in a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub query: String,
    pub answer: String,
}

/// Catalog summary returned by `get_catalog_stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStats {
    pub course_count: usize,
    pub titles: Vec<String>,
}
