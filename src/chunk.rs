//! Sliding-window lesson chunker.
//!
//! Splits each lesson body into overlapping [`Chunk`]s of `chunk_size`
//! characters. Every chunk after the first starts
//! `chunk_size - chunk_overlap` characters after the previous one, so
//! neighbours share exactly `chunk_overlap` characters of literal text.
//! Sizes are counted in Unicode scalar values, never bytes, so slicing
//! always lands on a UTF-8 boundary.
//!
//! Each chunk also carries a generated context header naming the course
//! and lesson. The header is embedded with the body but is not part of
//! the body itself.
//!
//! # Example
//!
//! ```rust
//! use course_rag::chunk::split_windows;
//!
//! let body = "a".repeat(1000);
//! let windows = split_windows(&body, 800, 100);
//! assert_eq!(windows.len(), 2);
//! assert_eq!(windows[0].chars().count(), 800);
//! assert_eq!(windows[1].chars().count(), 300);
//! ```

use crate::models::{Chunk, Course, Lesson};

/// Character-based chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent windows. Always `< chunk_size`.
    pub chunk_overlap: usize,
}

impl ChunkingParams {
    fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// Chunk every lesson of a course.
///
/// Chunk indices restart at 0 for each lesson. Lessons with an empty body
/// produce no chunks.
pub fn chunk_course(course: &Course, params: ChunkingParams) -> Vec<Chunk> {
    course
        .lessons
        .iter()
        .flat_map(|lesson| chunk_lesson(&course.title, lesson, params))
        .collect()
}

/// Chunk a single lesson body.
pub fn chunk_lesson(course_title: &str, lesson: &Lesson, params: ChunkingParams) -> Vec<Chunk> {
    let header = context_header(course_title, lesson);
    split_windows(&lesson.body, params.chunk_size, params.chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, body)| Chunk {
            course_title: course_title.to_string(),
            lesson_number: lesson.lesson_number,
            chunk_index: i as u32,
            header: header.clone(),
            body: body.to_string(),
        })
        .collect()
}

/// The context string prepended to every chunk of `lesson`.
pub fn context_header(course_title: &str, lesson: &Lesson) -> String {
    if lesson.title.is_empty() {
        format!(
            "Course: {}\nLesson {}\n\n",
            course_title, lesson.lesson_number
        )
    } else {
        format!(
            "Course: {}\nLesson {}: {}\n\n",
            course_title, lesson.lesson_number, lesson.title
        )
    }
}

/// Slide a `chunk_size`-character window across `text`.
///
/// Returns borrowed slices. Every slice except the last is exactly
/// `chunk_size` characters; the last may be shorter. An empty input
/// yields no slices. `chunk_overlap >= chunk_size` is clamped to a step
/// of one character.
pub fn split_windows(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<&str> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let params = ChunkingParams {
        chunk_size,
        chunk_overlap,
    };
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = offsets.len();
    let byte_at = |pos: usize| -> usize {
        if pos >= char_count {
            text.len()
        } else {
            offsets[pos]
        }
    };

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(char_count);
        windows.push(&text[byte_at(start)..byte_at(end)]);
        if end == char_count {
            break;
        }
        start += params.step();
    }
    windows
}

/// Rebuild the original text from windows produced by [`split_windows`].
pub fn reassemble(windows: &[&str], chunk_overlap: usize) -> String {
    let mut out = String::new();
    for (i, w) in windows.iter().enumerate() {
        if i == 0 {
            out.push_str(w);
        } else {
            out.extend(w.chars().skip(chunk_overlap));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(number: u32, body: &str) -> Lesson {
        Lesson {
            lesson_number: number,
            title: format!("Lesson title {}", number),
            lesson_link: None,
            body: body.to_string(),
        }
    }

    fn numbered_body(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    #[test]
    fn test_scenario_1000_chars_800_100() {
        let body = numbered_body(1000);
        let windows = split_windows(&body, 800, 100);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], &body[0..800]);
        assert_eq!(windows[1], &body[700..1000]);
        assert_eq!(&windows[0][700..800], &windows[1][0..100]);
    }

    #[test]
    fn test_short_body_single_chunk() {
        let windows = split_windows("hello", 800, 100);
        assert_eq!(windows, vec!["hello"]);
    }

    #[test]
    fn test_exact_size_single_chunk() {
        let body = numbered_body(800);
        assert_eq!(split_windows(&body, 800, 100).len(), 1);
    }

    #[test]
    fn test_empty_body_no_chunks() {
        assert!(split_windows("", 800, 100).is_empty());
    }

    #[test]
    fn test_sizing_and_overlap_properties() {
        for len in [1usize, 99, 100, 101, 250, 799, 801, 1500, 3333] {
            let body = numbered_body(len);
            let (size, overlap) = (120, 30);
            let windows = split_windows(&body, size, overlap);
            for (i, w) in windows.iter().enumerate() {
                if i + 1 < windows.len() {
                    assert_eq!(w.chars().count(), size, "len={} chunk={}", len, i);
                    let tail: String = w.chars().skip(size - overlap).collect();
                    let head: String = windows[i + 1].chars().take(overlap).collect();
                    assert_eq!(tail, head, "len={} boundary={}", len, i);
                } else {
                    assert!(w.chars().count() <= size);
                }
            }
            assert_eq!(reassemble(&windows, overlap), body, "len={}", len);
        }
    }

    #[test]
    fn test_zero_overlap_partitions() {
        let body = numbered_body(250);
        let windows = split_windows(&body, 100, 0);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows.concat(), body);
    }

    #[test]
    fn test_multibyte_chars_counted_as_chars() {
        let body = "é".repeat(10) + &"─".repeat(10);
        let windows = split_windows(&body, 8, 2);
        for w in &windows[..windows.len() - 1] {
            assert_eq!(w.chars().count(), 8);
        }
        assert_eq!(reassemble(&windows, 2), body);
    }

    #[test]
    fn test_chunk_lesson_indices_and_header() {
        let l = lesson(3, &numbered_body(500));
        let chunks = chunk_lesson(
            "Intro to Rust",
            &l,
            ChunkingParams {
                chunk_size: 200,
                chunk_overlap: 50,
            },
        );
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
            assert_eq!(c.lesson_number, 3);
            assert_eq!(c.course_title, "Intro to Rust");
            assert!(c.text().starts_with("Course: Intro to Rust\nLesson 3: Lesson title 3"));
            assert!(c.text().ends_with(&c.body));
        }
    }

    #[test]
    fn test_chunk_course_restarts_indices_per_lesson() {
        let course = Course {
            title: "C".to_string(),
            course_link: None,
            instructor: None,
            lessons: vec![lesson(1, &numbered_body(30)), lesson(2, ""), lesson(3, &numbered_body(30))],
        };
        let chunks = chunk_course(
            &course,
            ChunkingParams {
                chunk_size: 20,
                chunk_overlap: 5,
            },
        );
        let keys: Vec<(u32, u32)> = chunks
            .iter()
            .map(|c| (c.lesson_number, c.chunk_index))
            .collect();
        assert_eq!(keys, vec![(1, 0), (1, 1), (3, 0), (3, 1)]);
    }
}
