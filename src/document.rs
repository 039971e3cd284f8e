//! Course document parser.
//!
//! Turns one structured text document into a [`Course`] with its
//! [`Lesson`]s. The expected layout is:
//!
//! ```text
//! Course Title: Intro to Rust
//! Course Link: https://example.com/rust
//! Course Instructor: Ferris
//!
//! Lesson 0: Welcome
//! Lesson Link: https://example.com/rust/0
//! Body text for lesson zero...
//!
//! Lesson 1: Ownership
//! Body text for lesson one...
//! ```
//!
//! # State machine
//!
//! 1. **Header**: `Course Title:`, `Course Link:` and `Course Instructor:`
//!    lines in any order; blank lines are ignored. Other text before the
//!    first lesson marker is discarded.
//! 2. **Lesson**: entered on a line of the form `Lesson <n>: <title>`.
//!    A `Lesson Link:` line directly after the marker sets the link; all
//!    following lines up to the next marker (or end of input) form the body.
//!
//! A missing or empty `Course Title:` is a parse error, as is a lesson
//! number that appears twice in one document.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Course, Lesson};

const TITLE_PREFIX: &str = "course title:";
const LINK_PREFIX: &str = "course link:";
const INSTRUCTOR_PREFIX: &str = "course instructor:";
const LESSON_LINK_PREFIX: &str = "lesson link:";

/// Parse raw document text into a [`Course`].
pub fn parse_course(text: &str) -> Result<Course> {
    let mut title: Option<String> = None;
    let mut course_link: Option<String> = None;
    let mut instructor: Option<String> = None;

    let mut lessons: Vec<Lesson> = Vec::new();
    let mut current: Option<LessonBuilder> = None;
    let mut seen_numbers: HashSet<u32> = HashSet::new();

    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    for line in text.lines() {
        if let Some((number, lesson_title)) = parse_lesson_marker(line) {
            if let Some(done) = current.take() {
                lessons.push(done.finish());
            }
            if !seen_numbers.insert(number) {
                return Err(Error::parse(format!("duplicate lesson number {}", number)));
            }
            current = Some(LessonBuilder::new(number, lesson_title));
            continue;
        }

        match current.as_mut() {
            None => {
                if let Some(value) = header_value(line, TITLE_PREFIX) {
                    title = Some(value);
                } else if let Some(value) = header_value(line, LINK_PREFIX) {
                    course_link = non_empty(value);
                } else if let Some(value) = header_value(line, INSTRUCTOR_PREFIX) {
                    instructor = non_empty(value);
                }
            }
            Some(lesson) => lesson.push_line(line),
        }
    }

    if let Some(done) = current.take() {
        lessons.push(done.finish());
    }

    let title = title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::parse("missing required 'Course Title:' header"))?;

    Ok(Course {
        title,
        course_link,
        instructor,
        lessons,
    })
}

/// Accumulates one lesson block while parsing.
struct LessonBuilder {
    number: u32,
    title: String,
    link: Option<String>,
    lines: Vec<String>,
    /// Whether a `Lesson Link:` line may still appear.
    awaiting_link: bool,
}

impl LessonBuilder {
    fn new(number: u32, title: String) -> Self {
        Self {
            number,
            title,
            link: None,
            lines: Vec::new(),
            awaiting_link: true,
        }
    }

    fn push_line(&mut self, line: &str) {
        if self.awaiting_link {
            if line.trim().is_empty() {
                return;
            }
            self.awaiting_link = false;
            if let Some(link) = header_value(line, LESSON_LINK_PREFIX) {
                self.link = non_empty(link);
                return;
            }
        }
        self.lines.push(line.to_string());
    }

    fn finish(self) -> Lesson {
        Lesson {
            lesson_number: self.number,
            title: self.title,
            lesson_link: self.link,
            body: self.lines.join("\n").trim().to_string(),
        }
    }
}

/// Match `Lesson <n>: <title>` (case-insensitive keyword, any spacing).
fn parse_lesson_marker(line: &str) -> Option<(u32, String)> {
    let trimmed = line.trim();
    let keyword = trimmed.get(..6)?;
    if !keyword.eq_ignore_ascii_case("lesson") {
        return None;
    }
    let rest = trimmed[6..].trim_start();
    let digits_end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let number: u32 = rest[..digits_end].parse().ok()?;
    let after = rest[digits_end..].trim_start();
    let title = after.strip_prefix(':')?;
    Some((number, title.trim().to_string()))
}

/// Return the trimmed value after `prefix` if `line` starts with it (case-insensitive).
fn header_value(line: &str, prefix: &str) -> Option<String> {
    let trimmed = line.trim();
    let head = trimmed.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(trimmed[prefix.len()..].trim().to_string())
    } else {
        None
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Course Title: Intro to Rust\n\
Course Link: https://example.com/rust\n\
Course Instructor: Ferris\n\
\n\
Lesson 0: Welcome\n\
Lesson Link: https://example.com/rust/0\n\
Rust is a systems language.\n\
It is fast.\n\
\n\
Lesson 1: Ownership\n\
Every value has an owner.\n";

    #[test]
    fn test_leading_byte_order_mark_is_ignored() {
        let course = parse_course(&format!("\u{feff}{}", SAMPLE)).unwrap();
        assert_eq!(course.title, "Intro to Rust");
        assert_eq!(course.lessons.len(), 2);
    }

    #[test]
    fn test_parses_header_and_lessons() {
        let course = parse_course(SAMPLE).unwrap();
        assert_eq!(course.title, "Intro to Rust");
        assert_eq!(course.course_link.as_deref(), Some("https://example.com/rust"));
        assert_eq!(course.instructor.as_deref(), Some("Ferris"));
        assert_eq!(course.lessons.len(), 2);

        let l0 = &course.lessons[0];
        assert_eq!(l0.lesson_number, 0);
        assert_eq!(l0.title, "Welcome");
        assert_eq!(l0.lesson_link.as_deref(), Some("https://example.com/rust/0"));
        assert_eq!(l0.body, "Rust is a systems language.\nIt is fast.");

        let l1 = &course.lessons[1];
        assert_eq!(l1.lesson_number, 1);
        assert_eq!(l1.lesson_link, None);
        assert_eq!(l1.body, "Every value has an owner.");
    }

    #[test]
    fn test_missing_title_is_parse_error() {
        let err = parse_course("Course Link: x\n\nLesson 1: A\nbody").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_empty_title_is_parse_error() {
        let err = parse_course("Course Title:   \nLesson 1: A\nbody").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_header_only_has_no_lessons() {
        let course = parse_course("Course Title: Empty Course").unwrap();
        assert_eq!(course.title, "Empty Course");
        assert!(course.lessons.is_empty());
        assert_eq!(course.instructor, None);
    }

    #[test]
    fn test_title_after_lessons_is_not_a_header() {
        let err = parse_course("Lesson 1: A\nCourse Title: Late").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_duplicate_lesson_number_rejected() {
        let text = "Course Title: T\nLesson 1: A\nx\nLesson 1: B\ny";
        assert!(parse_course(text).is_err());
    }

    #[test]
    fn test_lesson_marker_variants() {
        assert_eq!(parse_lesson_marker("Lesson 3: Traits"), Some((3, "Traits".into())));
        assert_eq!(parse_lesson_marker("  lesson 12 :  Async "), Some((12, "Async".into())));
        assert_eq!(parse_lesson_marker("Lesson three: nope"), None);
        assert_eq!(parse_lesson_marker("Lessons 1: nope"), None);
        assert_eq!(parse_lesson_marker("Lesson 4 without colon"), None);
    }

    #[test]
    fn test_link_only_recognized_directly_after_marker() {
        let text = "Course Title: T\nLesson 1: A\nfirst line\nLesson Link: not-a-link";
        let course = parse_course(text).unwrap();
        assert_eq!(course.lessons[0].lesson_link, None);
        assert!(course.lessons[0].body.ends_with("Lesson Link: not-a-link"));
    }
}
