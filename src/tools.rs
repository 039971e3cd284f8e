//! Tools the generation backend can call during a query.
//!
//! # Built-in tools
//!
//! | Name | Purpose | Records sources |
//! |------|---------|-----------------|
//! | `search_course_content` | filtered semantic search over lesson content | yes |
//! | `get_course_outline` | title, link, instructor and lesson list of one course | no |
//!
//! Every query gets a fresh [`ToolContext`]. The search tool writes the
//! structured [`Source`]s of its most recent invocation into that
//! context; the orchestrator takes them once the query finishes, so
//! sources never leak from one query into another.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::index::{SearchFilters, VectorIndex};
use crate::models::Source;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A capability the generation backend may invoke.
///
/// # Lifecycle
///
/// 1. The tool is registered via [`ToolRegistry::register`].
/// 2. [`name`](Tool::name), [`description`](Tool::description) and
///    [`parameters_schema`](Tool::parameters_schema) are sent to the
///    backend with every tool-enabled request.
/// 3. [`execute`](Tool::execute) runs each time the backend asks for it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, unique within a registry.
    fn name(&self) -> &str;

    /// What the tool does; the backend reads this to decide whether to call it.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments (`type: "object"`).
    fn parameters_schema(&self) -> Value;

    /// Run the tool.
    ///
    /// # Arguments
    ///
    /// * `params`: arguments chosen by the backend (a JSON object).
    /// * `ctx`: the current query's context.
    ///
    /// # Returns
    ///
    /// Text that is handed back to the backend as the tool result.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String>;
}

/// Tool description in the shape generation backends expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Per-query context shared by all tool calls of that query.
pub struct ToolContext {
    index: Arc<VectorIndex>,
    sources: Mutex<Vec<Source>>,
}

impl ToolContext {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self {
            index,
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Replace the recorded sources with those of the latest search.
    pub fn record_sources(&self, sources: Vec<Source>) {
        *self.sources.lock() = sources;
    }

    pub fn sources(&self) -> Vec<Source> {
        self.sources.lock().clone()
    }

    /// Take the recorded sources, leaving the record empty.
    pub fn take_sources(&self) -> Vec<Source> {
        std::mem::take(&mut *self.sources.lock())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default)]
    lesson_number: Option<u32>,
}

/// `search_course_content`: semantic search with optional course and lesson filters.
pub struct CourseSearchTool;

#[async_trait]
impl Tool for CourseSearchTool {
    fn name(&self) -> &str {
        "search_course_content"
    }

    fn description(&self) -> &str {
        "Search course materials with smart course name matching and lesson filtering"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for in the course content"
                },
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                },
                "lesson_number": {
                    "type": "integer",
                    "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let params: SearchParams = serde_json::from_value(params)
            .map_err(|e| Error::invalid(format!("search_course_content: {}", e)))?;

        let filters = SearchFilters {
            course_name: params.course_name.clone(),
            lesson_number: params.lesson_number,
        };
        let results = ctx.index().search(&params.query, &filters, None).await?;

        if let Some(note) = results.note {
            ctx.record_sources(Vec::new());
            return Ok(note);
        }

        if results.hits.is_empty() {
            ctx.record_sources(Vec::new());
            let mut message = "No relevant content found".to_string();
            if let Some(course) = results.resolved_course.as_deref() {
                message.push_str(&format!(" in course '{}'", course));
            }
            if let Some(lesson) = params.lesson_number {
                message.push_str(&format!(" in lesson {}", lesson));
            }
            message.push('.');
            return Ok(message);
        }

        let mut blocks = Vec::with_capacity(results.hits.len());
        let mut sources = Vec::with_capacity(results.hits.len());
        for hit in &results.hits {
            let record = &hit.record;
            let lesson_link = ctx
                .index()
                .catalog_entry(&record.course_title)
                .await?
                .and_then(|entry| {
                    entry
                        .lesson(record.lesson_number)
                        .and_then(|l| l.lesson_link.clone())
                });
            let source = Source {
                course_title: record.course_title.clone(),
                lesson_number: Some(record.lesson_number),
                chunk_index: Some(record.chunk_index),
                lesson_link,
            };
            blocks.push(format!("[{}]\n{}", source.label(), record.body()));
            sources.push(source);
        }

        ctx.record_sources(sources);
        Ok(blocks.join("\n\n"))
    }
}

#[derive(Debug, Deserialize)]
struct OutlineParams {
    course_name: String,
}

/// `get_course_outline`: catalog metadata and lesson list for one course.
pub struct CourseOutlineTool;

#[async_trait]
impl Tool for CourseOutlineTool {
    fn name(&self) -> &str {
        "get_course_outline"
    }

    fn description(&self) -> &str {
        "Get a course outline: title, link, instructor and the numbered list of lessons"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work)"
                }
            },
            "required": ["course_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let params: OutlineParams = serde_json::from_value(params)
            .map_err(|e| Error::invalid(format!("get_course_outline: {}", e)))?;

        let Some(title) = ctx.index().resolve_course_name(&params.course_name).await? else {
            return Ok(format!("No course found matching '{}'", params.course_name));
        };
        let Some(entry) = ctx.index().catalog_entry(&title).await? else {
            return Ok(format!("No course found matching '{}'", params.course_name));
        };

        let mut out = format!("Course: {}\n", entry.title);
        if let Some(link) = &entry.course_link {
            out.push_str(&format!("Link: {}\n", link));
        }
        if let Some(instructor) = &entry.instructor {
            out.push_str(&format!("Instructor: {}\n", instructor));
        }
        out.push_str(&format!("Lessons ({}):", entry.lesson_count));
        for lesson in &entry.lessons {
            out.push_str(&format!("\n  Lesson {}: {}", lesson.lesson_number, lesson.lesson_title));
        }
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of callable tools, dispatched by name.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with `search_course_content` and `get_course_outline`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CourseSearchTool));
        registry.register(Box::new(CourseOutlineTool));
        registry
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Definitions for every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    /// Run the named tool.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<String> {
        let tool = self
            .find(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        tool.execute(params, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
