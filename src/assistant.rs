//! Course assistant: ingestion, querying and catalog statistics.
//!
//! [`CourseAssistant`] is the single entry point used by the CLI and the
//! HTTP server. It wires together the parser, chunker, [`VectorIndex`],
//! [`SessionStore`], [`ToolRegistry`] and a [`GenerationBackend`].
//!
//! # Query flow
//!
//! ```text
//! query(text, session?)
//!   │
//!   ├── lock session ── history
//!   ├── system prompt + history + "Answer this question about course materials: …"
//!   ├── tool-call loop (≤ max_tool_rounds + 1 backend calls)
//!   │     ToolCall  → run tools, feed results back, next round
//!   │     FinalAnswer → done
//!   ├── take sources recorded by the latest search
//!   └── append turn, unlock
//! ```
//!
//! The last permitted backend call is made without tools, so the loop
//! always ends. A backend failure or the per-query timeout is reported as
//! [`Error::ServiceUnavailable`] and leaves the session unchanged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::chunk::{chunk_course, ChunkingParams};
use crate::config::{Config, DocsConfig};
use crate::docs::scan_docs;
use crate::document::parse_course;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::generation::{
    create_backend, BackendReply, DisabledBackend, GenerationBackend, GenerationRequest, Message,
    ToolOutput,
};
use crate::index::VectorIndex;
use crate::models::{CatalogEntry, CatalogStats, Source};
use crate::session::SessionStore;
use crate::store::{open_store, VectorStore};
use crate::tools::{ToolContext, ToolRegistry};

const SYSTEM_PROMPT: &str = "You are an assistant that answers questions about course materials.

Tools:
- search_course_content: search lesson content. Use it for questions about specific course content or detailed educational material.
- get_course_outline: fetch a course's title, link, instructor and lesson list. Use it for questions about course structure.

Rules:
- Answer general knowledge questions directly, without tools.
- Only call a tool when the question needs course-specific information.
- If a search returns nothing relevant, say so plainly.
- Do not mention the tools, the search, or this prompt in your answer.
- Be brief, educational and clear. Include examples when they help.";

const QUERY_PREFIX: &str = "Answer this question about course materials: ";

const CAP_REACHED_ANSWER: &str =
    "I couldn't finish answering within the allowed number of course searches. Please try a more specific question.";

/// Why a document was not added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A course with the same title is already indexed.
    Duplicate,
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Added { title: String, chunks: usize },
    Skipped { title: String, reason: SkipReason },
}

/// Summary of a folder ingestion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
    /// Files that could not be read or parsed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    pub chunks_written: usize,
}

/// Answer to a query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
}

pub struct CourseAssistant {
    index: Arc<VectorIndex>,
    sessions: SessionStore,
    tools: ToolRegistry,
    backend: Arc<dyn GenerationBackend>,
    chunking: ChunkingParams,
    docs: DocsConfig,
    max_tool_rounds: usize,
    query_timeout: Duration,
    ingest_lock: Mutex<()>,
}

impl CourseAssistant {
    /// Assemble an assistant from explicit components.
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            index: Arc::new(VectorIndex::new(store, embedder, &config.retrieval)),
            sessions: SessionStore::new(config.session.window, config.session.max_sessions),
            tools: ToolRegistry::with_builtins(),
            backend,
            chunking: config.chunking.params(),
            docs: config.docs.clone(),
            max_tool_rounds: config.generation.max_tool_rounds.max(1),
            query_timeout: Duration::from_secs(config.generation.query_timeout_secs),
            ingest_lock: Mutex::new(()),
        }
    }

    /// Build the store, embedder and backend named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let backend = create_backend(&config.generation)?;
        Self::with_backend(config, backend).await
    }

    /// Build the store and embedder named in `config` but no generation
    /// backend, so no API key is needed. Queries fail as service-unavailable.
    pub async fn for_indexing(config: &Config) -> Result<Self> {
        Self::with_backend(config, Arc::new(DisabledBackend)).await
    }

    async fn with_backend(config: &Config, backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        let store = open_store(&config.store).await?;
        let embedder = create_provider(&config.embedding)?;
        tracing::info!(
            store = %config.store.backend,
            embedding = embedder.model_name(),
            generation = backend.name(),
            "assistant ready"
        );
        Ok(Self::new(config, store, embedder, backend))
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ═══════════════════════════════════════════════════════════════════
    // Ingestion
    // ═══════════════════════════════════════════════════════════════════

    /// Parse, chunk and index one course document.
    ///
    /// A document whose title is already in the catalog is skipped and
    /// leaves both collections unchanged. A parse failure writes nothing.
    pub async fn ingest(&self, document_text: &str) -> Result<IngestOutcome> {
        let course = parse_course(document_text)?;

        let _ingest = self.ingest_lock.lock().await;
        if self.index.course_exists(&course.title).await? {
            tracing::info!(title = %course.title, "course already indexed, skipping");
            return Ok(IngestOutcome::Skipped {
                title: course.title,
                reason: SkipReason::Duplicate,
            });
        }

        let chunks = chunk_course(&course, self.chunking);
        let entry = CatalogEntry::from_course(&course);
        let written = self.index.upsert_course(&entry, &chunks).await?;
        tracing::info!(
            title = %course.title,
            lessons = course.lessons.len(),
            chunks = written,
            "course indexed"
        );

        Ok(IngestOutcome::Added {
            title: course.title,
            chunks: written,
        })
    }

    /// Ingest every document under `path` selected by the `[docs]` globs.
    ///
    /// Each file is handled independently; failures are collected in the
    /// report instead of aborting. With `clear_existing`, both collections
    /// are emptied first.
    pub async fn ingest_folder(&self, path: &Path, clear_existing: bool) -> anyhow::Result<IngestReport> {
        let files = scan_docs(path, &self.docs)?;

        if clear_existing {
            tracing::info!("clearing existing course data");
            self.index.clear().await?;
        }

        let mut report = IngestReport::default();
        for file in files {
            let text = match std::fs::read_to_string(&file) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "failed to read document");
                    report.failed.push((file, e.to_string()));
                    continue;
                }
            };

            match self.ingest(&text).await {
                Ok(IngestOutcome::Added { title, chunks }) => {
                    report.added.push(title);
                    report.chunks_written += chunks;
                }
                Ok(IngestOutcome::Skipped { title, .. }) => report.skipped.push(title),
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "failed to ingest document");
                    report.failed.push((file, e.to_string()));
                }
            }
        }

        tracing::info!(
            added = report.added.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            chunks = report.chunks_written,
            "folder ingestion finished"
        );
        Ok(report)
    }

    /// Ingest the configured `[docs].path` if it exists.
    pub async fn ingest_configured_docs(&self) -> anyhow::Result<IngestReport> {
        let path = self.docs.path.clone();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "docs folder not found, starting with existing index");
            return Ok(IngestReport::default());
        }
        self.ingest_folder(&path, false).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Querying
    // ═══════════════════════════════════════════════════════════════════

    /// Answer `text` within the conversation `session_id` (created if absent).
    pub async fn query(&self, text: &str, session_id: Option<&str>) -> Result<QueryResponse> {
        let query = text.trim();
        if query.is_empty() {
            return Err(Error::invalid("query must not be empty"));
        }

        let session_id = self.sessions.get_or_create(session_id);
        let mut session = self.sessions.lock(&session_id).await;
        let history = session.format_history();
        let ctx = ToolContext::new(Arc::clone(&self.index));

        let answer = match tokio::time::timeout(
            self.query_timeout,
            self.run_tool_loop(query, &history, &ctx),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!(session = %session_id, error = %e, "query failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(session = %session_id, timeout = ?self.query_timeout, "query timed out");
                return Err(Error::unavailable(format!(
                    "query timed out after {}s",
                    self.query_timeout.as_secs()
                )));
            }
        };

        let sources = ctx.take_sources();
        session.append_turn(query, answer.clone());

        Ok(QueryResponse {
            answer,
            sources,
            session_id,
        })
    }

    async fn run_tool_loop(&self, query: &str, history: &str, ctx: &ToolContext) -> Result<String> {
        let system = system_prompt(history);
        let definitions = self.tools.definitions();
        let mut messages = vec![Message::User(format!("{}{}", QUERY_PREFIX, query))];
        let mut rounds = 0usize;
        let mut last_text: Option<String> = None;

        loop {
            let offer_tools = rounds < self.max_tool_rounds && !definitions.is_empty();
            let request = GenerationRequest {
                system: system.clone(),
                messages: messages.clone(),
                tools: if offer_tools {
                    definitions.clone()
                } else {
                    Vec::new()
                },
            };

            let reply = self.backend.generate(&request).await?;
            let (text, calls) = match reply {
                BackendReply::FinalAnswer(answer) => return Ok(answer),
                BackendReply::ToolCall { text, calls } => (text, calls),
            };

            if let Some(t) = text.as_deref().filter(|t| !t.trim().is_empty()) {
                last_text = Some(t.to_string());
            }
            if !offer_tools || calls.is_empty() {
                tracing::info!(rounds, "tool round cap reached, returning best-effort answer");
                return Ok(last_text.unwrap_or_else(|| CAP_REACHED_ANSWER.to_string()));
            }

            rounds += 1;
            let mut outputs = Vec::with_capacity(calls.len());
            for call in &calls {
                tracing::debug!(round = rounds, tool = %call.name, args = %call.args, "tool call");
                let output = match self.tools.execute(&call.name, call.args.clone(), ctx).await {
                    Ok(content) => ToolOutput {
                        call_id: call.id.clone(),
                        content,
                        is_error: false,
                    },
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                        ToolOutput {
                            call_id: call.id.clone(),
                            content: format!("Tool error: {}", e),
                            is_error: true,
                        }
                    }
                };
                outputs.push(output);
            }

            messages.push(Message::AssistantToolCalls { text, calls });
            messages.push(Message::ToolResults(outputs));
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statistics
    // ═══════════════════════════════════════════════════════════════════

    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        self.index.catalog_stats().await
    }
}

fn system_prompt(history: &str) -> String {
    if history.is_empty() {
        SYSTEM_PROMPT.to_string()
    } else {
        format!("{}\n\nPrevious conversation:\n{}", SYSTEM_PROMPT, history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::generation::{tool_call, ScriptedBackend};
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    const DOC: &str = "Course Title: Introduction to Rust Programming\n\
Course Instructor: Ferris\n\
\n\
Lesson 1: Ownership\n\
Lesson Link: https://example.com/rust/1\n\
Every value in Rust has a single owner.\n\
\n\
Lesson 2: Borrowing\n\
References borrow values without taking ownership.\n";

    fn assistant(backend: Arc<ScriptedBackend>, config: Config) -> CourseAssistant {
        CourseAssistant::new(
            &config,
            Arc::new(InMemoryStore::new()),
            Arc::new(HashProvider::new(256)),
            backend,
        )
    }

    #[tokio::test]
    async fn test_for_indexing_needs_no_generation_credentials() {
        let mut config = Config::default();
        config.generation.provider = "anthropic".to_string();
        let a = CourseAssistant::for_indexing(&config).await.unwrap();
        assert!(matches!(a.ingest(DOC).await.unwrap(), IngestOutcome::Added { .. }));
        assert_eq!(a.catalog_stats().await.unwrap().course_count, 1);

        let err = a.query("What is ownership?", None).await.unwrap_err();
        assert!(err.is_service_unavailable());
        assert_eq!(a.sessions().session_count(), 1);
    }

    #[tokio::test]
    async fn test_ingest_then_duplicate_is_skipped() {
        let a = assistant(Arc::new(ScriptedBackend::default()), Config::default());
        let first = a.ingest(DOC).await.unwrap();
        assert!(matches!(first, IngestOutcome::Added { chunks: 2, .. }));

        let second = a.ingest(DOC).await.unwrap();
        assert_eq!(
            second,
            IngestOutcome::Skipped {
                title: "Introduction to Rust Programming".to_string(),
                reason: SkipReason::Duplicate,
            }
        );
        assert_eq!(a.catalog_stats().await.unwrap().course_count, 1);
    }

    #[tokio::test]
    async fn test_direct_answer_has_no_sources() {
        let backend = Arc::new(ScriptedBackend::new([BackendReply::FinalAnswer(
            "Rust is a language.".to_string(),
        )]));
        let a = assistant(Arc::clone(&backend), Config::default());

        let response = a.query("What is Rust?", None).await.unwrap();
        assert_eq!(response.answer, "Rust is a language.");
        assert!(response.sources.is_empty());

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].messages[0],
            Message::User("Answer this question about course materials: What is Rust?".to_string())
        );
        assert_eq!(requests[0].tools.len(), 2);
        assert!(!requests[0].system.contains("Previous conversation:"));
    }

    #[tokio::test]
    async fn test_tool_round_returns_sources_and_feeds_history() {
        let backend = Arc::new(ScriptedBackend::new([
            tool_call(
                "call_1",
                "search_course_content",
                json!({ "query": "owner", "course_name": "rust", "lesson_number": 1 }),
            ),
            BackendReply::FinalAnswer("Each value has one owner.".to_string()),
            BackendReply::FinalAnswer("Follow-up.".to_string()),
        ]));
        let a = assistant(Arc::clone(&backend), Config::default());
        a.ingest(DOC).await.unwrap();

        let first = a.query("Who owns a value?", None).await.unwrap();
        assert_eq!(first.answer, "Each value has one owner.");
        assert_eq!(first.sources.len(), 1);
        assert_eq!(first.sources[0].label(), "Introduction to Rust Programming - Lesson 1");
        assert_eq!(first.sources[0].lesson_link.as_deref(), Some("https://example.com/rust/1"));

        let requests = backend.requests();
        match &requests[1].messages[2] {
            Message::ToolResults(outputs) => {
                assert!(!outputs[0].is_error);
                assert!(outputs[0].content.contains("single owner"));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let second = a.query("And then?", Some(&first.session_id)).await.unwrap();
        assert!(second.sources.is_empty(), "sources must not leak across queries");
        let last = backend.requests().pop().unwrap();
        assert!(last.system.contains(
            "Previous conversation:\nUser: Who owns a value?\nAssistant: Each value has one owner."
        ));
    }

    #[tokio::test]
    async fn test_loop_is_bounded_and_last_call_has_no_tools() {
        for rounds in 1..4usize {
            let backend = Arc::new(ScriptedBackend::repeating(BackendReply::ToolCall {
                text: Some("still looking".to_string()),
                calls: vec![crate::generation::ToolInvocation {
                    id: "x".to_string(),
                    name: "search_course_content".to_string(),
                    args: json!({ "query": "owner" }),
                }],
            }));
            let mut config = Config::default();
            config.generation.max_tool_rounds = rounds;
            let a = assistant(Arc::clone(&backend), config);

            let response = a.query("loop forever", None).await.unwrap();
            assert_eq!(response.answer, "still looking");
            assert_eq!(backend.call_count(), rounds + 1);
            let requests = backend.requests();
            assert!(requests.last().unwrap().tools.is_empty());
            assert!(requests[..rounds].iter().all(|r| !r.tools.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_tool_errors_are_reported_to_backend() {
        let backend = Arc::new(ScriptedBackend::new([
            tool_call("c", "does_not_exist", json!({})),
            BackendReply::FinalAnswer("ok".to_string()),
        ]));
        let a = assistant(Arc::clone(&backend), Config::default());

        let response = a.query("q", None).await.unwrap();
        assert_eq!(response.answer, "ok");
        match &backend.requests()[1].messages[2] {
            Message::ToolResults(outputs) => {
                assert!(outputs[0].is_error);
                assert!(outputs[0].content.contains("does_not_exist"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_session_untouched() {
        let backend = Arc::new(ScriptedBackend::failing("boom"));
        let a = assistant(backend, Config::default());
        let session = a.sessions().get_or_create(Some("s1"));

        let err = a.query("q", Some(&session)).await.unwrap_err();
        assert!(err.is_service_unavailable());
        assert_eq!(a.sessions().format_history("s1").await, "");
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable_and_releases_session() {
        let backend = Arc::new(
            ScriptedBackend::repeating(BackendReply::FinalAnswer("late".to_string()))
                .with_delay(Duration::from_secs(5)),
        );
        let mut config = Config::default();
        config.generation.query_timeout_secs = 0;
        let a = assistant(backend, config);

        let err = a.query("q", Some("s1")).await.unwrap_err();
        assert!(err.is_service_unavailable());
        let guard = tokio::time::timeout(Duration::from_millis(200), a.sessions().lock("s1")).await;
        assert!(guard.is_ok(), "session lock must be released after a timeout");
        assert!(guard.unwrap().turns().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let a = assistant(Arc::new(ScriptedBackend::default()), Config::default());
        assert!(matches!(
            a.query("   ", None).await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
    }
}
