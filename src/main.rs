//! # Course RAG CLI (`course-rag`)
//!
//! Ingest course documents, ask questions about them, and serve the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! course-rag --config ./config/course-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `course-rag ingest <path>` | Ingest a document or a folder of documents |
//! | `course-rag query "<question>"` | Answer one question |
//! | `course-rag stats` | Print catalog statistics |
//! | `course-rag serve` | Ingest the docs folder and start the HTTP server |
//!
//! With the in-memory store nothing survives the process, so `query` and
//! `stats` ingest the configured docs folder first. Use `[store] backend =
//! "sqlite"` to ingest once and query later.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use course_rag::assistant::CourseAssistant;
use course_rag::config::{self, Config};
use course_rag::{logging, server};

/// Course RAG: question answering over structured course documents.
#[derive(Parser)]
#[command(
    name = "course-rag",
    about = "Retrieval-augmented question answering over structured course documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/course-rag.toml`. When the file does not exist
    /// the built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/course-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a course document or every matching document in a folder.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Clear both collections before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// Ask a question about the indexed courses.
    Query {
        /// The question.
        text: String,

        /// Continue an existing conversation.
        #[arg(long)]
        session: Option<String>,
    },

    /// Show the number of indexed courses and their titles.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn load(path: &Path) -> anyhow::Result<(Config, bool)> {
    if path.exists() {
        Ok((config::load_config(path)?, true))
    } else {
        Ok((Config::default(), false))
    }
}

/// The memory store starts empty on every run, so it is filled from `[docs]`.
async fn with_docs(cfg: &Config, assistant: CourseAssistant) -> anyhow::Result<CourseAssistant> {
    if cfg.store.backend == "memory" {
        assistant.ingest_configured_docs().await?;
    }
    Ok(assistant)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (cfg, found) = load(&cli.config)?;
    logging::init_with_config(&cfg.logging);
    if !found {
        tracing::info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Ingest { path, clear } => {
            let assistant = CourseAssistant::for_indexing(&cfg).await?;
            let report = assistant
                .ingest_folder(&path, clear)
                .await
                .with_context(|| format!("Failed to ingest {}", path.display()))?;

            println!(
                "Ingested {} courses ({} chunks), skipped {}, failed {}",
                report.added.len(),
                report.chunks_written,
                report.skipped.len(),
                report.failed.len()
            );
            for title in &report.added {
                println!("  + {}", title);
            }
            for title in &report.skipped {
                println!("  = {} (already indexed)", title);
            }
            for (file, reason) in &report.failed {
                println!("  ! {}: {}", file.display(), reason);
            }
        }
        Commands::Query { text, session } => {
            let assistant = with_docs(&cfg, CourseAssistant::from_config(&cfg).await?).await?;
            let response = assistant.query(&text, session.as_deref()).await?;

            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &response.sources {
                    match &source.lesson_link {
                        Some(link) => println!("  - {} ({})", source.label(), link),
                        None => println!("  - {}", source.label()),
                    }
                }
            }
            println!();
            println!("session: {}", response.session_id);
        }
        Commands::Stats => {
            let assistant = with_docs(&cfg, CourseAssistant::for_indexing(&cfg).await?).await?;
            let stats = assistant.catalog_stats().await?;
            println!("Courses: {}", stats.course_count);
            for title in &stats.titles {
                println!("  - {}", title);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
