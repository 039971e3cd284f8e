//! # Course RAG
//!
//! Retrieval-augmented question answering over structured course documents.
//!
//! Course documents are parsed into courses and lessons, split into
//! overlapping context-prefixed chunks, and indexed in two collections: a
//! **catalog** of course metadata (used to resolve fuzzy course names) and
//! the **content** chunks themselves. At query time a generation backend
//! decides whether to call the retrieval tools before answering; answers
//! carry the sources used and are remembered per session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────────────┐
//! │ document │──▶│   chunk   │──▶│ index (catalog +    │
//! │  parser  │   │ + embed   │   │        content)     │
//! └──────────┘   └───────────┘   └──────────┬──────────┘
//!                                           │ search / resolve
//!   query ──▶ assistant ──▶ generation ◀──▶ tools
//!               │
//!               └── session (bounded history)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Library error type |
//! | [`models`] | Core data types |
//! | [`document`] | Course document parser |
//! | [`chunk`] | Sliding-window chunker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store backends (memory, SQLite) |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`index`] | Dual-collection vector index |
//! | [`session`] | Per-session conversation history |
//! | [`tools`] | Backend-callable tools and registry |
//! | [`generation`] | Generation backend abstraction |
//! | [`docs`] | Document discovery on disk |
//! | [`assistant`] | Ingest / query / stats entry point |
//! | [`server`] | HTTP API |

pub mod assistant;
pub mod chunk;
pub mod config;
pub mod db;
pub mod docs;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod server;
pub mod session;
pub mod store;
pub mod tools;
