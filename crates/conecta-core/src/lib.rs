//! # Conecta Core
//!
//! Shared, I/O-free logic for Conecta: data models, chunking, the embedding
//! and generation traits, the vector index abstraction, retrieval, prompt
//! assembly, response sanitization, topic extraction, and the ingestion and
//! question-answering pipelines that tie them together.
//!
//! This crate contains no tokio, sqlx, filesystem or network code. Concrete
//! providers and persistent stores live in the `conecta` app crate and are
//! handed to the pipelines at construction time.
//!
//! ## Data Flow
//!
//! ```text
//! ingest:  pages ─▶ chunk ─▶ embed_texts ─▶ VectorIndex::upsert ─▶ DocumentStore
//! ask:     question ─▶ embed_query ─▶ VectorIndex::query(user) ─▶ prompt ─▶ Generator ─▶ sanitize
//! topics:  transcript ─▶ prompt ─▶ Generator ─▶ sanitize ─▶ split/dedup
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod sanitize;
pub mod store;
pub mod topics;

pub use error::{RagError, Result};
