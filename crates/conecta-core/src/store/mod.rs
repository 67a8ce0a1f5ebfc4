//! Storage abstraction for Conecta.
//!
//! [`VectorIndex`] holds the embedded chunks and answers user-filtered
//! nearest-neighbour queries; [`DocumentStore`] holds one provenance record
//! per ingested file. Both are async (via `async-trait`) so that SQLite and
//! in-memory backends share one interface.
//!
//! The user filter is applied inside the index. An empty query result
//! means "no matches", while any failure to reach the backend is an
//! [`IndexUnavailable`](crate::RagError::IndexUnavailable) error.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{RagError, Result};
use crate::models::{Document, VectorRecord};

pub use memory::{InMemoryDocumentStore, InMemoryIndex};

/// Exact-match metadata filter applied to every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFilter {
    pub user_id: String,
}

impl UserFilter {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A query hit with its cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

/// Nearest-neighbour index over [`VectorRecord`]s.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Idempotent add, keyed by record id |
/// | [`query`](VectorIndex::query) | Top-`k` records of one user, descending similarity |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Add records. Ids already present are left untouched.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Return at most `k` records whose `user_id` equals the filter.
    async fn query(
        &self,
        vector: &[f32],
        filter: &UserFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>>;
}

/// Provenance records for ingested files.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Documents of one user, oldest first.
    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>>;
}

/// Check that every vector has the index dimensionality.
pub fn ensure_dims(expected: usize, vectors: &[&[f32]]) -> Result<()> {
    for v in vectors {
        if v.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: v.len(),
            });
        }
    }
    Ok(())
}

/// Sort hits by descending score and keep the first `k`.
///
/// The sort is stable, so equal scores keep insertion order.
pub fn rank(mut hits: Vec<ScoredRecord>, k: usize) -> Vec<ScoredRecord> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    hits
}

/// `k` must be positive for every query.
pub fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RagError::input("k must be a positive integer"));
    }
    Ok(())
}
