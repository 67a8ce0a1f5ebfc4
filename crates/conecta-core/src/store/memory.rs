//! In-memory [`VectorIndex`] and [`DocumentStore`] implementations.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`: writes are serialized
//! by the lock, reads run concurrently. Vector search is brute-force cosine
//! similarity over the records of the filtered user.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Document, VectorRecord};

use super::{ensure_dims, rank, validate_k, DocumentStore, ScoredRecord, UserFilter, VectorIndex};

#[derive(Default)]
struct IndexState {
    /// Fixed at construction or by the first write.
    dims: Option<usize>,
    ids: HashSet<String>,
    records: Vec<VectorRecord>,
}

/// In-memory vector index for tests and offline use.
#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    /// Index whose dimensionality is set by the first upsert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that only accepts vectors of `dims` components.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            state: RwLock::new(IndexState {
                dims: Some(dims),
                ..IndexState::default()
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> RagError {
    RagError::index_unavailable("in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let expected = match (state.dims, records.first()) {
            (Some(dims), _) => dims,
            (None, Some(first)) => first.vector.len(),
            (None, None) => return Ok(()),
        };
        let vectors: Vec<&[f32]> = records.iter().map(|r| r.vector.as_slice()).collect();
        ensure_dims(expected, &vectors)?;
        state.dims = Some(expected);

        for record in records {
            if state.ids.insert(record.id.clone()) {
                state.records.push(record.clone());
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &UserFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        validate_k(k)?;
        let state = self.state.read().map_err(|_| poisoned())?;

        let Some(dims) = state.dims else {
            return Ok(Vec::new());
        };
        ensure_dims(dims, &[vector])?;

        let hits = state
            .records
            .iter()
            .filter(|r| r.metadata.user_id == filter.user_id)
            .map(|r| ScoredRecord {
                score: cosine_similarity(vector, &r.vector),
                record: r.clone(),
            })
            .collect();
        Ok(rank(hits, k))
    }
}

/// In-memory provenance store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<Vec<Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn docs_poisoned() -> RagError {
    RagError::persistence("in-memory document store lock poisoned")
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(|_| docs_poisoned())?;
        if docs.iter().any(|d| d.id == doc.id) {
            return Err(RagError::persistence(format!(
                "document {} already exists",
                doc.id
            )));
        }
        docs.push(doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(|_| docs_poisoned())?;
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(|_| docs_poisoned())?;
        let mut out: Vec<Document> = docs.iter().filter(|d| d.user_id == user_id).cloned().collect();
        out.sort_by_key(|d| d.created_at);
        Ok(out)
    }
}
