//! User-scoped passage retrieval.
//!
//! The question is embedded with the same provider used at ingestion and
//! the index is queried with the caller's user filter. Passage order (by
//! descending similarity) is what the prompt uses; the source labels shown
//! to the user are deduplicated in first-seen order.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::store::{UserFilter, VectorIndex};

pub const DEFAULT_TOP_K: usize = 3;

/// A retrieved chunk text with its label and similarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub text: String,
    pub source_label: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    pub passages: Vec<Passage>,
    pub sources: Vec<String>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        k: usize,
    ) -> Result<Self> {
        if k == 0 {
            return Err(RagError::input("retrieval k must be a positive integer"));
        }
        Ok(Self { embedder, index, k })
    }

    /// Top-`k` passages for `user_id`, using the configured `k`.
    pub async fn retrieve(&self, question: &str, user_id: &str) -> Result<Retrieval> {
        self.retrieve_top(question, user_id, self.k).await
    }

    pub async fn retrieve_top(&self, question: &str, user_id: &str, k: usize) -> Result<Retrieval> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::input("question is empty"));
        }
        if user_id.trim().is_empty() {
            return Err(RagError::input("user_id is empty"));
        }

        let query_vec = self.embedder.embed_query(question).await?;
        let hits = self
            .index
            .query(&query_vec, &UserFilter::new(user_id), k)
            .await?;

        let passages: Vec<Passage> = hits
            .into_iter()
            .map(|hit| Passage {
                text: hit.record.text,
                source_label: hit.record.metadata.source_label,
                score: hit.score,
            })
            .collect();

        debug!(
            user_id,
            hits = passages.len(),
            top_score = passages.first().map(|p| p.score),
            "retrieval finished"
        );

        let sources = dedup_sources(&passages);
        Ok(Retrieval { passages, sources })
    }
}

/// Source labels in first-seen order, each once.
pub fn dedup_sources(passages: &[Passage]) -> Vec<String> {
    let mut seen = HashSet::new();
    passages
        .iter()
        .filter(|p| seen.insert(p.source_label.as_str()))
        .map(|p| p.source_label.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(label: &str) -> Passage {
        Passage {
            text: String::new(),
            source_label: label.to_string(),
            score: 0.0,
        }
    }

    #[test]
    fn test_dedup_sources_preserves_first_seen_order() {
        let passages = vec![passage("b.pdf"), passage("a.pdf"), passage("b.pdf")];
        assert_eq!(dedup_sources(&passages), vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn test_dedup_sources_empty() {
        assert!(dedup_sources(&[]).is_empty());
    }
}
