//! Core data models used throughout Conecta.
//!
//! These types represent the documents, chunks, vector records, answers and
//! conversation messages that flow through the ingestion, question-answering
//! and topic-extraction pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance record for one successfully ingested file.
///
/// Created once per ingestion and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    /// Original file reference (path as given at upload time).
    pub file_ref: String,
    /// Human-facing label shown as the answer source (file name).
    pub source_label: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Page texts of a loaded file, ready for chunking.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub file_ref: String,
    pub source_label: String,
    pub pages: Vec<String>,
}

/// An overlapping text span of one page of a document.
///
/// `start` and `end` are character offsets (Unicode scalars) into the page
/// text, so `page_text.chars().skip(start).take(end - start)` is `text`.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub source_label: String,
    /// 1-based page number.
    pub page: usize,
    /// Contiguous across the whole document, starting at 0.
    pub chunk_index: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// Metadata stored alongside every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub user_id: String,
    pub source_label: String,
    pub document_id: String,
    pub page: usize,
    pub chunk_index: i64,
}

/// The unit stored in a vector index: one per chunk, immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Same as the originating chunk id.
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub hash: String,
    pub metadata: RecordMetadata,
}

impl VectorRecord {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            vector,
            text: chunk.text.clone(),
            hash: chunk.hash.clone(),
            metadata: RecordMetadata {
                user_id: chunk.user_id.clone(),
                source_label: chunk.source_label.clone(),
                document_id: chunk.document_id.clone(),
                page: chunk.page,
                chunk_index: chunk.chunk_index,
            },
        }
    }
}

/// A user-facing answer with deduplicated source labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a chat transcript. Storage belongs to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ConversationMessage::assistant("oi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"oi"}"#);
    }

    #[test]
    fn test_record_from_chunk_copies_metadata() {
        let chunk = Chunk {
            id: "c1".to_string(),
            document_id: "d1".to_string(),
            user_id: "u1".to_string(),
            source_label: "loja.pdf".to_string(),
            page: 2,
            chunk_index: 5,
            start: 0,
            end: 4,
            text: "Loja".to_string(),
            hash: "h".to_string(),
        };
        let record = VectorRecord::from_chunk(&chunk, vec![1.0, 0.0]);
        assert_eq!(record.id, "c1");
        assert_eq!(record.metadata.user_id, "u1");
        assert_eq!(record.metadata.page, 2);
        assert_eq!(record.metadata.chunk_index, 5);
    }
}
