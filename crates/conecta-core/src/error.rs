//! Error taxonomy shared by every pipeline stage.
//!
//! Infrastructure failures (index, embedding, generation, persistence) are
//! distinct variants so entry points can report them by category. None of
//! them may be turned into a "no relevant information" answer, which is
//! reserved for a genuinely empty retrieval.

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Empty or unreadable document, empty question, missing user id.
    #[error("invalid input: {0}")]
    Input(String),

    /// The vector index could not be reached or timed out.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The embedding provider failed or returned malformed vectors.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A vector's length differs from the index dimensionality.
    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model provider withheld output (safety filter).
    #[error("generation blocked{}", reason_suffix(.reason))]
    GenerationBlocked { reason: Option<String> },

    /// The model provider could not be reached, timed out, or returned garbage.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The document provenance store failed.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

impl RagError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn index_unavailable(message: impl Into<String>) -> Self {
        Self::IndexUnavailable(message.into())
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    pub fn blocked(reason: Option<String>) -> Self {
        Self::GenerationBlocked { reason }
    }

    pub fn generation_unavailable(message: impl Into<String>) -> Self {
        Self::GenerationUnavailable(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Stable machine-readable code, used by the CLI and HTTP error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Input(_) => "input_error",
            RagError::IndexUnavailable(_) => "index_unavailable",
            RagError::Embedding(_) => "embedding_failure",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::GenerationBlocked { .. } => "generation_blocked",
            RagError::GenerationUnavailable(_) => "generation_unavailable",
            RagError::Persistence(_) => "persistence_failure",
        }
    }
}
