//! Ingestion and question-answering pipelines.
//!
//! Both pipelines receive their embedder, index, store and generator
//! handles at construction; the composing application owns their
//! lifecycle. Model and prompt variants are [`PipelineSettings`] values,
//! not separate code paths.
//!
//! # Ingestion
//!
//! ```text
//! pages → Chunker → Chunk (+user_id) → embed (batched) → VectorRecord
//!       → VectorIndex::upsert → DocumentStore::insert_document → Document
//! ```
//!
//! Any failure aborts the remaining steps. Embedding failures happen before
//! any write. A provenance failure after a successful upsert leaves orphaned
//! chunks that must be cleaned up out-of-band.
//!
//! # Question answering
//!
//! ```text
//! question → Retriever → (no passages? fixed answer, no generation)
//!          → PromptTemplate → Generator → Sanitizer → Answer
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::{check_batch, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generate::{GenerationParams, Generator, DEFAULT_ANSWER_MAX_TOKENS, DEFAULT_ANSWER_TEMPERATURE};
use crate::models::{Answer, Chunk, Document, DocumentSource, VectorRecord};
use crate::prompt::{PromptTemplate, DEFAULT_LANGUAGE, NO_RELEVANT_INFORMATION};
use crate::retrieve::{Retrieval, Retriever, DEFAULT_TOP_K};
use crate::sanitize::Sanitizer;
use crate::store::{DocumentStore, VectorIndex};

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// One configuration instance of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub embedding_model: String,
    pub generation_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub k: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub strict_context: bool,
    pub language: String,
    pub embed_batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            embedding_model: String::new(),
            generation_model: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            k: DEFAULT_TOP_K,
            temperature: DEFAULT_ANSWER_TEMPERATURE,
            max_output_tokens: DEFAULT_ANSWER_MAX_TOKENS,
            strict_context: false,
            language: DEFAULT_LANGUAGE.to_string(),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

impl PipelineSettings {
    pub fn chunker(&self) -> Result<Chunker> {
        Chunker::new(self.chunk_size, self.chunk_overlap)
    }

    pub fn template(&self) -> PromptTemplate {
        PromptTemplate::new(self.language.clone(), self.strict_context)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams::new(self.temperature, self.max_output_tokens)
    }
}

pub struct IngestPipeline {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    documents: Arc<dyn DocumentStore>,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        settings: &PipelineSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        documents: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        Ok(Self {
            chunker: settings.chunker()?,
            embedder,
            index,
            documents,
            batch_size: settings.embed_batch_size.max(1),
        })
    }

    /// Index one loaded document for `user_id` and record its provenance.
    pub async fn ingest(&self, source: DocumentSource, user_id: &str) -> Result<Document> {
        if user_id.trim().is_empty() {
            return Err(RagError::input("user_id is empty"));
        }
        if source.pages.iter().all(|p| p.trim().is_empty()) {
            return Err(RagError::input(format!(
                "{} has no extractable text",
                source.file_ref
            )));
        }

        let document_id = Uuid::new_v4().to_string();
        let chunks: Vec<Chunk> = self
            .chunker
            .split(&source.pages)
            .into_iter()
            .map(|span| span.into_chunk(&document_id, user_id, &source.source_label))
            .collect();

        debug!(
            document_id = %document_id,
            pages = source.pages.len(),
            chunks = chunks.len(),
            "document chunked"
        );

        let vectors = self.embed_chunks(&chunks).await?;
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord::from_chunk(chunk, vector))
            .collect();

        self.index.upsert(&records).await?;

        let document = Document {
            id: document_id,
            user_id: user_id.to_string(),
            file_ref: source.file_ref,
            source_label: source.source_label,
            page_count: source.pages.len(),
            chunk_count: chunks.len(),
            created_at: Utc::now(),
        };
        self.documents.insert_document(&document).await?;

        info!(
            document_id = %document.id,
            user_id,
            source = %document.source_label,
            chunks = document.chunk_count,
            "document ingested"
        );
        Ok(document)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let dims = self.embedder.dims();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self.embedder.embed_texts(batch).await?;
            check_batch(&batch_vectors, batch.len(), dims)?;
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }
}

pub struct QaPipeline {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    sanitizer: Sanitizer,
    params: GenerationParams,
}

impl QaPipeline {
    pub fn new(
        settings: &PipelineSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let template = settings.template();
        Ok(Self {
            retriever: Retriever::new(embedder, index, settings.k)?,
            generator,
            sanitizer: Sanitizer::for_answers(&template),
            template,
            params: settings.generation_params(),
        })
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `question` from `user_id`'s documents.
    pub async fn ask(&self, question: &str, user_id: &str) -> Result<Answer> {
        let retrieval = self.retriever.retrieve(question, user_id).await?;
        self.answer_from(question, retrieval).await
    }

    /// Generate an answer for an already retrieved set of passages.
    pub async fn answer_from(&self, question: &str, retrieval: Retrieval) -> Result<Answer> {
        if retrieval.is_empty() {
            info!("no passages retrieved; returning fixed answer");
            return Ok(Answer {
                text: NO_RELEVANT_INFORMATION.to_string(),
                sources: Vec::new(),
            });
        }

        let texts: Vec<&str> = retrieval.passages.iter().map(|p| p.text.as_str()).collect();
        let prompt = self.template.build_qa_prompt(&texts, question);
        debug!(
            passages = texts.len(),
            prompt_chars = prompt.len(),
            model = self.generator.model_name(),
            "generating answer"
        );

        let raw = self.generator.generate(&prompt, &self.params).await?;
        let text = self.sanitizer.sanitize(&raw);
        if text.is_empty() {
            warn!(raw_chars = raw.len(), "sanitized answer is empty");
        }

        Ok(Answer {
            text,
            sources: retrieval.sources,
        })
    }
}
