//! The composition root: one embedder, index, store and generator per
//! process, shared by every pipeline.
//!
//! CLI commands and HTTP handlers both go through [`App`], so the two entry
//! points behave identically.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use conecta_core::embedding::EmbeddingProvider;
use conecta_core::models::{Answer, ConversationMessage, Document};
use conecta_core::pipeline::{IngestPipeline, QaPipeline};
use conecta_core::store::DocumentStore;
use conecta_core::topics::{TopicExtractor, TopicGraph};
use conecta_core::{generate::GenerationParams, RagError};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::extract;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Topics plus the graph drawn from them (absent when there are none).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<String>,
    pub graph: Option<TopicGraph>,
}

pub struct App {
    pool: SqlitePool,
    store: Arc<SqliteStore>,
    ingest: IngestPipeline,
    qa: QaPipeline,
    topics: TopicExtractor,
    embedding_enabled: bool,
}

impl App {
    /// Connect, migrate and build every provider once.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store = Arc::new(SqliteStore::new(
            pool.clone(),
            Duration::from_secs(config.retrieval.timeout_secs),
        ));

        // Local models load synchronously.
        let embedding_config = config.embedding.clone();
        let embedder: Arc<dyn EmbeddingProvider> =
            tokio::task::spawn_blocking(move || create_provider(&embedding_config))
                .await
                .context("embedding provider initialization panicked")??;
        let generator = create_generator(&config.generation)?;

        let settings = config.pipeline_settings(embedder.model_name());
        let ingest = IngestPipeline::new(&settings, embedder.clone(), store.clone(), store.clone())?;
        let qa = QaPipeline::new(&settings, embedder.clone(), store.clone(), generator.clone())?;
        let topics = TopicExtractor::new(
            generator,
            GenerationParams::new(config.topics.temperature, config.topics.max_output_tokens),
        )
        .with_min_chars(config.topics.min_chars);

        info!(
            embedding_model = %settings.embedding_model,
            generation_model = %settings.generation_model,
            k = settings.k,
            strict_context = settings.strict_context,
            "pipeline ready"
        );
        let embedding_enabled = config.embedding.is_enabled();
        if !embedding_enabled {
            warn!("embedding provider disabled; ingest and ask will be rejected");
        }

        Ok(Self {
            pool,
            store,
            ingest,
            qa,
            topics,
            embedding_enabled,
        })
    }

    fn require_embeddings(&self) -> Result<(), RagError> {
        if self.embedding_enabled {
            return Ok(());
        }
        Err(RagError::embedding(
            "no embedding provider configured; set [embedding] provider",
        ))
    }

    /// Load, chunk, embed and index a file for `user_id`.
    pub async fn ingest_file(&self, path: &Path, user_id: &str) -> Result<Document, RagError> {
        self.require_embeddings()?;
        let owned: PathBuf = path.to_path_buf();
        let source = tokio::task::spawn_blocking(move || extract::load_document(&owned))
            .await
            .map_err(|e| RagError::input(format!("document loading failed: {}", e)))??;
        self.ingest.ingest(source, user_id).await
    }

    pub async fn ask(&self, question: &str, user_id: &str) -> Result<Answer, RagError> {
        self.require_embeddings()?;
        info!(user_id, question_chars = question.chars().count(), "question received");
        self.qa.ask(question, user_id).await
    }

    pub async fn extract_topics(
        &self,
        messages: &[ConversationMessage],
    ) -> Result<TopicsResponse, RagError> {
        let topics = self.topics.extract_topics(messages).await?;
        let graph = TopicGraph::from_topics(&topics);
        Ok(TopicsResponse { topics, graph })
    }

    pub async fn documents(&self, user_id: &str) -> Result<Vec<Document>, RagError> {
        self.store.list_documents(user_id).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
