//! Concrete embedding providers.
//!
//! Implements [`EmbeddingProvider`] for:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings` with batching, retry and backoff.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalProvider`]**: fastembed running a multilingual MiniLM on the CPU;
//!   the model is downloaded once and loaded at construction.
//! - `hash`: the core [`HashEmbedder`], deterministic and offline.
//!
//! Every failure is reported as [`RagError::Embedding`]. The pipelines
//! check vector counts and lengths against [`EmbeddingProvider::dims`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use conecta_core::embedding::{EmbeddingProvider, HashEmbedder};
use conecta_core::RagError;

use crate::config::EmbeddingConfig;
use crate::http::{build_client, parse_vector, post_json, Endpoint};

pub const DEFAULT_HASH_DIMS: usize = 256;

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_texts(&self, _texts: &[String]) -> conecta_core::Result<Vec<Vec<f32>>> {
        Err(RagError::embedding("Embedding provider is disabled"))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (or a compatible gateway via
/// `embedding.url`). Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or("https://api.openai.com");

        Ok(Self {
            model,
            dims,
            url: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key,
            client: build_client("OpenAI", config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> conecta_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = Endpoint {
            service: "OpenAI",
            client: &self.client,
            url: &self.url,
            bearer: Some(&self.api_key),
        };
        let json = post_json(&endpoint, &body, self.max_retries)
            .await
            .map_err(|e| RagError::embedding(e.to_string()))?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> conecta_core::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::embedding("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vector = item
            .get("embedding")
            .and_then(parse_vector)
            .ok_or_else(|| RagError::embedding("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, vector));
    }

    // Sort by index to ensure order matches input
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance
/// (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or("http://localhost:11434");

        Ok(Self {
            model,
            dims,
            url: format!("{}/api/embed", base.trim_end_matches('/')),
            client: build_client("Ollama", config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> conecta_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = Endpoint {
            service: "Ollama",
            client: &self.client,
            url: &self.url,
            bearer: None,
        };
        let json = post_json(&endpoint, &body, self.max_retries)
            .await
            .map_err(|e| RagError::embedding(e.to_string()))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> conecta_core::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| RagError::embedding("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            parse_vector(e).ok_or_else(|| {
                RagError::embedding("Invalid Ollama response: embedding is not an array")
            })
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    pub const DEFAULT_LOCAL_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";

    /// Runs a fastembed model in-process. No network calls after the first
    /// model download.
    pub struct LocalProvider {
        model_name: String,
        dims: usize,
        batch_size: usize,
        timeout: Duration,
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalProvider {
        /// Load the model. Blocking: downloads on first use.
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
            let (fastembed_model, native_dims) = config_to_fastembed_model(&model_name)?;
            if let Some(dims) = config.dims {
                if dims != native_dims {
                    bail!(
                        "embedding.dims = {} does not match {} ({} dims)",
                        dims,
                        model_name,
                        native_dims
                    );
                }
            }

            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            Ok(Self {
                model_name,
                dims: native_dims,
                batch_size: config.batch_size,
                timeout: Duration::from_secs(config.timeout_secs),
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    fn config_to_fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
        match name {
            "paraphrase-multilingual-minilm-l12-v2" => {
                Ok((fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2, 384))
            }
            "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
            "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
            "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
            "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
            "multilingual-e5-large" => Ok((fastembed::EmbeddingModel::MultilingualE5Large, 1024)),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 paraphrase-multilingual-minilm-l12-v2, all-minilm-l6-v2, bge-small-en-v1.5, \
                 multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                other
            ),
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalProvider {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed_texts(&self, texts: &[String]) -> conecta_core::Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let model = self.model.clone();
            let texts = texts.to_vec();
            let batch_size = self.batch_size;

            let task = tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| RagError::embedding("local embedding model lock poisoned"))?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| RagError::embedding(format!("Local embedding failed: {}", e)))
            });

            match tokio::time::timeout(self.timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(RagError::embedding(format!("Local embedding task failed: {}", e))),
                Err(_) => Err(RagError::embedding(format!(
                    "Local embedding timed out after {}s",
                    self.timeout.as_secs()
                ))),
            }
        }
    }
}

/// Create the [`EmbeddingProvider`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"hash"` | [`HashEmbedder`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
///
/// May block while a local model loads.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "hash" => Ok(Arc::new(HashEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASH_DIMS),
        )?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;
    use axum::routing::post;
    use axum::{Json, Router};

    fn remote_config(provider: &str, url: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            model: Some("test-model".to_string()),
            dims: Some(3),
            url: Some(url.to_string()),
            max_retries: 0,
            timeout_secs: 5,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_openai_response_sorted_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_malformed_responses_are_embedding_failures() {
        let err = parse_openai_response(&serde_json::json!({"error": "x"})).unwrap_err();
        assert_eq!(err.code(), "embedding_failure");
        let err = parse_ollama_response(&serde_json::json!({"embeddings": [["a"]]})).unwrap_err();
        assert_eq!(err.code(), "embedding_failure");
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let err = DisabledProvider.embed_texts(&["x".to_string()]).await.unwrap_err();
        assert_eq!(err.code(), "embedding_failure");
    }

    #[test]
    fn test_create_hash_provider() {
        let config = EmbeddingConfig {
            provider: "hash".to_string(),
            dims: Some(64),
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dims(), 64);
        assert_eq!(provider.model_name(), "hash-64");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[tokio::test]
    async fn test_openai_provider_against_mock() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<serde_json::Value>| async move {
                let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
                let data: Vec<serde_json::Value> = (0..count)
                    .map(|i| serde_json::json!({"index": i, "embedding": [i as f32, 0.5, 1.0]}))
                    .collect();
                Json(serde_json::json!({ "data": data }))
            }),
        );
        let base = test_server::spawn(router).await;
        let provider =
            OpenAIProvider::with_key(&remote_config("openai", &base), "sk-test".to_string()).unwrap();

        let vectors = provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![1.0, 0.5, 1.0]);

        let query = provider.embed_query("q").await.unwrap();
        assert_eq!(query.len(), 3);
    }

    #[tokio::test]
    async fn test_stalled_provider_times_out_as_embedding_failure() {
        let router = Router::new().route(
            "/api/embed",
            post(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Json(serde_json::json!({ "embeddings": [[0.0, 0.0, 1.0]] }))
            }),
        );
        let base = test_server::spawn(router).await;
        let provider = OllamaProvider::new(&EmbeddingConfig {
            timeout_secs: 1,
            ..remote_config("ollama", &base)
        })
        .unwrap();

        let started = std::time::Instant::now();
        let err = provider.embed_query("frete").await.unwrap_err();
        assert_eq!(err.code(), "embedding_failure");
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_ollama_unreachable_is_embedding_failure() {
        let provider = OllamaProvider::new(&remote_config("ollama", "http://127.0.0.1:9")).unwrap();
        let err = provider.embed_texts(&["a".to_string()]).await.unwrap_err();
        assert_eq!(err.code(), "embedding_failure");
    }
}
