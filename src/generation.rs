//! Concrete language-model generators.
//!
//! Implements [`Generator`] for Gemini, OpenAI chat completions, Ollama and
//! a disabled stand-in. Each backend tells apart three outcomes:
//!
//! | Outcome | Result |
//! |---------|--------|
//! | text returned | `Ok(text)` |
//! | provider safety filter | [`RagError::GenerationBlocked`] |
//! | transport, status, timeout or unparseable body | [`RagError::GenerationUnavailable`] |

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;

use conecta_core::generate::{GenerationParams, Generator};
use conecta_core::{RagError, Result};

use crate::config::GenerationConfig;
use crate::http::{build_client, post_json, Endpoint, HttpFailure};

/// Candidate finish reasons that mean the output was withheld.
const GEMINI_SAFETY_FINISH: &[&str] = &[
    "SAFETY",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "RECITATION",
];

fn unavailable(e: HttpFailure) -> RagError {
    RagError::generation_unavailable(e.to_string())
}

// ============ Disabled Generator ============

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        Err(RagError::generation_unavailable("Generation provider is disabled"))
    }
}

// ============ Gemini ============

/// Google Gemini via the Generative Language API. Requires `GOOGLE_API_KEY`.
pub struct GeminiGenerator {
    model: String,
    base: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        let base = config
            .url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com");
        Ok(Self {
            model: config.model_or_default(),
            base: base.trim_end_matches('/').to_string(),
            api_key,
            client: build_client("Gemini", config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base, self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_output_tokens,
            },
        });
        let endpoint = Endpoint {
            service: "Gemini",
            client: &self.client,
            url: &url,
            bearer: None,
        };
        let json = post_json(&endpoint, &body, self.max_retries)
            .await
            .map_err(unavailable)?;
        parse_gemini_response(&json)
    }
}

pub fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        let message = json
            .pointer("/promptFeedback/blockReasonMessage")
            .and_then(|m| m.as_str())
            .unwrap_or(reason);
        return Err(RagError::blocked(Some(message.to_string())));
    }

    let candidate = json.pointer("/candidates/0");
    let text: String = candidate
        .and_then(|c| c.pointer("/content/parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();
    if !text.is_empty() {
        return Ok(text);
    }

    let finish = candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(|f| f.as_str());
    match finish {
        Some(reason) if GEMINI_SAFETY_FINISH.contains(&reason) => {
            Err(RagError::blocked(Some(reason.to_string())))
        }
        Some(reason) => Err(RagError::generation_unavailable(format!(
            "Gemini returned no text (finishReason {})",
            reason
        ))),
        None => Err(RagError::generation_unavailable("Gemini returned no candidates")),
    }
}

// ============ OpenAI ============

/// OpenAI chat completions (or a compatible gateway). Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        let base = config.url.as_deref().unwrap_or("https://api.openai.com");
        Ok(Self {
            model: config.model_or_default(),
            url: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            api_key,
            client: build_client("OpenAI", config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_output_tokens,
        });
        let endpoint = Endpoint {
            service: "OpenAI",
            client: &self.client,
            url: &self.url,
            bearer: Some(&self.api_key),
        };
        let json = post_json(&endpoint, &body, self.max_retries)
            .await
            .map_err(unavailable)?;
        parse_openai_chat_response(&json)
    }
}

pub fn parse_openai_chat_response(json: &serde_json::Value) -> Result<String> {
    let choice = json
        .pointer("/choices/0")
        .ok_or_else(|| RagError::generation_unavailable("OpenAI returned no choices"))?;

    if let Some(refusal) = choice.pointer("/message/refusal").and_then(|r| r.as_str()) {
        return Err(RagError::blocked(Some(refusal.to_string())));
    }
    if choice.get("finish_reason").and_then(|f| f.as_str()) == Some("content_filter") {
        return Err(RagError::blocked(Some("content_filter".to_string())));
    }

    choice
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::generation_unavailable("OpenAI returned no message content"))
}

// ============ Ollama ============

/// A local Ollama instance (default `http://localhost:11434`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let base = config.url.as_deref().unwrap_or("http://localhost:11434");
        Ok(Self {
            model: config.model_or_default(),
            url: format!("{}/api/generate", base.trim_end_matches('/')),
            client: build_client("Ollama", config.timeout_secs)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_output_tokens,
            },
        });
        let endpoint = Endpoint {
            service: "Ollama",
            client: &self.client,
            url: &self.url,
            bearer: None,
        };
        let json = post_json(&endpoint, &body, self.max_retries)
            .await
            .map_err(unavailable)?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::generation_unavailable("Ollama response has no text"))
    }
}

/// Create the [`Generator`] named by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
