//! Language model abstraction.
//!
//! A [`Generator`] is a black-box text continuation call. Implementations
//! must distinguish three outcomes: text, a provider safety block
//! ([`RagError::GenerationBlocked`](crate::RagError::GenerationBlocked)) and a
//! transport or availability failure
//! ([`RagError::GenerationUnavailable`](crate::RagError::GenerationUnavailable)).
//! A blocked or failed call is never reported as an empty answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_ANSWER_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_ANSWER_MAX_TOKENS: u32 = 512;
pub const DEFAULT_TOPIC_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_TOPIC_MAX_TOKENS: u32 = 256;

/// Sampling configuration passed with every prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    pub fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
        }
    }

    pub fn answers() -> Self {
        Self::new(DEFAULT_ANSWER_TEMPERATURE, DEFAULT_ANSWER_MAX_TOKENS)
    }

    pub fn topics() -> Self {
        Self::new(DEFAULT_TOPIC_TEMPERATURE, DEFAULT_TOPIC_MAX_TOKENS)
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::answers()
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Continue `prompt`, returning the raw model text.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}
