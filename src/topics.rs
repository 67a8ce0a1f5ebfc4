//! `conecta topics`: summarize a chat transcript into key topics.
//!
//! The transcript file is a JSON array of `{"role", "content"}` objects.

use anyhow::{Context, Result};
use std::path::Path;

use conecta_core::models::ConversationMessage;

use crate::app::App;
use crate::config::Config;

pub fn read_transcript(path: &Path) -> Result<Vec<ConversationMessage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Transcript is not a JSON array of messages: {}", path.display()))
}

pub async fn run_topics(config: &Config, transcript: &Path, json: bool) -> Result<()> {
    let messages = read_transcript(transcript)?;

    let app = App::open(config).await?;
    let result = app.extract_topics(&messages).await;
    app.close().await;
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.topics.is_empty() {
        println!("No topics found.");
        return Ok(());
    }
    println!("topics:");
    for topic in &response.topics {
        println!("  - {}", topic);
    }
    Ok(())
}
