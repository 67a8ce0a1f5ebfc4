//! `conecta ingest`: index one file for a user.

use anyhow::Result;
use std::path::Path;

use crate::app::App;
use crate::config::Config;

pub async fn run_ingest(config: &Config, path: &Path, user_id: &str, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let result = app.ingest_file(path, user_id).await;
    app.close().await;
    let doc = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Ingested {}", doc.source_label);
    println!("  document_id: {}", doc.id);
    println!("  user_id:     {}", doc.user_id);
    println!("  pages:       {}", doc.page_count);
    println!("  chunks:      {}", doc.chunk_count);
    Ok(())
}
