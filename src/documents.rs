//! `conecta documents`: list a user's ingested files.

use anyhow::Result;

use crate::app::App;
use crate::config::Config;

pub async fn run_documents(config: &Config, user_id: &str, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let result = app.documents(user_id).await;
    app.close().await;
    let docs = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    if docs.is_empty() {
        println!("No documents for user {}.", user_id);
        return Ok(());
    }
    for doc in &docs {
        println!(
            "{}  {}  pages={}  chunks={}  created_at={}",
            doc.id,
            doc.source_label,
            doc.page_count,
            doc.chunk_count,
            doc.created_at.format("%Y-%m-%dT%H:%M:%SZ")
        );
    }
    Ok(())
}
