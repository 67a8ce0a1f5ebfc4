//! `conecta ask`: answer a question from the user's documents.

use anyhow::Result;

use crate::app::App;
use crate::config::Config;

pub async fn run_ask(config: &Config, question: &str, user_id: &str, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let result = app.ask(question, user_id).await;
    app.close().await;
    let answer = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.text);
    println!();
    if answer.sources.is_empty() {
        println!("sources: (none)");
    } else {
        println!("sources: {}", answer.sources.join(", "));
    }
    Ok(())
}
