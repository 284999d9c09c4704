//! `nestie status`: configuration summary and index contents.

use anyhow::Result;

use crate::app::App;

pub async fn run_status(app: &App) -> Result<()> {
    let config = &app.config;
    let chunks = app.index.len().await?;
    let indexed = app.index.document_names().await?;
    let configured = app.catalog.names();
    let pending: Vec<&String> = configured
        .iter()
        .filter(|name| !indexed.contains(name))
        .collect();

    println!("Nestie Status");
    println!("=============");
    println!();
    println!("  Bot name:    {}", config.slack.bot_name);
    println!(
        "  Slack:       {}",
        match config.slack_credentials() {
            Ok(_) => "tokens configured".to_string(),
            Err(e) => e.to_string(),
        }
    );
    println!("  LLM:         {} / {}", config.llm.provider, config.llm.model);
    println!(
        "  Embeddings:  {} / {} ({} dims)",
        config.embedding.provider,
        app.embedder.model_name(),
        app.embedder.dims()
    );
    println!();
    if app.is_persistent() {
        println!("  Index:       sqlite at {}", config.index.path.display());
    } else {
        println!("  Index:       in-memory (populated when serving)");
    }
    println!("  Documents:   {} configured, {} indexed", configured.len(), indexed.len());
    println!("  Chunks:      {}", chunks);
    println!(
        "  Chunking:    size {} / overlap {}, top-k {}",
        config.chunking.chunk_size, config.chunking.chunk_overlap, config.retrieval.top_k
    );

    if !indexed.is_empty() {
        println!();
        println!("  Indexed documents:");
        for name in &indexed {
            println!("    {}", name);
        }
    }
    if !pending.is_empty() {
        println!();
        println!("  Not yet indexed:");
        for name in pending {
            println!("    {}", name);
        }
    }
    println!();
    Ok(())
}
