//! `nestie search`: retrieval without generation.
//!
//! An operator tool for checking what the retriever would hand the
//! language model for a question. Unlike Slack replies, the output shows
//! similarity scores.

use anyhow::Result;

use crate::app::App;
use crate::retrieval::RetrievedChunk;

const PREVIEW_CHARS: usize = 160;

pub async fn run_search(app: &App, query: &str, limit: Option<usize>) -> Result<()> {
    app.ensure_populated().await?;
    let retriever = app.retriever()?;
    let k = limit.unwrap_or(app.config.retrieval.top_k);

    let results = retriever.retrieve(query, k).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }
    Ok(())
}

fn print_result(rank: usize, result: &RetrievedChunk) {
    println!(
        "{}. [{:.3}] {} (chunk {})",
        rank, result.score, result.document.name, result.chunk.chunk_index
    );
    if let Some(path) = &result.document.path {
        println!("    path: {}", path);
    }
    println!("    excerpt: \"{}\"", preview(&result.chunk.text));
    println!();
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n\nb   c"), "a b c");
        let long = "x".repeat(PREVIEW_CHARS + 10);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 3);
    }
}
