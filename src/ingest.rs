//! Ingestion pipeline orchestration.
//!
//! Coordinates loader → chunker → embedder → vector index for every
//! configured document. Documents whose content hash matches what the
//! index recorded last time are skipped. A document that fails to load,
//! embed, or store is logged and skipped; the rest still ingest.

use std::collections::HashSet;

use anyhow::Result;
use nestie_core::chunk::chunk_text;
use nestie_core::embedding::Embedder;
use nestie_core::error::Error;
use nestie_core::index::VectorIndex;
use nestie_core::models::Document;

use crate::config::{ChunkingConfig, Config};
use crate::loader::{self, DocumentSource};

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Content hash unchanged since the last ingestion.
    Unchanged,
    /// Chunks embedded and stored (or counted, in a dry run).
    Indexed { chunks: usize },
}

/// Summary of one ingestion run.
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    pub discovered: usize,
    pub indexed: Vec<String>,
    pub unchanged: Vec<String>,
    /// `(document, reason)` for each skipped document.
    pub failed: Vec<(String, String)>,
    /// Indexed documents no longer in the configured set.
    pub removed: Vec<String>,
    pub chunks_written: usize,
    pub dry_run: bool,
}

impl IngestReport {
    pub fn print(&self) {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        println!("Ingestion{}:", mode);
        println!("  documents discovered: {}", self.discovered);
        println!("  documents indexed:    {}", self.indexed.len());
        println!("  documents unchanged:  {}", self.unchanged.len());
        println!("  documents failed:     {}", self.failed.len());
        println!("  documents removed:    {}", self.removed.len());
        println!("  chunks written:       {}", self.chunks_written);
        for (name, reason) in &self.failed {
            println!("  ! {}: {}", name, reason);
        }
    }
}

/// Ingest every configured document into `index`.
///
/// Only configuration problems (bad globs, missing directory) return an
/// error; per-document failures are recorded in the report.
pub async fn run_ingest(
    config: &Config,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    dry_run: bool,
) -> Result<IngestReport> {
    let sources = loader::discover(&config.documents)?;
    let mut report = IngestReport {
        discovered: sources.len(),
        dry_run,
        ..IngestReport::default()
    };

    if sources.is_empty() {
        tracing::warn!("no documents configured; answers will not be grounded in any document");
    }

    let configured: HashSet<&str> = sources.iter().map(|s| s.name.as_str()).collect();
    for name in index.document_names().await? {
        if configured.contains(name.as_str()) {
            continue;
        }
        if !dry_run {
            index.remove_document(&name).await?;
        }
        tracing::info!(document = %name, dry_run, "removed from configuration, dropping");
        report.removed.push(name);
    }

    for source in &sources {
        match ingest_source(config, source, embedder, index, dry_run).await {
            Ok(DocumentOutcome::Unchanged) => {
                tracing::info!(document = %source.name, "unchanged, skipping");
                report.unchanged.push(source.name.clone());
            }
            Ok(DocumentOutcome::Indexed { chunks }) => {
                tracing::info!(document = %source.name, chunks, dry_run, "indexed");
                report.indexed.push(source.name.clone());
                report.chunks_written += chunks;
            }
            Err(e) => {
                tracing::warn!(document = %source.name, error = %e, "skipping document");
                report.failed.push((source.name.clone(), e.to_string()));
            }
        }
    }

    Ok(report)
}

async fn ingest_source(
    config: &Config,
    source: &DocumentSource,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    dry_run: bool,
) -> Result<DocumentOutcome, Error> {
    let document = loader::load_document(source, config.documents.max_file_bytes)?;
    if dry_run {
        let chunks = chunk_text(
            &document.name,
            &document.text,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        );
        let unchanged = index.document_hash(&document.name).await?.as_deref()
            == Some(document.hash.as_str());
        return Ok(if unchanged {
            DocumentOutcome::Unchanged
        } else {
            DocumentOutcome::Indexed {
                chunks: chunks.len(),
            }
        });
    }
    ingest_document(
        &document,
        &config.chunking,
        config.embedding.batch_size,
        embedder,
        index,
    )
    .await
}

/// Chunk, embed, and store one loaded document.
///
/// The document's previous chunks are replaced atomically, so a shorter
/// new version leaves no stale chunks behind.
pub async fn ingest_document(
    document: &Document,
    chunking: &ChunkingConfig,
    batch_size: usize,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<DocumentOutcome, Error> {
    if index.document_hash(&document.name).await?.as_deref() == Some(document.hash.as_str()) {
        return Ok(DocumentOutcome::Unchanged);
    }

    let chunks = chunk_text(
        &document.name,
        &document.text,
        chunking.chunk_size,
        chunking.chunk_overlap,
    );

    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts).await?;
        vectors.extend(embedded);
    }

    index
        .replace_document(&document.name, &document.hash, &chunks, &vectors)
        .await?;

    Ok(DocumentOutcome::Indexed {
        chunks: chunks.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use nestie_core::index::memory::InMemoryIndex;

    fn chunking() -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: 50,
            chunk_overlap: 10,
        }
    }

    #[tokio::test]
    async fn test_reingest_unchanged_is_noop() {
        let embedder = HashedEmbedder::with_dims(32);
        let index = InMemoryIndex::new(32);
        let doc = Document::new("Guide", "guide.txt", "text/plain", "word ".repeat(40));

        let first = ingest_document(&doc, &chunking(), 4, &embedder, &index)
            .await
            .unwrap();
        let count = index.len().await.unwrap();
        assert!(matches!(first, DocumentOutcome::Indexed { chunks } if chunks == count));

        let second = ingest_document(&doc, &chunking(), 4, &embedder, &index)
            .await
            .unwrap();
        assert_eq!(second, DocumentOutcome::Unchanged);
        assert_eq!(index.len().await.unwrap(), count);
    }

    #[tokio::test]
    async fn test_changed_document_replaces_chunks() {
        let embedder = HashedEmbedder::with_dims(16);
        let index = InMemoryIndex::new(16);
        let v1 = Document::new("Guide", "guide.txt", "text/plain", "alpha ".repeat(60));
        ingest_document(&v1, &chunking(), 8, &embedder, &index)
            .await
            .unwrap();

        let v2 = Document::new("Guide", "guide.txt", "text/plain", "beta gamma");
        let outcome = ingest_document(&v2, &chunking(), 8, &embedder, &index)
            .await
            .unwrap();
        assert_eq!(outcome, DocumentOutcome::Indexed { chunks: 1 });
        assert_eq!(index.len().await.unwrap(), 1);
        assert_eq!(
            index.document_hash("Guide").await.unwrap(),
            Some(v2.hash.clone())
        );
    }

    #[tokio::test]
    async fn test_embedder_dims_mismatch_leaves_index_untouched() {
        let embedder = HashedEmbedder::with_dims(8);
        let index = InMemoryIndex::new(16);
        let doc = Document::new("Guide", "guide.txt", "text/plain", "hello world");
        assert!(matches!(
            ingest_document(&doc, &chunking(), 8, &embedder, &index).await,
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_documents_dropped_from_config_are_removed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        std::fs::write(&a, "Expense reports are due monthly.").unwrap();
        std::fs::write(&b, "Employees get 25 vacation days.").unwrap();
        let config_for = |named: &[(&str, &std::path::Path)]| {
            let entries: String = named
                .iter()
                .map(|(name, path)| format!("{} = \"{}\"\n", name, path.display()))
                .collect();
            crate::config::parse_config(&format!(
                "[embedding]\nprovider = \"hashed\"\ndims = 32\n\n[documents.named]\n{}",
                entries
            ))
            .unwrap()
        };
        let embedder = HashedEmbedder::with_dims(32);
        let index = InMemoryIndex::new(32);

        run_ingest(&config_for(&[("A", &a), ("B", &b)]), &embedder, &index, false)
            .await
            .unwrap();
        assert_eq!(index.document_names().await.unwrap(), vec!["A", "B"]);

        let only_a = config_for(&[("A", &a)]);
        let dry = run_ingest(&only_a, &embedder, &index, true).await.unwrap();
        assert_eq!(dry.removed, vec!["B".to_string()]);
        assert_eq!(index.document_names().await.unwrap(), vec!["A", "B"]);

        let report = run_ingest(&only_a, &embedder, &index, false).await.unwrap();
        assert_eq!(report.removed, vec!["B".to_string()]);
        assert_eq!(report.unchanged, vec!["A".to_string()]);
        assert_eq!(index.document_names().await.unwrap(), vec!["A"]);
        assert_eq!(index.document_hash("B").await.unwrap(), None);

        let query = embedder.embed_query("vacation days").await.unwrap();
        let hits = index.query(&query, 5).await.unwrap();
        assert!(hits.iter().all(|h| h.chunk.document == "A"));
    }
}
