//! Component wiring shared by the CLI commands.
//!
//! [`App::open`] builds the configured embedder and vector index once;
//! commands then ingest into it, query it, or wrap it in an
//! [`Assistant`].

use std::sync::Arc;

use anyhow::{Context, Result};
use nestie_core::embedding::Embedder;
use nestie_core::index::memory::InMemoryIndex;
use nestie_core::index::VectorIndex;

use crate::assistant::Assistant;
use crate::config::{Config, IndexConfig};
use crate::embedding::create_embedder;
use crate::generator::ResponseGenerator;
use crate::ingest::{run_ingest, IngestReport};
use crate::llm::create_language_model;
use crate::loader;
use crate::retrieval::{DocumentCatalog, Retriever};
use crate::sqlite_index::SqliteIndex;

pub struct App {
    pub config: Arc<Config>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub catalog: DocumentCatalog,
}

impl App {
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let index = open_index(&config.index, embedder.as_ref()).await?;
        let sources = loader::discover(&config.documents)?;
        tracing::info!(
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            backend = %config.index.backend,
            documents = sources.len(),
            "components ready"
        );
        Ok(Self {
            config: Arc::new(config),
            embedder,
            index,
            catalog: DocumentCatalog::from_sources(&sources),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.config.index.backend == "sqlite"
    }

    pub async fn ingest(&self, dry_run: bool) -> Result<IngestReport> {
        run_ingest(
            &self.config,
            self.embedder.as_ref(),
            self.index.as_ref(),
            dry_run,
        )
        .await
    }

    /// Ingest before querying when the index starts out empty, as an
    /// in-memory index always does.
    pub async fn ensure_populated(&self) -> Result<()> {
        if self.is_persistent() && !self.index.is_empty().await? {
            return Ok(());
        }
        let report = self.ingest(false).await?;
        tracing::info!(
            indexed = report.indexed.len(),
            failed = report.failed.len(),
            chunks = report.chunks_written,
            "startup ingestion finished"
        );
        Ok(())
    }

    pub fn retriever(&self) -> Result<Retriever> {
        Ok(Retriever::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            self.catalog.clone(),
        )?)
    }

    pub fn assistant(&self) -> Result<Assistant> {
        let model = create_language_model(&self.config.llm)?;
        let generator = ResponseGenerator::new(model, &self.config);
        Ok(Assistant::new(
            Arc::clone(&self.config),
            self.retriever()?,
            generator,
        ))
    }
}

pub async fn open_index(
    config: &IndexConfig,
    embedder: &dyn Embedder,
) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new(embedder.dims()))),
        _ => {
            let index = SqliteIndex::open(&config.path, embedder.dims(), embedder.model_name())
                .await
                .with_context(|| format!("Failed to open index at {}", config.path.display()))?;
            Ok(Arc::new(index))
        }
    }
}
