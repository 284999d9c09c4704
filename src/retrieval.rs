//! Query-time retrieval: embed the question, take the top-K chunks, and
//! attach the source document so replies can cite it.

use std::collections::BTreeMap;
use std::sync::Arc;

use nestie_core::embedding::Embedder;
use nestie_core::error::Result;
use nestie_core::index::{check_dimension, VectorIndex};
use nestie_core::models::Chunk;

use crate::loader::DocumentSource;

/// Citation data for a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub name: String,
    /// File the document was loaded from, when known. Never shown to users.
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub document: DocumentRef,
}

/// Known documents, by name.
#[derive(Debug, Clone, Default)]
pub struct DocumentCatalog {
    paths: BTreeMap<String, String>,
}

impl DocumentCatalog {
    pub fn from_sources(sources: &[DocumentSource]) -> Self {
        Self {
            paths: sources
                .iter()
                .map(|s| (s.name.clone(), s.path.display().to_string()))
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    pub fn reference(&self, name: &str) -> DocumentRef {
        DocumentRef {
            name: name.to_string(),
            path: self.paths.get(name).cloned(),
        }
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    catalog: DocumentCatalog,
}

impl Retriever {
    /// Fails with `DimensionMismatch` when the embedder and index disagree.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        catalog: DocumentCatalog,
    ) -> Result<Self> {
        check_dimension(index.dims(), embedder.dims())?;
        Ok(Self {
            embedder,
            index,
            catalog,
        })
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn catalog(&self) -> &DocumentCatalog {
        &self.catalog
    }

    /// Names of documents available for questions: the catalog plus
    /// anything already in the index.
    pub async fn document_names(&self) -> Result<Vec<String>> {
        let mut names = self.catalog.names();
        names.extend(self.index.document_names().await?);
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// A `k` larger than the index returns every chunk without error.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(query).await?;
        let hits = self.index.query(&vector, k).await?;
        tracing::debug!(k, hits = hits.len(), "retrieved chunks");
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                document: self.catalog.reference(&hit.chunk.document),
                chunk: hit.chunk,
                score: hit.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::ingest::ingest_document;
    use crate::config::ChunkingConfig;
    use nestie_core::error::Error;
    use nestie_core::index::memory::InMemoryIndex;
    use nestie_core::models::Document;
    use std::path::PathBuf;

    async fn retriever() -> Retriever {
        let embedder = Arc::new(HashedEmbedder::with_dims(128));
        let index = Arc::new(InMemoryIndex::new(128));
        let chunking = ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 20,
        };
        for (name, text) in [
            ("IT Guide", "The office Wi-Fi password is Blueberry42."),
            ("Travel Policy", "Book flights two weeks in advance using the portal."),
        ] {
            let doc = Document::new(name, "", "text/plain", text);
            ingest_document(&doc, &chunking, 8, embedder.as_ref(), index.as_ref())
                .await
                .unwrap();
        }
        let catalog = DocumentCatalog::from_sources(&[DocumentSource {
            name: "IT Guide".to_string(),
            path: PathBuf::from("docs/it.txt"),
        }]);
        Retriever::new(embedder, index, catalog).unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_attaches_document_refs() {
        let retriever = retriever().await;
        let hits = retriever
            .retrieve("what is the wifi password", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.name, "IT Guide");
        assert_eq!(hits[0].document.path.as_deref(), Some("docs/it.txt"));
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let retriever = retriever().await;
        let hits = retriever.retrieve("anything", 50).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|h| h.document.path.is_none()));
        assert!(retriever.retrieve("anything", 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = Retriever::new(
            Arc::new(HashedEmbedder::with_dims(8)),
            Arc::new(InMemoryIndex::new(16)),
            DocumentCatalog::default(),
        );
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_document_names_merge_catalog_and_index() {
        let retriever = retriever().await;
        assert_eq!(
            retriever.document_names().await.unwrap(),
            vec!["IT Guide".to_string(), "Travel Policy".to_string()]
        );
    }
}
