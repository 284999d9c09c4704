//! In-memory [`VectorIndex`] for tests and ephemeral deployments.
//!
//! Chunks live in a `HashMap` keyed by chunk id behind `std::sync::RwLock`.
//! Queries are brute-force cosine similarity over every stored vector.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Chunk, ScoredChunk};

use super::{check_batch, check_dimension, top_k, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    dims: usize,
    chunks: RwLock<HashMap<String, StoredChunk>>,
    document_hashes: RwLock<HashMap<String, String>>,
}

impl InMemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            chunks: RwLock::new(HashMap::new()),
            document_hashes: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::VectorIndex("index lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        check_dimension(self.dims, vector.len())?;
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        chunks.insert(
            chunk.id.clone(),
            StoredChunk {
                chunk: chunk.clone(),
                vector: vector.to_vec(),
            },
        );
        Ok(())
    }

    async fn replace_document(
        &self,
        document: &str,
        hash: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        check_batch(self.dims, chunks, vectors)?;
        {
            let mut stored = self.chunks.write().map_err(poisoned)?;
            stored.retain(|_, sc| sc.chunk.document != document);
            for (chunk, vector) in chunks.iter().zip(vectors) {
                stored.insert(
                    chunk.id.clone(),
                    StoredChunk {
                        chunk: chunk.clone(),
                        vector: vector.clone(),
                    },
                );
            }
        }
        self.document_hashes
            .write()
            .map_err(poisoned)?
            .insert(document.to_string(), hash.to_string());
        Ok(())
    }

    async fn remove_document(&self, document: &str) -> Result<()> {
        self.chunks
            .write()
            .map_err(poisoned)?
            .retain(|_, sc| sc.chunk.document != document);
        self.document_hashes
            .write()
            .map_err(poisoned)?
            .remove(document);
        Ok(())
    }

    async fn document_hash(&self, document: &str) -> Result<Option<String>> {
        Ok(self
            .document_hashes
            .read()
            .map_err(poisoned)?
            .get(document)
            .cloned())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_dimension(self.dims, vector.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let stored = self.chunks.read().map_err(poisoned)?;
        let candidates = stored
            .values()
            .map(|sc| ScoredChunk {
                chunk: sc.chunk.clone(),
                score: cosine_similarity(vector, &sc.vector),
            })
            .collect();
        Ok(top_k(candidates, k))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.chunks.read().map_err(poisoned)?.len())
    }

    async fn document_names(&self) -> Result<Vec<String>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let names: BTreeSet<String> = stored.values().map(|sc| sc.chunk.document.clone()).collect();
        Ok(names.into_iter().collect())
    }
}
