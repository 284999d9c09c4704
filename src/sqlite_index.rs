//! SQLite-backed [`VectorIndex`].
//!
//! Chunks and their embeddings (little-endian f32 BLOBs) live in the
//! `chunks` table; per-document content hashes in `documents`. The index
//! dimensionality and embedding model are written to `meta` on first
//! open. A later open with a different dimensionality is refused; one with
//! a different model clears the stored vectors.
//!
//! Queries are brute-force cosine similarity over every stored row.

use std::path::Path;

use async_trait::async_trait;
use nestie_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use nestie_core::error::{Error, Result};
use nestie_core::index::{check_batch, check_dimension, top_k, VectorIndex};
use nestie_core::models::{Chunk, ScoredChunk};
use sqlx::{Row, SqlitePool};

use crate::db;

pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
}

fn index_err(e: impl std::fmt::Display) -> Error {
    Error::VectorIndex(e.to_string())
}

impl SqliteIndex {
    /// Open or create the index at `path` for vectors of `dims` length
    /// produced by `model`.
    ///
    /// Reopening with another model of the same dimensionality drops every
    /// stored chunk and document hash, so the next ingestion re-embeds all
    /// documents.
    pub async fn open(path: &Path, dims: usize, model: &str) -> Result<Self> {
        let pool = db::connect(path).await.map_err(index_err)?;
        db::migrate(&pool).await.map_err(index_err)?;

        match read_meta(&pool, "dims").await? {
            Some(value) => {
                let existing: usize = value
                    .parse()
                    .map_err(|_| Error::VectorIndex(format!("corrupt dims entry: {}", value)))?;
                if existing != dims {
                    pool.close().await;
                    return Err(Error::DimensionMismatch {
                        expected: existing,
                        actual: dims,
                    });
                }
            }
            None => write_meta(&pool, "dims", &dims.to_string()).await?,
        }

        match read_meta(&pool, "model").await? {
            Some(existing) if existing == model => {}
            Some(existing) => {
                tracing::warn!(
                    previous = %existing,
                    current = %model,
                    "embedding model changed; clearing index for re-embedding"
                );
                let mut tx = pool.begin().await.map_err(index_err)?;
                sqlx::query("DELETE FROM chunks")
                    .execute(&mut *tx)
                    .await
                    .map_err(index_err)?;
                sqlx::query("DELETE FROM documents")
                    .execute(&mut *tx)
                    .await
                    .map_err(index_err)?;
                write_meta(&mut *tx, "model", model).await?;
                tx.commit().await.map_err(index_err)?;
            }
            None => write_meta(&pool, "model", model).await?,
        }

        Ok(Self { pool, dims })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn read_meta(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(index_err)
}

async fn write_meta<'e, E>(executor: E, key: &str, value: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO meta (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await
    .map_err(index_err)?;
    Ok(())
}

async fn insert_chunk<'e, E>(executor: E, chunk: &Chunk, vector: &[f32]) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO chunks (id, document, chunk_index, char_start, text, hash, embedding)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            document = excluded.document,
            chunk_index = excluded.chunk_index,
            char_start = excluded.char_start,
            text = excluded.text,
            hash = excluded.hash,
            embedding = excluded.embedding
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document)
    .bind(chunk.chunk_index)
    .bind(chunk.char_start as i64)
    .bind(&chunk.text)
    .bind(&chunk.hash)
    .bind(vec_to_blob(vector))
    .execute(executor)
    .await
    .map_err(index_err)?;
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        check_dimension(self.dims, vector.len())?;
        insert_chunk(&self.pool, chunk, vector).await
    }

    async fn replace_document(
        &self,
        document: &str,
        hash: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        check_batch(self.dims, chunks, vectors)?;

        let mut tx = self.pool.begin().await.map_err(index_err)?;
        sqlx::query("DELETE FROM chunks WHERE document = ?")
            .bind(document)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            insert_chunk(&mut *tx, chunk, vector).await?;
        }
        sqlx::query(
            r#"
            INSERT INTO documents (name, hash, chunk_count, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                hash = excluded.hash,
                chunk_count = excluded.chunk_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document)
        .bind(hash)
        .bind(chunks.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(index_err)?;
        tx.commit().await.map_err(index_err)?;
        Ok(())
    }

    async fn remove_document(&self, document: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;
        sqlx::query("DELETE FROM chunks WHERE document = ?")
            .bind(document)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        sqlx::query("DELETE FROM documents WHERE name = ?")
            .bind(document)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        tx.commit().await.map_err(index_err)?;
        Ok(())
    }

    async fn document_hash(&self, document: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT hash FROM documents WHERE name = ?")
            .bind(document)
            .fetch_optional(&self.pool)
            .await
            .map_err(index_err)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_dimension(self.dims, vector.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, document, chunk_index, char_start, text, hash, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let stored = blob_to_vec(&blob);
            let char_start: i64 = row.get("char_start");
            candidates.push(ScoredChunk {
                score: cosine_similarity(vector, &stored),
                chunk: Chunk {
                    id: row.get("id"),
                    document: row.get("document"),
                    chunk_index: row.get("chunk_index"),
                    char_start: char_start.max(0) as usize,
                    text: row.get("text"),
                    hash: row.get("hash"),
                },
            });
        }
        Ok(top_k(candidates, k))
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(count as usize)
    }

    async fn document_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT document FROM chunks ORDER BY document")
            .fetch_all(&self.pool)
            .await
            .map_err(index_err)
    }
}
