//! Local [`VectorIndex`] stored in a SQLite file.
//!
//! Vectors are kept as little-endian f32 BLOBs next to their chunk text and
//! source. Queries scan every row and rank by cosine similarity, which is
//! fine for a single book-sized corpus and needs no external service.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::{check_dimension, top_k, VectorIndex};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::ProviderError;
use crate::migrate;
use crate::models::{IndexedEntry, ScoredChunk};

const PROVIDER: &str = "sqlite-index";

pub struct SqliteIndex {
    pool: SqlitePool,
    dimension: usize,
}

impl SqliteIndex {
    pub async fn open(path: &Path, dimension: usize) -> anyhow::Result<Self> {
        let pool = db::connect_path(path).await?;
        Ok(Self { pool, dimension })
    }
}

fn store_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::unavailable(PROVIDER, e)
}

/// Like [`store_error`], but a missing table means nothing was ingested yet.
fn read_error(e: sqlx::Error) -> ProviderError {
    match &e {
        sqlx::Error::Database(db) if db.message().contains("no such table") => {
            ProviderError::misconfigured(
                PROVIDER,
                "index does not exist; run `medchat ingest` first",
            )
        }
        _ => store_error(e),
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn ensure_index(&self) -> Result<(), ProviderError> {
        migrate::migrate_index(&self.pool)
            .await
            .map_err(|e| store_error(format!("{:#}", e)))
    }

    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<usize, ProviderError> {
        for entry in entries {
            check_dimension(PROVIDER, self.dimension, &entry.vector)?;
        }

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries (id, source, text, dims, vector)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source = excluded.source,
                    text = excluded.text,
                    dims = excluded.dims,
                    vector = excluded.vector
                "#,
            )
            .bind(&entry.chunk.id)
            .bind(&entry.chunk.source)
            .bind(&entry.chunk.text)
            .bind(entry.vector.len() as i64)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)?;

        Ok(entries.len())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ProviderError> {
        check_dimension(PROVIDER, self.dimension, vector)?;

        let rows = sqlx::query("SELECT id, source, text, vector FROM index_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                ScoredChunk {
                    id: row.get("id"),
                    text: row.get("text"),
                    source: row.get("source"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
            })
            .collect();

        Ok(top_k(scored, k))
    }

    async fn count(&self) -> Result<usize, ProviderError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(read_error)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnswerError;
    use crate::models::Chunk;
    use tempfile::TempDir;

    async fn open_index(tmp: &TempDir) -> SqliteIndex {
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite"), 3)
            .await
            .unwrap();
        index.ensure_index().await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp).await;

        let entries = vec![
            IndexedEntry {
                chunk: Chunk::new("book.pdf", "Headache is pain in the head."),
                vector: vec![1.0, 0.0, 0.0],
            },
            IndexedEntry {
                chunk: Chunk::new("book.pdf", "Fractures are broken bones."),
                vector: vec![0.0, 1.0, 0.0],
            },
        ];
        assert_eq!(index.upsert(&entries).await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index.query(&[0.9, 0.1, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Headache is pain in the head.");
        assert_eq!(hits[0].source, "book.pdf");
    }

    #[tokio::test]
    async fn test_ensure_index_idempotent() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp).await;
        index.ensure_index().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_content_addressed_upsert_overwrites() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp).await;
        let entry = IndexedEntry {
            chunk: Chunk::content_addressed("book.pdf", "Same text"),
            vector: vec![0.0, 0.0, 1.0],
        };
        index.upsert(&[entry.clone()]).await.unwrap();
        index.upsert(&[entry]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_before_ingest_is_misconfiguration() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite"), 3)
            .await
            .unwrap();

        let err = index.query(&[1.0, 0.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, ProviderError::Misconfigured { .. }));
        assert!(err.to_string().contains("medchat ingest"));
        assert!(matches!(AnswerError::from(err), AnswerError::Config(_)));

        let err = index.count().await.unwrap_err();
        assert!(matches!(err, ProviderError::Misconfigured { .. }));
    }
}
