//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers what ingestion and answering need from a
//! similarity search service: create-if-missing, upsert, top-k query.
//! Entries carry `{text, source}` metadata only and are keyed by chunk id.
//!
//! | Provider | Backend |
//! |----------|---------|
//! | `pinecone` | [`PineconeIndex`], remote serverless index over REST |
//! | `sqlite` | [`SqliteIndex`], local file, brute-force cosine |
//! | (tests) | [`InMemoryIndex`] |

pub mod memory;
pub mod pinecone;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{IndexedEntry, ScoredChunk};

pub use memory::InMemoryIndex;
pub use pinecone::PineconeIndex;
pub use sqlite::SqliteIndex;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Provider label used in logs and errors.
    fn provider(&self) -> &str;

    /// Creates the index with the configured dimension and cosine metric if
    /// it does not exist yet, and waits until it accepts writes.
    async fn ensure_index(&self) -> Result<(), ProviderError>;

    /// Inserts or overwrites entries by chunk id. Returns the number written.
    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<usize, ProviderError>;

    /// Returns at most `top_k` entries, most similar first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, ProviderError>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize, ProviderError>;
}

/// Create the vector index named by `index.provider`.
pub async fn create_index(config: &Config) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.index.provider.as_str() {
        "pinecone" => Arc::new(PineconeIndex::new(&config.index, config.pinecone_api_key()?)?),
        "sqlite" => Arc::new(SqliteIndex::open(&config.index.path, config.index.dimension).await?),
        other => anyhow::bail!("Unknown index provider: {}", other),
    };
    Ok(index)
}

/// Sorts by descending score and keeps the best `top_k`.
pub(crate) fn top_k(mut scored: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

pub(crate) fn check_dimension(
    provider: &str,
    expected: usize,
    vector: &[f32],
) -> Result<(), ProviderError> {
    if vector.len() != expected {
        return Err(ProviderError::misconfigured(
            provider,
            format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                expected
            ),
        ));
    }
    Ok(())
}
