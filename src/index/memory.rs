//! In-memory [`VectorIndex`] for tests.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`. Query is brute-force
//! cosine similarity over everything stored.

use async_trait::async_trait;
use std::sync::RwLock;

use super::{check_dimension, top_k, VectorIndex};
use crate::embedding::cosine_similarity;
use crate::error::ProviderError;
use crate::models::{IndexedEntry, ScoredChunk};

pub struct InMemoryIndex {
    dimension: usize,
    entries: RwLock<Vec<IndexedEntry>>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of all stored entries, in insertion order.
    pub fn entries(&self) -> Vec<IndexedEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn provider(&self) -> &str {
        "memory"
    }

    async fn ensure_index(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<usize, ProviderError> {
        for entry in entries {
            check_dimension("memory", self.dimension, &entry.vector)?;
        }
        let mut stored = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for entry in entries {
            stored.retain(|e| e.chunk.id != entry.chunk.id);
            stored.push(entry.clone());
        }
        Ok(entries.len())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ProviderError> {
        check_dimension("memory", self.dimension, vector)?;
        let stored = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let scored = stored
            .iter()
            .map(|e| ScoredChunk {
                id: e.chunk.id.clone(),
                text: e.chunk.text.clone(),
                source: e.chunk.source.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        Ok(top_k(scored, k))
    }

    async fn count(&self) -> Result<usize, ProviderError> {
        Ok(self.entries.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}
