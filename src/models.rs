//! Core data types that flow through ingestion and answering.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A loaded source document reduced to its text and origin.
///
/// Loaders may know much more (page numbers, titles, timestamps); all of it
/// is dropped during normalization and only `source` survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub source: String,
}

/// A window of a [`Document`]'s text, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: String,
    /// SHA-256 of `source` and `text`.
    pub hash: String,
}

impl Chunk {
    /// Builds a chunk with a random id. Ingesting the same text twice yields
    /// two distinct entries.
    pub fn new(source: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            source: source.to_string(),
            hash: content_hash(source, text),
        }
    }

    /// Builds a chunk whose id is its content hash, so re-upserting the same
    /// text overwrites the earlier entry.
    pub fn content_addressed(source: &str, text: &str) -> Self {
        let hash = content_hash(source, text);
        Self {
            id: hash.clone(),
            text: text.to_string(),
            source: source.to_string(),
            hash,
        }
    }
}

pub fn content_hash(source: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A chunk paired with its embedding, as written to the vector index.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A passage returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
}

/// Who said a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "ai")]
    Assistant,
}

impl Role {
    /// Tag used in the conversation store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "ai",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "human" => Some(Role::Human),
            "ai" | "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
