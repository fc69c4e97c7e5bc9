//! Answer pipeline: one user message in, one grounded answer out.
//!
//! For each message the pipeline
//!
//! 1. loads the session's prior turns,
//! 2. embeds the message and queries the vector index for the nearest
//!    passages (`retrieval.top_k`, default 3),
//! 3. renders the system prompt with those passages and the prior turns,
//! 4. asks the chat model, and
//! 5. appends the human/assistant pair to the conversation store.
//!
//! Requests on the same session are serialized by [`SessionLocks`] for the
//! whole load→append span, so concurrent messages never interleave their
//! turns. Nothing is stored if any step before the append fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::AnswerError;
use crate::history::{connect_store, transcript, ConversationStore};
use crate::index::{create_index, VectorIndex};
use crate::llm::{create_chat_model, ChatMessage, ChatModel};
use crate::models::{ScoredChunk, Turn};
use crate::prompt::render_system_prompt;

/// The model's reply and the passages it was given.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub passages: Vec<ScoredChunk>,
}

pub struct AnswerPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn ConversationStore>,
    model: Arc<dyn ChatModel>,
    retrieval: RetrievalConfig,
    locks: SessionLocks,
}

impl AnswerPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn ConversationStore>,
        model: Arc<dyn ChatModel>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            model,
            retrieval,
            locks: SessionLocks::default(),
        }
    }

    /// Builds every collaborator from configuration. Fails on missing
    /// secrets before any request is served.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let model = create_chat_model(config)?;
        let embedder = create_provider(config)?;
        let index = create_index(config).await?;
        let store = connect_store(config).await?;

        tracing::info!(
            model = model.model_name(),
            embedder = embedder.model_name(),
            index = index.provider(),
            "answer pipeline ready"
        );

        Ok(Self::new(
            embedder,
            index,
            store,
            model,
            config.retrieval.clone(),
        ))
    }

    pub async fn answer(&self, message: &str, session_id: &str) -> Result<Answer, AnswerError> {
        if message.trim().is_empty() {
            return Err(AnswerError::EmptyMessage);
        }

        let _guard = self.locks.acquire(session_id).await;

        let history = self
            .store
            .fetch(session_id)
            .await
            .map_err(AnswerError::store)?;

        let query = self.embedder.embed_query(message).await?;
        let passages = self.index.query(&query, self.retrieval.top_k).await?;

        if passages.is_empty() {
            if self.retrieval.require_context {
                return Err(AnswerError::EmptyRetrieval);
            }
            tracing::warn!(session = session_id, "no passages retrieved, answering without context");
        }

        let system = render_system_prompt(&history, &passages);
        let messages = [ChatMessage::system(system), ChatMessage::user(message)];
        let text = self.model.complete(&messages).await?;

        let turns = [Turn::human(message), Turn::assistant(text.as_str())];
        self.store
            .append(session_id, &turns)
            .await
            .map_err(AnswerError::store)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut all = history;
            all.extend(turns);
            tracing::debug!(session = session_id, "conversation so far:\n{}", transcript(&all));
        }

        Ok(Answer { text, passages })
    }

    /// Stored turns of a session, oldest first.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, AnswerError> {
        self.store
            .fetch(session_id)
            .await
            .map_err(AnswerError::store)
    }
}

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// One async mutex per active session.
#[derive(Default)]
pub struct SessionLocks {
    locks: LockMap,
}

impl SessionLocks {
    /// Waits until no other request holds `session_id`.
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        // Created before waiting so a cancelled wait still prunes the entry.
        let entry = LockEntry {
            lock: Some(lock.clone()),
            session_id: session_id.to_string(),
            locks: self.locks.clone(),
        };
        let guard = lock.lock_owned().await;
        SessionGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of sessions with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held for the duration of one request. Releases the session's lock,
/// then drops its map entry.
pub struct SessionGuard {
    // Field order matters: the mutex guard is released before the entry
    // checks whether anyone else still uses the lock.
    _guard: OwnedMutexGuard<()>,
    _entry: LockEntry,
}

/// A request's claim on a session's map entry, held while waiting for the
/// lock and while holding it. Removes the entry on drop when nobody else
/// is holding or waiting for it.
struct LockEntry {
    lock: Option<Arc<AsyncMutex<()>>>,
    session_id: String,
    locks: LockMap,
}

impl Drop for LockEntry {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let Some(current) = locks.get(&self.session_id) else {
            return;
        };
        if !Arc::ptr_eq(current, &lock) {
            return;
        }
        // Released under the map lock, so the last entry to leave sees
        // the map as the only owner.
        drop(lock);
        if Arc::strong_count(current) == 1 {
            locks.remove(&self.session_id);
        }
    }
}
