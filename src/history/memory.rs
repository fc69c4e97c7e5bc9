//! In-process [`ConversationStore`], used by tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{system_clock, Clock, ConversationStore};
use crate::models::Turn;

struct Entry {
    turns: Vec<Turn>,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    clock: Clock,
}

impl InMemoryStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn fetch(&self, session_id: &str) -> Result<Vec<Turn>> {
        let now = (self.clock)();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get(session_id) {
            Some(entry) if entry.expires_at > now => Ok(entry.turns.clone()),
            Some(_) => {
                sessions.remove(session_id);
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn append(&self, session_id: &str, turns: &[Turn]) -> Result<()> {
        let now = (self.clock)();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| Entry {
            turns: Vec::new(),
            expires_at: now,
        });
        if entry.expires_at <= now {
            entry.turns.clear();
        }
        entry.turns.extend_from_slice(turns);
        entry.expires_at = now + self.ttl;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        Ok(())
    }
}
