//! Session-keyed conversation history.
//!
//! A [`ConversationStore`] keeps the ordered turns of each chat session.
//! Entries expire `history.ttl_secs` (12 h by default) after their last
//! write; an expired session reads back as empty.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::models::{Role, Turn};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Source of "now" for expiry decisions. Swapped out in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Turns of `session_id` in insertion order, empty if unknown or expired.
    async fn fetch(&self, session_id: &str) -> Result<Vec<Turn>>;

    /// Appends `turns` after the existing ones and restarts the expiry window.
    async fn append(&self, session_id: &str, turns: &[Turn]) -> Result<()>;

    /// Drops the whole session.
    async fn clear(&self, session_id: &str) -> Result<()>;
}

/// Opens the store named by `CONVERSATION_STORE_URL` / `history.url`.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn ConversationStore>> {
    let url = config.history_url()?;
    let store = SqliteStore::connect(url, config.history.ttl_secs).await?;
    Ok(Arc::new(store))
}

/// Renders turns for a terminal, one `User:` / `Bot:` line each.
pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::Human => format!("User: {}", turn.content),
            Role::Assistant => format!("Bot: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_labels() {
        let turns = vec![Turn::human("What is a fever?"), Turn::assistant("A raised body temperature.")];
        assert_eq!(
            transcript(&turns),
            "User: What is a fever?\nBot: A raised body temperature."
        );
        assert_eq!(transcript(&[]), "");
    }
}
