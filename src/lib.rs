//! # Medical Chatbot
//!
//! Retrieval-augmented question answering over a corpus of medical PDFs.
//!
//! An offline ingestion pass splits the PDFs into overlapping windows,
//! embeds them and stores the vectors in a similarity index. The online
//! chat server embeds each user message, pulls the closest passages,
//! renders them into a system prompt along with the session's earlier
//! turns, and asks a hosted chat model for a short answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │  PDFs    │──▶│ Split + Embed │──▶│ Vector index │
//! │ (ingest) │   │               │   │ (Pinecone)   │
//! └──────────┘   └───────────────┘   └──────┬───────┘
//!                                           │ top-k
//! ┌──────────┐   ┌───────────────┐   ┌──────▼───────┐
//! │ Browser  │──▶│  HTTP  /get   │──▶│   Answer     │──▶ chat model
//! │          │◀──│  (axum)       │◀──│   pipeline   │◀─▶ conversation store
//! └──────────┘   └───────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`loader`] | Directory walking and document normalization |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`chunk`] | Recursive text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index abstraction (Pinecone, SQLite) |
//! | [`history`] | Session-keyed conversation store |
//! | [`llm`] | Chat-completion client |
//! | [`prompt`] | System prompt template |
//! | [`pipeline`] | Per-message answer pipeline |
//! | [`ingest`] | Offline ingestion command |
//! | [`server`] | Chat HTTP server |
//! | [`session`] | Signed session cookies |
//! | [`error`] | Error taxonomy |
//! | [`retry`] | HTTP retry and backoff |
//! | [`db`] | SQLite connections |
//! | [`migrate`] | Schema creation |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod history;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod server;
pub mod session;
