//! AskMe - streaming chat client library
//!
//! This library provides the core of the Ask Me chat client: a streaming
//! response pipeline that turns a chunked HTTP response into growing text
//! snapshots, and a session layer that persists conversations in an
//! embedded store so they can be resumed later.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `ids`: Random UUID-shaped identifiers and their newtypes
//! - `storage`: Transactional session and message store with a live session list
//! - `client`: Streaming chat client and the `ResponseStreamer` seam
//! - `session`: Conversation state machine tying storage and streaming together
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use askme::{ChatOrchestrator, ChatStore, Config, HttpChatClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let store = Arc::new(ChatStore::open(config.storage.resolve_path()?).await?);
//!     let client = Arc::new(HttpChatClient::new(&config.api)?);
//!     let chat = ChatOrchestrator::new(store, client, &config.chat);
//!
//!     if let Some(turn) = chat.send("hello").await.into_turn() {
//!         turn.wait().await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod ids;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use client::{HttpChatClient, ResponseStreamer, TextStream};
pub use config::Config;
pub use error::{AskmeError, Result};
pub use ids::{MessageId, RemoteConversationId, SessionId};
pub use session::{ChatOrchestrator, ChatView, SendOutcome, TurnHandle, TurnOutcome};
pub use storage::{ChatStore, Message, Session, StoredSession};

#[cfg(test)]
pub mod test_utils;
