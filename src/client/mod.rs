//! Streaming chat client
//!
//! A [`ResponseStreamer`] turns one prompt into a [`TextStream`]: a lazy,
//! finite stream whose items are the full response text received so far.
//! Each item supersedes the previous one, so consumers simply replace what
//! they render.

use crate::error::Result;
use crate::ids::RemoteConversationId;
use futures::Stream;
use std::pin::Pin;

pub mod decoder;
pub mod http;

pub use decoder::{aggregate_text, Utf8Decoder};
pub use http::HttpChatClient;

/// Stream of growing text snapshots
///
/// Ends after the final snapshot, or after a single terminal `Err`.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Source of streamed responses for a conversation
///
/// Implementations must not do any network work until the returned stream
/// is first polled, and must send `conversation_id` exactly as given.
pub trait ResponseStreamer: Send + Sync {
    /// Open a response stream for `prompt` within `conversation_id`
    fn stream(&self, prompt: &str, conversation_id: &RemoteConversationId) -> TextStream;
}
