//! Incremental UTF-8 decoding and snapshot aggregation

use super::TextStream;
use crate::error::AskmeError;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;

/// Decodes UTF-8 text that arrives split across arbitrary byte chunks
///
/// A multi-byte sequence cut at a chunk boundary is held back until the
/// rest arrives. Bytes that can never form valid UTF-8 are replaced with
/// U+FFFD.
///
/// # Examples
///
/// ```
/// use askme::client::Utf8Decoder;
///
/// let mut decoder = Utf8Decoder::new();
/// let euro = "€".as_bytes();
/// assert_eq!(decoder.push(&euro[..1]), "");
/// assert_eq!(decoder.push(&euro[1..]), "€");
/// assert_eq!(decoder.finish(), "");
/// ```
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the text that is now complete
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut decoded = String::new();
        let mut input: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    decoded.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
        decoded
    }

    /// Flush whatever is still buffered, lossily
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Number of bytes held back waiting for the rest of a sequence
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

struct Aggregate<S> {
    bytes: Pin<Box<S>>,
    decoder: Utf8Decoder,
    text: String,
    finished: bool,
}

/// Turn a byte stream into a stream of aggregate text snapshots
///
/// Every item is the whole text decoded so far. Chunks that decode to
/// nothing (a lone partial sequence) produce no snapshot. A chunk error
/// ends the stream with `AskmeError::Transport`.
///
/// # Arguments
///
/// * `byte_stream` - Raw response body chunks
///
/// # Returns
///
/// A boxed [`TextStream`] that does nothing until polled
pub fn aggregate_text<S, E>(byte_stream: S) -> TextStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = Aggregate {
        bytes: Box::pin(byte_stream),
        decoder: Utf8Decoder::new(),
        text: String::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(&chunk);
                    if decoded.is_empty() {
                        continue;
                    }
                    state.text.push_str(&decoded);
                    let snapshot = state.text.clone();
                    return Some((Ok(snapshot), state));
                }
                Some(Err(e)) => {
                    tracing::warn!("Response stream failed mid-read: {}", e);
                    state.finished = true;
                    let err = AskmeError::Transport(e.to_string()).into();
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    let tail = state.decoder.finish();
                    if tail.is_empty() {
                        return None;
                    }
                    state.text.push_str(&tail);
                    let snapshot = state.text.clone();
                    return Some((Ok(snapshot), state));
                }
            }
        }
    })
    .boxed()
}
