use crate::error::Result;
use crate::ids::{MessageId, RemoteConversationId, SessionId};
use crate::storage::Message;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What the rendering surface shows for the current conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    /// Stored session backing the transcript, if one has been created
    pub session_id: Option<SessionId>,
    /// Conversation identity sent with every prompt
    pub remote_conversation_id: RemoteConversationId,
    /// Transcript, oldest first
    pub messages: Vec<Message>,
    /// True while a response is growing
    pub is_streaming: bool,
    /// One-off message for the user (load failures, identity recovery)
    pub notice: Option<String>,
}

impl ChatView {
    /// The message currently being streamed into, if any
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    /// Look up a transcript message by id
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }
}

/// Result of [`ChatOrchestrator::send`](super::ChatOrchestrator::send)
#[derive(Debug)]
pub enum SendOutcome {
    /// Blank input, or a response is already streaming
    Ignored,
    /// A turn was started
    Started(TurnHandle),
}

impl SendOutcome {
    /// The turn handle, if a turn was started
    pub fn into_turn(self) -> Option<TurnHandle> {
        match self {
            SendOutcome::Started(turn) => Some(turn),
            SendOutcome::Ignored => None,
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream finished and the response was persisted
    Completed,
    /// The stream failed; the bubble shows the error and nothing was stored
    Failed,
    /// The user cancelled; partial text stays on screen, nothing was stored
    Cancelled,
    /// The user navigated away (new chat or another session) mid-stream
    Superseded,
}

/// Handle to an in-flight turn
#[derive(Debug)]
pub struct TurnHandle {
    pub(super) placeholder_id: MessageId,
    pub(super) cancel: CancellationToken,
    pub(super) task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Id of the assistant message this turn streams into
    pub fn placeholder_id(&self) -> &MessageId {
        &self.placeholder_id
    }

    /// Stop the turn, keeping whatever text has arrived
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the turn to end
    ///
    /// # Errors
    ///
    /// Returns an error only if the turn task panicked or was aborted
    pub async fn wait(self) -> Result<TurnOutcome> {
        Ok(self.task.await?)
    }
}
