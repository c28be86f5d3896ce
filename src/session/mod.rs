//! Conversation orchestration
//!
//! [`ChatOrchestrator`] owns the active transcript and drives each turn:
//! the user message is persisted first, then the response is streamed into
//! a placeholder message, and the finished response is persisted under the
//! session that was active when the turn started.
//!
//! At most one turn streams at a time. Every turn is tagged with the epoch
//! current when it started; starting a new chat or loading a session bumps
//! the epoch and cancels the turn, and anything a stale turn produces
//! afterwards is dropped.

use crate::client::{ResponseStreamer, TextStream};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::ids::{MessageId, RemoteConversationId, SessionId};
use crate::storage::{ChatStore, Message};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

mod turn;

pub use turn::{ChatView, SendOutcome, TurnHandle, TurnOutcome};

const ERROR_PREFIX: &str = "Sorry, I encountered an error while processing your request";

struct State {
    session_id: Option<SessionId>,
    remote_id: RemoteConversationId,
    messages: Vec<Message>,
    /// Messages to write when the session is created: the seed greeting,
    /// user messages and completed replies, never failed or cancelled ones
    unsaved: Vec<Message>,
    streaming: Option<MessageId>,
    epoch: u64,
    cancel: Option<CancellationToken>,
    notice: Option<String>,
}

impl State {
    fn view(&self) -> ChatView {
        ChatView {
            session_id: self.session_id.clone(),
            remote_conversation_id: self.remote_id.clone(),
            messages: self.messages.clone(),
            is_streaming: self.streaming.is_some(),
            notice: self.notice.clone(),
        }
    }

    /// Invalidate the in-flight turn, if any
    fn supersede(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.streaming = None;
    }

    fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }
}

struct Inner {
    store: Arc<ChatStore>,
    streamer: Arc<dyn ResponseStreamer>,
    greeting: Option<String>,
    session_name_length: usize,
    state: Mutex<State>,
    view_tx: watch::Sender<ChatView>,
}

/// Everything a running turn needs to find its way back
struct Turn {
    epoch: u64,
    session_id: Option<SessionId>,
    placeholder_id: MessageId,
    token: CancellationToken,
}

/// Conversation state machine
///
/// Cheap to clone; all clones drive the same conversation.
///
/// # Examples
///
/// ```no_run
/// use askme::client::HttpChatClient;
/// use askme::config::Config;
/// use askme::session::ChatOrchestrator;
/// use askme::storage::ChatStore;
/// use std::sync::Arc;
///
/// # async fn example() -> askme::error::Result<()> {
/// let config = Config::default();
/// let store = Arc::new(ChatStore::open(config.storage.resolve_path()?).await?);
/// let client = Arc::new(HttpChatClient::new(&config.api)?);
/// let chat = ChatOrchestrator::new(store, client, &config.chat);
///
/// if let Some(turn) = chat.send("What's in the catalog?").await.into_turn() {
///     turn.wait().await?;
/// }
/// println!("{:?}", chat.snapshot().messages.last());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatOrchestrator {
    inner: Arc<Inner>,
}

impl ChatOrchestrator {
    /// Create an orchestrator holding a fresh, unsaved conversation
    pub fn new(
        store: Arc<ChatStore>,
        streamer: Arc<dyn ResponseStreamer>,
        chat: &ChatConfig,
    ) -> Self {
        let seeds = seed_messages(chat.greeting.as_deref());
        let state = State {
            session_id: None,
            remote_id: RemoteConversationId::generate(),
            messages: seeds.clone(),
            unsaved: seeds,
            streaming: None,
            epoch: 0,
            cancel: None,
            notice: None,
        };
        let (view_tx, _) = watch::channel(state.view());

        Self {
            inner: Arc::new(Inner {
                store,
                streamer,
                greeting: chat.greeting.clone(),
                session_name_length: chat.session_name_length.max(1),
                state: Mutex::new(state),
                view_tx,
            }),
        }
    }

    /// The store backing this conversation
    pub fn store(&self) -> &Arc<ChatStore> {
        &self.inner.store
    }

    /// Latest published view
    pub fn snapshot(&self) -> ChatView {
        self.inner.view_tx.borrow().clone()
    }

    /// Watch the view; a new value is published after every state change
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.inner.view_tx.subscribe()
    }

    fn publish(&self, state: &State) {
        self.inner.view_tx.send_replace(state.view());
    }

    /// Drop the current transcript and begin an unsaved conversation
    ///
    /// Any streaming response is abandoned, and the new conversation gets a
    /// fresh remote identity.
    pub async fn start_new_chat(&self) {
        let mut state = self.inner.state.lock().await;
        self.reset(&mut state);
        self.publish(&state);
        tracing::info!(remote_id = %state.remote_id, "Started new chat");
    }

    fn reset(&self, state: &mut State) {
        state.supersede();
        state.session_id = None;
        state.remote_id = RemoteConversationId::generate();
        state.messages = seed_messages(self.inner.greeting.as_deref());
        state.unsaved = state.messages.clone();
        state.notice = None;
    }

    /// Replace the transcript with a stored session
    ///
    /// Returns `false` (leaving the transcript as it was and setting a
    /// notice) if the session does not exist or cannot be read.
    pub async fn load_session(&self, session_id: &SessionId) -> bool {
        let mut state = self.inner.state.lock().await;

        let stored = match self.inner.store.get_session(session_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::warn!(session_id = %session_id, "Session not found");
                state.notice = Some(format!("Chat session {} was not found", session_id));
                self.publish(&state);
                return false;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, "Failed to load session: {:#}", e);
                state.notice = Some(format!("Failed to load chat session: {}", e));
                self.publish(&state);
                return false;
            }
        };

        let mut notice = None;
        let remote_id = match stored.session.remote_conversation_id {
            Some(remote_id) => remote_id,
            None => {
                let remote_id = RemoteConversationId::generate();
                tracing::warn!(
                    session_id = %session_id,
                    remote_id = %remote_id,
                    "Session has no remote conversation id; starting a new remote conversation"
                );
                if let Err(e) = self
                    .inner
                    .store
                    .update_remote_conversation_id(session_id, &remote_id)
                    .await
                {
                    tracing::error!("Failed to persist regenerated remote id: {:#}", e);
                }
                notice = Some(
                    "This conversation's server context was missing, so earlier messages \
                     will not be remembered by the assistant."
                        .to_string(),
                );
                remote_id
            }
        };

        state.supersede();
        state.session_id = Some(stored.session.id);
        state.remote_id = remote_id;
        state.messages = stored.messages;
        state.unsaved.clear();
        state.notice = notice;
        self.publish(&state);

        tracing::info!(
            session_id = %session_id,
            remote_id = %state.remote_id,
            messages = state.messages.len(),
            "Loaded session"
        );
        true
    }

    /// Send a prompt and start streaming the response
    ///
    /// Blank input is ignored, as is any send while a response is still
    /// streaming. The user message is persisted before the request opens;
    /// the first send of a fresh conversation creates its session.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let prompt = text.trim();
        if prompt.is_empty() {
            return SendOutcome::Ignored;
        }

        let mut state = self.inner.state.lock().await;
        if state.streaming.is_some() {
            tracing::debug!("Ignoring send while a response is streaming");
            return SendOutcome::Ignored;
        }

        let user_message = Message::user(prompt);
        state.messages.push(user_message.clone());
        state.notice = None;
        self.persist_user_message(&mut state, prompt, &user_message).await;

        let placeholder = Message::streaming_placeholder();
        let placeholder_id = placeholder.id.clone();
        state.messages.push(placeholder);
        state.streaming = Some(placeholder_id.clone());

        let token = CancellationToken::new();
        state.cancel = Some(token.clone());

        let turn = Turn {
            epoch: state.epoch,
            session_id: state.session_id.clone(),
            placeholder_id: placeholder_id.clone(),
            token: token.clone(),
        };
        let stream = self.inner.streamer.stream(prompt, &state.remote_id);
        tracing::info!(
            session_id = ?turn.session_id,
            remote_id = %state.remote_id,
            "Sending prompt"
        );
        self.publish(&state);
        drop(state);

        let task = tokio::spawn(self.clone().run_turn(turn, stream));
        SendOutcome::Started(TurnHandle {
            placeholder_id,
            cancel: token,
            task,
        })
    }

    async fn persist_user_message(&self, state: &mut State, prompt: &str, message: &Message) {
        let result = if let Some(session_id) = state.session_id.clone() {
            self.inner.store.save_message(&session_id, message).await
        } else {
            state.unsaved.push(message.clone());
            let first_prompt = state
                .unsaved
                .iter()
                .find(|m| m.is_user)
                .map_or(prompt, |m| m.content.as_str());
            let name = session_name(first_prompt, self.inner.session_name_length);
            let created = self
                .inner
                .store
                .create_session(&name, &state.unsaved, Some(state.remote_id.clone()))
                .await;
            created.map(|session_id| {
                state.session_id = Some(session_id);
                state.unsaved.clear();
            })
        };

        if let Err(e) = result {
            tracing::error!("Failed to persist user message: {:#}", e);
            state.notice = Some(format!("Your message could not be saved: {}", e));
        }
    }

    /// Cancel the streaming response, if any
    pub async fn cancel_turn(&self) {
        let state = self.inner.state.lock().await;
        if let Some(token) = &state.cancel {
            token.cancel();
        }
    }

    async fn run_turn(self, turn: Turn, mut stream: TextStream) -> TurnOutcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = turn.token.cancelled() => return self.finish_cancelled(&turn).await,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(text)) => {
                    if !self.apply_snapshot(&turn, text).await {
                        return TurnOutcome::Superseded;
                    }
                }
                Some(Err(e)) => return self.finish_failed(&turn, e).await,
                None => return self.finish_completed(&turn).await,
            }
        }
    }

    async fn apply_snapshot(&self, turn: &Turn, text: String) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.epoch != turn.epoch {
            return false;
        }
        if let Some(message) = state.message_mut(&turn.placeholder_id) {
            message.content = text;
        }
        self.publish(&state);
        true
    }

    async fn finish_completed(&self, turn: &Turn) -> TurnOutcome {
        let mut state = self.inner.state.lock().await;
        if state.epoch != turn.epoch {
            return TurnOutcome::Superseded;
        }

        let finished = state.message_mut(&turn.placeholder_id).map(|message| {
            message.is_streaming = false;
            message.clone()
        });

        match (&turn.session_id, finished) {
            (Some(session_id), Some(message)) => {
                if let Err(e) = self.inner.store.save_message(session_id, &message).await {
                    tracing::error!("Failed to persist response: {:#}", e);
                    state.notice = Some(format!("The response could not be saved: {}", e));
                }
            }
            (None, Some(message)) => {
                tracing::warn!("Response completed without a stored session; saving it later");
                state.unsaved.push(message);
            }
            (None, None) => tracing::warn!("Placeholder message vanished before completion"),
            (Some(_), None) => tracing::warn!("Placeholder message vanished before completion"),
        }

        state.streaming = None;
        state.cancel = None;
        self.publish(&state);
        tracing::debug!(message_id = %turn.placeholder_id, "Response completed");
        TurnOutcome::Completed
    }

    async fn finish_failed(&self, turn: &Turn, error: anyhow::Error) -> TurnOutcome {
        let mut state = self.inner.state.lock().await;
        if state.epoch != turn.epoch {
            return TurnOutcome::Superseded;
        }

        tracing::error!("Response stream failed: {:#}", error);
        if let Some(message) = state.message_mut(&turn.placeholder_id) {
            message.is_streaming = false;
            message.error = true;
            message.content = format!("{}: {}", ERROR_PREFIX, error);
        }
        state.streaming = None;
        state.cancel = None;
        self.publish(&state);
        TurnOutcome::Failed
    }

    async fn finish_cancelled(&self, turn: &Turn) -> TurnOutcome {
        let mut state = self.inner.state.lock().await;
        if state.epoch != turn.epoch {
            return TurnOutcome::Superseded;
        }

        if let Some(message) = state.message_mut(&turn.placeholder_id) {
            message.is_streaming = false;
        }
        state.streaming = None;
        state.cancel = None;
        self.publish(&state);
        tracing::info!(message_id = %turn.placeholder_id, "Response cancelled");
        TurnOutcome::Cancelled
    }

    /// Rename the active session
    ///
    /// Returns `Ok(false)` if the conversation has not been saved yet.
    pub async fn rename_active_session(&self, name: &str) -> Result<bool> {
        let state = self.inner.state.lock().await;
        let Some(session_id) = &state.session_id else {
            return Ok(false);
        };
        self.inner.store.update_session_name(session_id, name).await?;
        Ok(true)
    }

    /// Delete a stored session; deleting the active one starts a new chat
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.store.delete_session(session_id).await?;

        if state.session_id.as_ref() == Some(session_id) {
            self.reset(&mut state);
            self.publish(&state);
            tracing::info!("Active session deleted; started new chat");
        }
        Ok(())
    }

    /// Delete every stored session and start a new chat
    pub async fn clear_all_sessions(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.store.clear_all_sessions().await?;
        self.reset(&mut state);
        self.publish(&state);
        Ok(())
    }
}

fn seed_messages(greeting: Option<&str>) -> Vec<Message> {
    greeting
        .filter(|g| !g.trim().is_empty())
        .map(|g| vec![Message::assistant(g)])
        .unwrap_or_default()
}

/// Session name derived from the first prompt
fn session_name(prompt: &str, max_chars: usize) -> String {
    if prompt.chars().count() <= max_chars {
        return prompt.to_string();
    }
    let truncated: String = prompt.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_store;
    use futures::stream;

    struct FixedStreamer(Vec<&'static str>);

    impl ResponseStreamer for FixedStreamer {
        fn stream(&self, _prompt: &str, _conversation_id: &RemoteConversationId) -> TextStream {
            let items: Vec<Result<String>> = self.0.iter().map(|s| Ok(s.to_string())).collect();
            stream::iter(items).boxed()
        }
    }

    fn no_greeting() -> ChatConfig {
        ChatConfig {
            greeting: None,
            ..ChatConfig::default()
        }
    }

    #[test]
    fn test_session_name_keeps_short_prompts() {
        assert_eq!(session_name("hello", 50), "hello");
    }

    #[test]
    fn test_session_name_truncates_on_char_boundary() {
        assert_eq!(session_name("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_seed_messages_skips_blank_greeting() {
        assert!(seed_messages(None).is_empty());
        assert!(seed_messages(Some("  ")).is_empty());
        let seeded = seed_messages(Some("Hi"));
        assert_eq!(seeded.len(), 1);
        assert!(!seeded[0].is_user);
    }

    #[tokio::test]
    async fn test_new_orchestrator_shows_greeting() {
        let (store, _dir) = temp_store().await;
        let chat = ChatOrchestrator::new(
            Arc::new(store),
            Arc::new(FixedStreamer(vec![])),
            &ChatConfig::default(),
        );

        let view = chat.snapshot();
        assert!(view.session_id.is_none());
        assert!(!view.is_streaming);
        assert_eq!(view.messages.len(), 1);
        assert!(view.messages[0].content.starts_with("Hello!"));
    }

    #[tokio::test]
    async fn test_blank_send_is_ignored() {
        let (store, _dir) = temp_store().await;
        let chat = ChatOrchestrator::new(
            Arc::new(store),
            Arc::new(FixedStreamer(vec!["x"])),
            &no_greeting(),
        );

        assert!(matches!(chat.send("   ").await, SendOutcome::Ignored));
        assert!(chat.snapshot().messages.is_empty());
        assert!(chat.store().current_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_send_completes_and_names_session() {
        let (store, _dir) = temp_store().await;
        let chat = ChatOrchestrator::new(
            Arc::new(store),
            Arc::new(FixedStreamer(vec!["a", "ab"])),
            &no_greeting(),
        );

        let turn = chat.send("  What is sled?  ").await.into_turn().unwrap();
        assert_eq!(turn.wait().await.unwrap(), TurnOutcome::Completed);

        let view = chat.snapshot();
        assert!(!view.is_streaming);
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.messages[0].content, "What is sled?");
        assert_eq!(view.messages[1].content, "ab");

        let sessions = chat.store().current_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "What is sled?");
        assert_eq!(sessions[0].message_count, 2);
    }

    #[tokio::test]
    async fn test_rename_without_session_returns_false() {
        let (store, _dir) = temp_store().await;
        let chat = ChatOrchestrator::new(
            Arc::new(store),
            Arc::new(FixedStreamer(vec![])),
            &no_greeting(),
        );
        assert!(!chat.rename_active_session("x").await.unwrap());
    }
}
