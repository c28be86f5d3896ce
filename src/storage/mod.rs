//! Session persistence
//!
//! Sessions and their messages live in an embedded `sled` database made of
//! three trees:
//!
//! - `sessions`: session id -> JSON [`Session`]
//! - `messages`: message id -> JSON message row (message + owning session id)
//! - `message_index`: `session_id \0 timestamp seq` -> message id, the
//!   secondary index used for ordered per-session reads and cascading deletes
//!
//! Every mutation runs in one sled transaction over the trees it touches.
//! After each commit the full session list is re-read and published on a
//! `watch` channel, so observers only ever see committed snapshots.

use crate::error::{AskmeError, Result};
use crate::ids::{RemoteConversationId, SessionId};
use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Transactional, Tree};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{watch, OnceCell};
use tokio_stream::wrappers::WatchStream;

pub mod types;
pub use types::{Message, Session, StoredSession};

use types::MessageRecord;

const SESSIONS_TREE: &str = "sessions";
const MESSAGES_TREE: &str = "messages";
const MESSAGE_INDEX_TREE: &str = "message_index";

/// Default number of characters kept in a session's `last_message` preview
pub const DEFAULT_PREVIEW_LENGTH: usize = 100;

struct Trees {
    db: sled::Db,
    sessions: Tree,
    messages: Tree,
    message_index: Tree,
}

/// Reasons a transaction closure gives up
enum TxAbort {
    Conflict(String),
    Corrupt(String),
}

/// Transactional store for chat sessions and messages
///
/// The database is opened lazily: the first operation (or an explicit
/// [`ChatStore::init`]) opens it, and concurrent callers all await the same
/// initialization.
///
/// # Examples
///
/// ```no_run
/// use askme::storage::{ChatStore, Message};
///
/// # async fn example() -> askme::error::Result<()> {
/// let store = ChatStore::open("/tmp/askme-store").await?;
/// let id = store
///     .create_session("Demo", &[Message::user("hello")], None)
///     .await?;
/// let stored = store.get_session(&id).await?.expect("session exists");
/// assert_eq!(stored.messages.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct ChatStore {
    path: PathBuf,
    trees: OnceCell<Trees>,
    sessions_tx: watch::Sender<Vec<Session>>,
    clock: AtomicI64,
    preview_length: usize,
}

impl ChatStore {
    /// Create a store handle for the database directory at `path`
    ///
    /// No IO happens until the store is initialized.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (sessions_tx, _) = watch::channel(Vec::new());
        Self {
            path: path.into(),
            trees: OnceCell::new(),
            sessions_tx,
            clock: AtomicI64::new(0),
            preview_length: DEFAULT_PREVIEW_LENGTH,
        }
    }

    /// Set how many characters of the latest message are kept as preview
    pub fn with_preview_length(mut self, preview_length: usize) -> Self {
        self.preview_length = preview_length.max(1);
        self
    }

    /// Create a store handle and initialize it immediately
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::Store` if the database cannot be opened
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(path);
        store.init().await?;
        Ok(store)
    }

    /// Path of the database directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the database if it is not open yet
    ///
    /// Safe to call any number of times, including concurrently.
    pub async fn init(&self) -> Result<()> {
        self.ensure_db().await.map(|_| ())
    }

    async fn ensure_db(&self) -> Result<&Trees> {
        self.trees
            .get_or_try_init(|| async { self.open_trees() })
            .await
    }

    fn open_trees(&self) -> Result<Trees> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AskmeError::Store(format!("Failed to create store directory: {}", e))
            })?;
        }

        let db = sled::open(&self.path)
            .map_err(|e| AskmeError::Store(format!("Failed to open database: {}", e)))?;
        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| AskmeError::Store(format!("Failed to open tree {}: {}", name, e)))
        };
        let trees = Trees {
            sessions: open_tree(SESSIONS_TREE)?,
            messages: open_tree(MESSAGES_TREE)?,
            message_index: open_tree(MESSAGE_INDEX_TREE)?,
            db: db.clone(),
        };

        let sessions = read_sessions(&trees.sessions)?;
        let latest = sessions
            .iter()
            .map(|s| s.updated_at.timestamp_millis())
            .max()
            .unwrap_or(0);
        self.clock.fetch_max(latest, Ordering::SeqCst);

        tracing::info!(
            path = %self.path.display(),
            sessions = sessions.len(),
            "Opened session store"
        );
        self.sessions_tx.send_replace(sessions);

        Ok(trees)
    }

    /// Issue a timestamp strictly later than every one issued before
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        let mut last = self.clock.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self
                .clock
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return DateTime::from_timestamp_millis(next).unwrap_or_else(Utc::now),
                Err(actual) => last = actual,
            }
        }
    }

    fn preview(&self, content: &str) -> String {
        content.chars().take(self.preview_length).collect()
    }

    /// Create a session, writing it and its initial messages atomically
    ///
    /// A blank `name` becomes `Chat <date>`. Initial messages keep their own
    /// timestamps and are stored as finished (not streaming).
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::Store` if the transaction fails and
    /// `AskmeError::Conflict` if a generated or supplied id already exists.
    /// In both cases nothing is written.
    pub async fn create_session(
        &self,
        name: &str,
        initial_messages: &[Message],
        remote_conversation_id: Option<RemoteConversationId>,
    ) -> Result<SessionId> {
        let trees = self.ensure_db().await?;

        let id = SessionId::generate();
        let now = self.now();
        let name = session_name_or_default(name, now);

        let session = Session {
            id: id.clone(),
            name,
            created_at: now,
            updated_at: now,
            message_count: initial_messages.len(),
            last_message: initial_messages.last().map(|m| self.preview(&m.content)),
            remote_conversation_id,
        };
        let session_bytes = serde_json::to_vec(&session).map_err(AskmeError::Serialization)?;

        let mut rows = Vec::with_capacity(initial_messages.len());
        for message in initial_messages {
            let record = MessageRecord {
                session_id: id.clone(),
                message: Message {
                    is_streaming: false,
                    ..message.clone()
                },
            };
            let bytes = serde_json::to_vec(&record).map_err(AskmeError::Serialization)?;
            let seq = next_seq(&trees.db)?;
            rows.push((
                message.id.clone(),
                bytes,
                index_key(&id, message.timestamp, seq),
            ));
        }

        (&trees.sessions, &trees.messages, &trees.message_index)
            .transaction(|(sessions, messages, index)| {
                if sessions.get(id.as_str().as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(TxAbort::Conflict(
                        format!("session {}", id),
                    )));
                }
                sessions.insert(id.as_str().as_bytes(), session_bytes.as_slice())?;

                for (message_id, bytes, key) in &rows {
                    if messages.get(message_id.as_str().as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(TxAbort::Conflict(
                            format!("message {}", message_id),
                        )));
                    }
                    messages.insert(message_id.as_str().as_bytes(), bytes.as_slice())?;
                    index.insert(key.as_slice(), message_id.as_str().as_bytes())?;
                }
                Ok(())
            })
            .map_err(|e| transaction_error("create session", e))?;

        tracing::info!(
            session_id = %id,
            messages = initial_messages.len(),
            "Created session"
        );
        self.commit(trees).await;
        Ok(id)
    }

    /// Append a message to a session and refresh the session's metadata
    ///
    /// The message is stamped with the current time. If the session row is
    /// missing the message is still stored and the miss is logged.
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::Conflict` if the message id already exists and
    /// `AskmeError::Store` if the transaction fails.
    pub async fn save_message(&self, session_id: &SessionId, message: &Message) -> Result<()> {
        let trees = self.ensure_db().await?;

        let now = self.now();
        let record = MessageRecord {
            session_id: session_id.clone(),
            message: Message {
                timestamp: now,
                is_streaming: false,
                ..message.clone()
            },
        };
        let record_bytes = serde_json::to_vec(&record).map_err(AskmeError::Serialization)?;
        let key = index_key(session_id, now, next_seq(&trees.db)?);
        let preview = self.preview(&message.content);
        let message_id = message.id.as_str().as_bytes();

        let session_found = (&trees.sessions, &trees.messages, &trees.message_index)
            .transaction(|(sessions, messages, index)| {
                if messages.get(message_id)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(TxAbort::Conflict(
                        format!("message {}", message.id),
                    )));
                }
                messages.insert(message_id, record_bytes.as_slice())?;
                index.insert(key.as_slice(), message_id)?;

                let Some(raw) = sessions.get(session_id.as_str().as_bytes())? else {
                    return Ok(false);
                };
                let mut session: Session = serde_json::from_slice(&raw).map_err(|e| {
                    ConflictableTransactionError::Abort(TxAbort::Corrupt(format!(
                        "session {}: {}",
                        session_id, e
                    )))
                })?;
                session.updated_at = now;
                session.message_count += 1;
                session.last_message = Some(preview.clone());
                let bytes = serde_json::to_vec(&session).map_err(|e| {
                    ConflictableTransactionError::Abort(TxAbort::Corrupt(e.to_string()))
                })?;
                sessions.insert(session_id.as_str().as_bytes(), bytes)?;
                Ok(true)
            })
            .map_err(|e| transaction_error("save message", e))?;

        if session_found {
            tracing::debug!(session_id = %session_id, message_id = %message.id, "Saved message");
        } else {
            tracing::warn!(
                session_id = %session_id,
                message_id = %message.id,
                "Session not found while saving message; stored message without session update"
            );
        }

        self.commit(trees).await;
        Ok(())
    }

    /// Load a session and all of its messages, oldest first
    ///
    /// Returns `Ok(None)` if the session does not exist.
    pub async fn get_session(&self, session_id: &SessionId) -> Result<Option<StoredSession>> {
        let trees = self.ensure_db().await?;

        let raw = trees
            .sessions
            .get(session_id.as_str().as_bytes())
            .map_err(|e| AskmeError::Store(format!("Get failed: {}", e)))?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let session: Session = serde_json::from_slice(&raw)
            .map_err(|e| AskmeError::Store(format!("Deserialization failed: {}", e)))?;
        let messages = read_messages(trees, session_id)?;

        Ok(Some(StoredSession { session, messages }))
    }

    /// All messages stored under `session_id`, oldest first
    pub async fn messages_for_session(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        let trees = self.ensure_db().await?;
        read_messages(trees, session_id)
    }

    /// Rename a session; a no-op if it does not exist
    ///
    /// A blank `name` becomes `Chat <date>`, as in [`ChatStore::create_session`].
    pub async fn update_session_name(&self, session_id: &SessionId, name: &str) -> Result<()> {
        let name = session_name_or_default(name, Utc::now());
        self.update_session(session_id, "rename session", move |session| {
            session.name = name.clone();
        })
        .await
    }

    /// Replace the remote conversation id cached on a session; a no-op if
    /// the session does not exist
    pub async fn update_remote_conversation_id(
        &self,
        session_id: &SessionId,
        remote_id: &RemoteConversationId,
    ) -> Result<()> {
        self.update_session(session_id, "update remote conversation id", |session| {
            session.remote_conversation_id = Some(remote_id.clone());
        })
        .await?;
        tracing::info!(
            session_id = %session_id,
            remote_id = %remote_id,
            "Updated remote conversation id"
        );
        Ok(())
    }

    async fn update_session<F>(&self, session_id: &SessionId, context: &str, apply: F) -> Result<()>
    where
        F: Fn(&mut Session),
    {
        let trees = self.ensure_db().await?;
        let now = self.now();

        let found = trees
            .sessions
            .transaction(|sessions| {
                let Some(raw) = sessions.get(session_id.as_str().as_bytes())? else {
                    return Ok(false);
                };
                let mut session: Session = serde_json::from_slice(&raw).map_err(|e| {
                    ConflictableTransactionError::Abort(TxAbort::Corrupt(e.to_string()))
                })?;
                apply(&mut session);
                session.updated_at = now;
                let bytes = serde_json::to_vec(&session).map_err(|e| {
                    ConflictableTransactionError::Abort(TxAbort::Corrupt(e.to_string()))
                })?;
                sessions.insert(session_id.as_str().as_bytes(), bytes)?;
                Ok(true)
            })
            .map_err(|e| transaction_error(context, e))?;

        if !found {
            tracing::debug!(session_id = %session_id, "{}: session not found, nothing to do", context);
            return Ok(());
        }

        self.commit(trees).await;
        Ok(())
    }

    /// Delete a session and every message stored under it
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let trees = self.ensure_db().await?;

        let mut entries = Vec::new();
        for entry in trees.message_index.scan_prefix(index_prefix(session_id)) {
            let (key, message_id) =
                entry.map_err(|e| AskmeError::Store(format!("Iteration failed: {}", e)))?;
            entries.push((key.to_vec(), message_id.to_vec()));
        }

        let existed = (&trees.sessions, &trees.messages, &trees.message_index)
            .transaction(|(sessions, messages, index)| {
                let existed = sessions.remove(session_id.as_str().as_bytes())?.is_some();
                for (key, message_id) in &entries {
                    messages.remove(message_id.as_slice())?;
                    index.remove(key.as_slice())?;
                }
                Ok(existed)
            })
            .map_err(|e| transaction_error("delete session", e))?;

        tracing::info!(
            session_id = %session_id,
            existed,
            messages = entries.len(),
            "Deleted session"
        );
        self.commit(trees).await;
        Ok(())
    }

    /// Remove every session and message
    pub async fn clear_all_sessions(&self) -> Result<()> {
        let trees = self.ensure_db().await?;

        let collect = |tree: &Tree| -> Result<Vec<Vec<u8>>> {
            tree.iter()
                .keys()
                .map(|k| {
                    k.map(|k| k.to_vec())
                        .map_err(|e| AskmeError::Store(format!("Iteration failed: {}", e)).into())
                })
                .collect()
        };
        let session_keys = collect(&trees.sessions)?;
        let message_keys = collect(&trees.messages)?;
        let index_keys = collect(&trees.message_index)?;

        (&trees.sessions, &trees.messages, &trees.message_index)
            .transaction(|(sessions, messages, index)| {
                for key in &session_keys {
                    sessions.remove(key.as_slice())?;
                }
                for key in &message_keys {
                    messages.remove(key.as_slice())?;
                }
                for key in &index_keys {
                    index.remove(key.as_slice())?;
                }
                Ok(())
            })
            .map_err(|e| transaction_error("clear sessions", e))?;

        tracing::info!(sessions = session_keys.len(), "Cleared all sessions");
        self.commit(trees).await;
        Ok(())
    }

    /// Live, recency-ordered view of all sessions
    ///
    /// Yields the current snapshot first, then a new snapshot after every
    /// committed mutation. Intermediate snapshots may be skipped by slow
    /// consumers, but every yielded list is complete.
    pub fn observe_sessions(&self) -> WatchStream<Vec<Session>> {
        WatchStream::new(self.sessions_tx.subscribe())
    }

    /// Receiver side of the session list channel
    pub fn subscribe_sessions(&self) -> watch::Receiver<Vec<Session>> {
        self.sessions_tx.subscribe()
    }

    /// The most recently published session list
    pub fn current_sessions(&self) -> Vec<Session> {
        self.sessions_tx.borrow().clone()
    }

    /// Publish and flush after a committed transaction
    ///
    /// The write already happened, so failures here are logged rather than
    /// returned: the caller must not mistake a stored record for a lost one.
    async fn commit(&self, trees: &Trees) {
        match read_sessions(&trees.sessions) {
            Ok(sessions) => {
                self.sessions_tx.send_replace(sessions);
            }
            Err(e) => tracing::error!("Failed to refresh session list after commit: {:#}", e),
        }

        if let Err(e) = trees.db.flush_async().await {
            tracing::error!("Failed to flush session store: {}", e);
        }
    }
}

fn session_name_or_default(name: &str, now: DateTime<Utc>) -> String {
    match name.trim() {
        "" => format!("Chat {}", now.format("%Y-%m-%d")),
        trimmed => trimmed.to_string(),
    }
}

fn read_sessions(tree: &Tree) -> Result<Vec<Session>> {
    let mut sessions = Vec::new();
    for entry in tree.iter() {
        let (_, value) = entry.map_err(|e| AskmeError::Store(format!("Iteration failed: {}", e)))?;
        let session: Session = serde_json::from_slice(&value)
            .map_err(|e| AskmeError::Store(format!("Deserialization failed: {}", e)))?;
        sessions.push(session);
    }

    sessions.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    Ok(sessions)
}

fn read_messages(trees: &Trees, session_id: &SessionId) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    for entry in trees.message_index.scan_prefix(index_prefix(session_id)) {
        let (_, message_id) =
            entry.map_err(|e| AskmeError::Store(format!("Iteration failed: {}", e)))?;
        let raw = trees
            .messages
            .get(&message_id)
            .map_err(|e| AskmeError::Store(format!("Get failed: {}", e)))?;

        match raw {
            Some(raw) => {
                let record: MessageRecord = serde_json::from_slice(&raw)
                    .map_err(|e| AskmeError::Store(format!("Deserialization failed: {}", e)))?;
                messages.push(record.message);
            }
            None => tracing::warn!(
                session_id = %session_id,
                message_id = %String::from_utf8_lossy(&message_id),
                "Index entry points at a missing message"
            ),
        }
    }
    Ok(messages)
}

fn index_prefix(session_id: &SessionId) -> Vec<u8> {
    let mut key = session_id.as_str().as_bytes().to_vec();
    key.push(0);
    key
}

fn index_key(session_id: &SessionId, timestamp: DateTime<Utc>, seq: u64) -> Vec<u8> {
    let mut key = index_prefix(session_id);
    let millis = timestamp.timestamp_millis().max(0) as u64;
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn next_seq(db: &sled::Db) -> Result<u64> {
    db.generate_id()
        .map_err(|e| AskmeError::Store(format!("Failed to allocate sequence: {}", e)).into())
}

fn transaction_error(context: &str, error: TransactionError<TxAbort>) -> anyhow::Error {
    match error {
        TransactionError::Abort(TxAbort::Conflict(what)) => {
            tracing::error!("Failed to {}: key collision on {}", context, what);
            AskmeError::Conflict(what).into()
        }
        TransactionError::Abort(TxAbort::Corrupt(details)) => {
            tracing::error!("Failed to {}: corrupt record: {}", context, details);
            AskmeError::Store(format!("Failed to {}: corrupt record: {}", context, details)).into()
        }
        TransactionError::Storage(e) => {
            tracing::error!("Failed to {}: {}", context, e);
            AskmeError::Store(format!("Failed to {}: {}", context, e)).into()
        }
    }
}
