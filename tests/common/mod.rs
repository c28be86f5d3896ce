use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use askme::client::{ResponseStreamer, TextStream};
use askme::config::ChatConfig;
use askme::error::AskmeError;
use askme::ids::RemoteConversationId;
use askme::session::{ChatOrchestrator, ChatView};
use askme::storage::ChatStore;
use futures::{stream, StreamExt};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[allow(dead_code)]
pub const GREETING: &str = "Hello! I'm Ask Me, your AI assistant. How can I help you today?";

#[allow(dead_code)]
pub async fn create_temp_store() -> (Arc<ChatStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = ChatStore::open(tmp.path().join("store"))
        .await
        .expect("failed to open store");
    (Arc::new(store), tmp)
}

/// A request the orchestrator made to the streamer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCall {
    pub prompt: String,
    pub conversation_id: RemoteConversationId,
}

enum Script {
    Items(Vec<askme::Result<String>>),
    Channel(mpsc::UnboundedReceiver<askme::Result<String>>),
}

/// Streamer test double that replays scripted responses in order
///
/// With no script queued, a call yields an empty stream.
#[derive(Default)]
pub struct ScriptedStreamer {
    calls: Mutex<Vec<StreamCall>>,
    scripts: Mutex<VecDeque<Script>>,
}

#[allow(dead_code)]
impl ScriptedStreamer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response made of the given snapshots
    pub fn push_snapshots(&self, snapshots: &[&str]) {
        let items = snapshots.iter().map(|s| Ok(s.to_string())).collect();
        self.scripts.lock().unwrap().push_back(Script::Items(items));
    }

    /// Queue a response that fails with a transport error after `snapshots`
    pub fn push_failure(&self, snapshots: &[&str], error: &str) {
        let mut items: Vec<askme::Result<String>> =
            snapshots.iter().map(|s| Ok(s.to_string())).collect();
        items.push(Err(AskmeError::Transport(error.to_string()).into()));
        self.scripts.lock().unwrap().push_back(Script::Items(items));
    }

    /// Queue a response driven by hand; the stream ends when the sender drops
    pub fn push_channel(&self) -> mpsc::UnboundedSender<askme::Result<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(Script::Channel(rx));
        tx
    }

    pub fn calls(&self) -> Vec<StreamCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ResponseStreamer for ScriptedStreamer {
    fn stream(&self, prompt: &str, conversation_id: &RemoteConversationId) -> TextStream {
        self.calls.lock().unwrap().push(StreamCall {
            prompt: prompt.to_string(),
            conversation_id: conversation_id.clone(),
        });

        match self.scripts.lock().unwrap().pop_front() {
            Some(Script::Items(items)) => stream::iter(items).boxed(),
            Some(Script::Channel(rx)) => UnboundedReceiverStream::new(rx).boxed(),
            None => stream::empty().boxed(),
        }
    }
}

#[allow(dead_code)]
pub fn chat_config(greeting: Option<&str>) -> ChatConfig {
    ChatConfig {
        greeting: greeting.map(str::to_string),
        ..ChatConfig::default()
    }
}

#[allow(dead_code)]
pub fn orchestrator(
    store: &Arc<ChatStore>,
    streamer: &Arc<ScriptedStreamer>,
    greeting: Option<&str>,
) -> ChatOrchestrator {
    ChatOrchestrator::new(store.clone(), streamer.clone(), &chat_config(greeting))
}

/// Wait until the published view satisfies `predicate`
#[allow(dead_code)]
pub async fn wait_for_view<F>(rx: &mut watch::Receiver<ChatView>, predicate: F) -> ChatView
where
    F: FnMut(&ChatView) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for view")
        .expect("view channel closed")
        .clone()
}
