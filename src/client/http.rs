//! HTTP implementation of the chat client
//!
//! The chat endpoint takes a JSON `POST` of `{ "SessionID", "UserPrompt" }`
//! and answers with plain text, either streamed in chunks or as one body.

use super::decoder::aggregate_text;
use super::{ResponseStreamer, TextStream};
use crate::config::ApiConfig;
use crate::error::{AskmeError, Result};
use crate::ids::RemoteConversationId;
use futures::{stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(rename = "SessionID")]
    session_id: &'a str,
    #[serde(rename = "UserPrompt")]
    user_prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct DatabaseListResponse {
    database_list: Vec<String>,
}

/// Chat client backed by `reqwest`
///
/// Only a connect timeout is configured: a response may keep streaming for
/// as long as the service keeps sending.
///
/// # Examples
///
/// ```no_run
/// use askme::client::{HttpChatClient, ResponseStreamer};
/// use askme::config::ApiConfig;
/// use askme::ids::RemoteConversationId;
/// use futures::StreamExt;
///
/// # async fn example() -> askme::error::Result<()> {
/// let client = HttpChatClient::new(&ApiConfig::default())?;
/// let mut snapshots = client.stream("hello", &RemoteConversationId::generate());
/// while let Some(text) = snapshots.next().await {
///     println!("{}", text?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    http: reqwest::Client,
    chat_url: Url,
    database_list_url: Url,
    incremental: bool,
}

impl HttpChatClient {
    /// Build a client from the API configuration
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::Config` if an endpoint URL does not parse and
    /// `AskmeError::Http` if the underlying client cannot be built
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let chat_url = Url::parse(&config.chat_url)
            .map_err(|e| AskmeError::Config(format!("Invalid chat_url: {}", e)))?;
        let database_list_url = Url::parse(&config.database_list_url)
            .map_err(|e| AskmeError::Config(format!("Invalid database_list_url: {}", e)))?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(AskmeError::Http)?;

        Ok(Self {
            http,
            chat_url,
            database_list_url,
            incremental: config.incremental,
        })
    }

    /// Fetch the names of the databases the service can answer from
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::HttpStatus` for a non-success status and
    /// `AskmeError::Transport` if the request fails or the body is not the
    /// expected JSON
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        tracing::debug!(url = %self.database_list_url, "Fetching database list");

        let response = self
            .http
            .get(self.database_list_url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AskmeError::Transport(format!("Request failed: {}", e)))?;
        let response = check_status(response).await?;

        let body: DatabaseListResponse = response
            .json()
            .await
            .map_err(|e| AskmeError::Transport(format!("Invalid database list: {}", e)))?;
        Ok(body.database_list)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(status = status.as_u16(), "Failed to read error body: {}", e);
            String::new()
        }
    };
    tracing::warn!(status = status.as_u16(), "Chat service returned an error status");
    Err(AskmeError::HttpStatus {
        status: status.as_u16(),
        body,
    }
    .into())
}

impl ResponseStreamer for HttpChatClient {
    fn stream(&self, prompt: &str, conversation_id: &RemoteConversationId) -> TextStream {
        let request = self
            .http
            .post(self.chat_url.clone())
            .header(ACCEPT, "application/json")
            .json(&ChatRequest {
                session_id: conversation_id.as_str(),
                user_prompt: prompt,
            });
        let incremental = self.incremental;
        let conversation_id = conversation_id.clone();

        let open = async move {
            tracing::debug!(conversation_id = %conversation_id, incremental, "Opening response stream");
            let response = request
                .send()
                .await
                .map_err(|e| AskmeError::Transport(format!("Request failed: {}", e)))?;
            check_status(response).await
        };

        stream::once(open)
            .flat_map(move |opened| -> TextStream {
                match opened {
                    Ok(response) if incremental => aggregate_text(response.bytes_stream()),
                    Ok(response) => aggregate_text(stream::once(response.bytes())),
                    Err(e) => stream::once(async move { Err(e) }).boxed(),
                }
            })
            .boxed()
    }
}
