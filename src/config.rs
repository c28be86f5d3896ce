//! Configuration management for AskMe
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{AskmeError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for AskMe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote chat service settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Session store settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Conversation behavior
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Remote chat service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint receiving `POST { SessionID, UserPrompt }`
    #[serde(default = "default_chat_url")]
    pub chat_url: String,

    /// Endpoint returning `{ database_list: [...] }`
    #[serde(default = "default_database_list_url")]
    pub database_list_url: String,

    /// Render the response while it streams; when false the whole body is
    /// read before it is shown
    #[serde(default = "default_incremental")]
    pub incremental: bool,

    /// Timeout for establishing the connection (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_chat_url() -> String {
    "http://localhost:8000/api/suggest_catalog_stream/".to_string()
}

fn default_database_list_url() -> String {
    "http://localhost:8000/api/list_database".to_string()
}

fn default_incremental() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            chat_url: default_chat_url(),
            database_list_url: default_database_list_url(),
            incremental: default_incremental(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Characters of the latest message kept as a session preview
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

fn default_preview_length() -> usize {
    crate::storage::DEFAULT_PREVIEW_LENGTH
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            preview_length: default_preview_length(),
        }
    }
}

impl StorageConfig {
    /// Resolve where the session database lives
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::Config` if no path is configured and the
    /// platform data directory cannot be determined
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }

        let proj_dirs = ProjectDirs::from("com", "askme", "askme").ok_or_else(|| {
            AskmeError::Config("Could not determine data directory".to_string())
        })?;
        Ok(proj_dirs.data_dir().join("sessions"))
    }
}

/// Conversation behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Assistant message that opens every fresh conversation
    #[serde(default = "default_greeting")]
    pub greeting: Option<String>,

    /// Maximum characters of the first prompt used as a session name
    #[serde(default = "default_session_name_length")]
    pub session_name_length: usize,
}

fn default_greeting() -> Option<String> {
    Some("Hello! I'm Ask Me, your AI assistant. How can I help you today?".to_string())
}

fn default_session_name_length() -> usize {
    50
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            session_name_length: default_session_name_length(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged. Environment variables override the file, and CLI flags
    /// override both.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::Io` if the file exists but cannot be read and
    /// `AskmeError::Yaml` if it does not parse
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(AskmeError::Io)?;
        serde_yaml::from_str(&contents).map_err(|e| AskmeError::Yaml(e).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("ASKME_CHAT_URL") {
            self.api.chat_url = url;
        }

        if let Ok(url) = std::env::var("ASKME_DATABASE_LIST_URL") {
            self.api.database_list_url = url;
        }

        if let Ok(incremental) = std::env::var("ASKME_INCREMENTAL") {
            match incremental.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.api.incremental = true,
                "0" | "false" | "no" | "off" => self.api.incremental = false,
                _ => tracing::warn!("Invalid ASKME_INCREMENTAL: {}", incremental),
            }
        }

        if let Ok(timeout) = std::env::var("ASKME_CONNECT_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.api.connect_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid ASKME_CONNECT_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(path) = std::env::var("ASKME_STORE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }

        // An empty greeting disables the seed message.
        if let Ok(greeting) = std::env::var("ASKME_GREETING") {
            self.chat.greeting = if greeting.trim().is_empty() {
                None
            } else {
                Some(greeting)
            };
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.store_path {
            tracing::info!("Using store path override from CLI: {}", path);
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `AskmeError::Config` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("api.chat_url", &self.api.chat_url),
            ("api.database_list_url", &self.api.database_list_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| AskmeError::Config(format!("{} is not a valid URL: {}", field, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AskmeError::Config(format!(
                    "{} must use http or https, got {}",
                    field,
                    parsed.scheme()
                ))
                .into());
            }
        }

        if self.api.connect_timeout_seconds == 0 {
            return Err(AskmeError::Config(
                "api.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.preview_length == 0 {
            return Err(AskmeError::Config(
                "storage.preview_length must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.session_name_length == 0 {
            return Err(AskmeError::Config(
                "chat.session_name_length must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
