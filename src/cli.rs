//! Command-line interface definition for AskMe
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, saved-session management,
//! and listing the databases the chat service can answer from.

use clap::{Parser, Subcommand};

/// AskMe - streaming chat client with resumable sessions
///
/// Talk to the Ask Me chat service from the terminal. Conversations are
/// saved locally and can be resumed later.
#[derive(Parser, Debug, Clone)]
#[command(name = "askme")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the session store location
    #[arg(long)]
    pub store_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for AskMe
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        /// Resume a saved session by id or unique id prefix
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Manage saved chat sessions
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// List the databases available on the chat service
    Databases,
}

/// Saved-session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List saved sessions, most recently updated first
    List,

    /// Print the transcript of a saved session
    Show {
        /// Session id or unique id prefix
        id: String,
    },

    /// Rename a saved session
    Rename {
        /// Session id or unique id prefix
        id: String,

        /// New display name
        name: String,
    },

    /// Delete a saved session and its messages
    Delete {
        /// Session id or unique id prefix
        id: String,
    },

    /// Delete every saved session
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            store_path: None,
            command: Commands::Chat { resume: None },
        }
    }
}
