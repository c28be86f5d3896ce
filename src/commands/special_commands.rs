//! Special commands parser for interactive chat
//!
//! Special commands manage sessions from inside a chat instead of being
//! sent to the assistant. They are prefixed with `/`; the command word is
//! case-insensitive while arguments keep their case.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an argument it does not take
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a fresh, unsaved conversation
    NewChat,

    /// List saved sessions
    ListSessions,

    /// Resume a saved session by id or unique id prefix
    LoadSession(String),

    /// Rename the active session
    RenameSession(String),

    /// Delete a saved session by id or unique id prefix
    DeleteSession(String),

    /// Delete every saved session
    ClearSessions,

    /// Show the active session and conversation identity
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input as a prompt
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognized `/` command,
/// `CommandError::MissingArgument` when a required argument is absent, and
/// `CommandError::UnsupportedArgument` when a command that takes no
/// argument receives one.
///
/// # Examples
///
/// ```
/// use askme::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// let cmd = parse_special_command("/load 3f2a").unwrap();
/// assert_eq!(cmd, SpecialCommand::LoadSession("3f2a".to_string()));
///
/// let cmd = parse_special_command("what is in the catalog?").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (word, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    let no_arg = |command: SpecialCommand| {
        if arg.is_empty() {
            Ok(command)
        } else {
            Err(CommandError::UnsupportedArgument {
                command: word.clone(),
                arg: arg.to_string(),
            })
        }
    };
    let with_arg = |build: fn(String) -> SpecialCommand, usage: &str| {
        if arg.is_empty() {
            Err(CommandError::MissingArgument {
                command: word.clone(),
                usage: usage.to_string(),
            })
        } else {
            Ok(build(arg.to_string()))
        }
    };

    match word.as_str() {
        "/new" => no_arg(SpecialCommand::NewChat),
        "/sessions" | "/history" => no_arg(SpecialCommand::ListSessions),
        "/load" | "/resume" => with_arg(SpecialCommand::LoadSession, "/load <session-id>"),
        "/rename" => with_arg(SpecialCommand::RenameSession, "/rename <name>"),
        "/delete" => with_arg(SpecialCommand::DeleteSession, "/delete <session-id>"),
        "/clear" => no_arg(SpecialCommand::ClearSessions),
        "/status" => no_arg(SpecialCommand::ShowStatus),
        "/help" | "/?" => no_arg(SpecialCommand::Help),
        "/exit" | "/quit" => no_arg(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(word.clone())),
    }
}

/// Print the list of special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

SESSIONS:
  /new              - Start a new conversation
  /sessions         - List saved sessions
  /load <id>        - Resume a saved session (a unique id prefix is enough)
  /rename <name>    - Rename the current session
  /delete <id>      - Delete a saved session
  /clear            - Delete every saved session

SESSION INFORMATION:
  /status           - Show the current session and conversation id
  /help             - Show this help message

Press Ctrl-C while a response is streaming to stop it.
Type 'exit' or 'quit' to leave.
"#
    );
}
