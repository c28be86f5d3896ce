/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `chat`: Interactive chat with streamed responses
- `history`: Saved-session management
- `databases`: Database list from the chat service
*/

use crate::config::Config;
use crate::error::Result;
use crate::storage::ChatStore;
use std::sync::Arc;

// Special commands parser for in-chat session management
pub mod special_commands;

// Saved-session management commands
pub mod history;

// Remote database listing
pub mod databases;

/// Open the session store described by the configuration
pub async fn open_store(config: &Config) -> Result<Arc<ChatStore>> {
    let path = config.storage.resolve_path()?;
    tracing::debug!("Opening session store at {}", path.display());
    let store = ChatStore::new(path).with_preview_length(config.storage.preview_length);
    store.init().await?;
    Ok(Arc::new(store))
}

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Wires the session store and the HTTP client into a
    //! `ChatOrchestrator` and runs a readline loop. Responses are printed
    //! as they stream in; Ctrl-C while streaming stops the response.

    use super::history::{print_sessions, print_transcript, resolve_session_id, short_id};
    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::client::HttpChatClient;
    use crate::session::{ChatOrchestrator, TurnOutcome};
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;

    /// Start interactive chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `resume` - Optional session id or unique id prefix to resume
    pub async fn run_chat(config: Config, resume: Option<String>) -> Result<()> {
        let store = open_store(&config).await?;
        let client = Arc::new(HttpChatClient::new(&config.api)?);
        let chat = ChatOrchestrator::new(store.clone(), client, &config.chat);

        print_welcome_banner();

        if let Some(raw) = resume {
            let id = resolve_session_id(&store.current_sessions(), &raw)?;
            if chat.load_session(&id).await {
                println!("{}", format!("Resumed session {}\n", short_id(&id)).green());
            }
        }
        print_transcript(&chat.snapshot().messages);
        print_notice(&chat);

        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline(&format!("{} ", "You>".green().bold())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            println!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    rl.add_history_entry(trimmed)?;

                    match command {
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {
                            if let Err(e) = run_turn(&chat, trimmed).await {
                                tracing::error!("Turn failed: {:#}", e);
                                println!("{}", format!("Error: {}", e).red());
                            }
                        }
                        command => {
                            if let Err(e) = handle_special_command(&chat, command).await {
                                println!("{}", format!("Error: {}", e).red());
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Send one prompt and print the response as it grows
    async fn run_turn(chat: &ChatOrchestrator, prompt: &str) -> Result<()> {
        let mut view_rx = chat.subscribe();
        let Some(turn) = chat.send(prompt).await.into_turn() else {
            return Ok(());
        };
        let placeholder_id = turn.placeholder_id().clone();

        print!("{} ", "Ask Me:".cyan().bold());
        std::io::stdout().flush()?;

        let mut printed = 0;
        loop {
            tokio::select! {
                changed = view_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = view_rx.borrow_and_update().clone();
                    let Some(message) = view.message(&placeholder_id) else {
                        break;
                    };

                    if message.error {
                        println!("\n{}", message.content.red());
                        break;
                    }
                    if message.content.len() > printed && message.content.is_char_boundary(printed) {
                        print!("{}", &message.content[printed..]);
                        std::io::stdout().flush()?;
                        printed = message.content.len();
                    }
                    if !message.is_streaming {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    turn.cancel();
                }
            }
        }

        let outcome = turn.wait().await?;
        if outcome == TurnOutcome::Cancelled {
            print!(" {}", "[stopped]".yellow());
        }
        println!("\n");
        print_notice(chat);
        Ok(())
    }

    async fn handle_special_command(chat: &ChatOrchestrator, command: SpecialCommand) -> Result<()> {
        match command {
            SpecialCommand::NewChat => {
                chat.start_new_chat().await;
                println!("{}", "Started a new conversation.\n".green());
                print_transcript(&chat.snapshot().messages);
            }
            SpecialCommand::ListSessions => print_sessions(&chat.store().current_sessions()),
            SpecialCommand::LoadSession(raw) => {
                let id = resolve_session_id(&chat.store().current_sessions(), &raw)?;
                if chat.load_session(&id).await {
                    println!("{}", format!("Loaded session {}\n", short_id(&id)).green());
                    print_transcript(&chat.snapshot().messages);
                }
                print_notice(chat);
            }
            SpecialCommand::RenameSession(name) => {
                if chat.rename_active_session(&name).await? {
                    println!("{}", format!("Renamed session to \"{}\"", name).green());
                } else {
                    println!(
                        "{}",
                        "Nothing to rename yet: this conversation has not been saved.".yellow()
                    );
                }
            }
            SpecialCommand::DeleteSession(raw) => {
                let id = resolve_session_id(&chat.store().current_sessions(), &raw)?;
                let was_active = chat.snapshot().session_id.as_ref() == Some(&id);
                chat.delete_session(&id).await?;
                println!("{}", format!("Deleted session {}", short_id(&id)).green());
                if was_active {
                    println!("{}", "Started a new conversation.\n".green());
                }
            }
            SpecialCommand::ClearSessions => {
                chat.clear_all_sessions().await?;
                println!("{}", "Deleted all saved sessions.\n".green());
            }
            SpecialCommand::ShowStatus => print_status_display(chat),
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
        Ok(())
    }

    fn print_notice(chat: &ChatOrchestrator) {
        if let Some(notice) = chat.snapshot().notice {
            println!("{}\n", notice.yellow());
        }
    }

    fn print_welcome_banner() {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                  Ask Me Chat - Welcome!                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    /// Display the active session and conversation identity
    fn print_status_display(chat: &ChatOrchestrator) {
        let view = chat.snapshot();
        let session = view.session_id.as_ref().and_then(|id| {
            chat.store()
                .current_sessions()
                .into_iter()
                .find(|s| &s.id == id)
        });

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Ask Me Session Status                    ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        match &session {
            Some(session) => {
                println!("Session:           {}", session.name.bold());
                println!("Session ID:        {}", session.id.as_str().cyan());
                println!("Stored Messages:   {}", session.message_count);
            }
            None => println!("Session:           {}", "(not saved yet)".dimmed()),
        }
        println!("Conversation ID:   {}", view.remote_conversation_id);
        println!("Transcript Size:   {} messages", view.messages.len());
        println!();
    }
}
