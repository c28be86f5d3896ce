use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{AskmeError, Result};
use crate::ids::SessionId;
use crate::storage::{ChatStore, Message, Session};
use colored::Colorize;
use prettytable::{format, Table};

/// Handle history commands
pub async fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store = super::open_store(config).await?;

    match command {
        HistoryCommand::List => print_sessions(&store.current_sessions()),
        HistoryCommand::Show { id } => {
            let id = resolve_session_id(&store.current_sessions(), &id)?;
            let stored = store
                .get_session(&id)
                .await?
                .ok_or_else(|| AskmeError::Store(format!("Session {} disappeared", id)))?;

            println!(
                "\n{} {}",
                stored.session.name.bold(),
                format!("({})", stored.session.id).dimmed()
            );
            println!(
                "Created {}  Updated {}\n",
                stored.session.created_at.format("%Y-%m-%d %H:%M"),
                stored.session.updated_at.format("%Y-%m-%d %H:%M")
            );
            print_transcript(&stored.messages);
        }
        HistoryCommand::Rename { id, name } => {
            let id = resolve_session_id(&store.current_sessions(), &id)?;
            store.update_session_name(&id, &name).await?;
            println!("{}", format!("Renamed session {} to \"{}\"", short_id(&id), name.trim()).green());
        }
        HistoryCommand::Delete { id } => {
            let id = resolve_session_id(&store.current_sessions(), &id)?;
            store.delete_session(&id).await?;
            println!("{}", format!("Deleted session {}", id).green());
        }
        HistoryCommand::Clear { yes } => clear_sessions(&store, yes).await?,
    }

    Ok(())
}

async fn clear_sessions(store: &ChatStore, yes: bool) -> Result<()> {
    let count = store.current_sessions().len();
    if count == 0 {
        println!("{}", "No saved sessions to delete.".yellow());
        return Ok(());
    }

    if !yes {
        print!("Delete all {} saved sessions? [y/N] ", count);
        std::io::Write::flush(&mut std::io::stdout())?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.clear_all_sessions().await?;
    println!("{}", format!("Deleted {} sessions", count).green());
    Ok(())
}

/// Find the session an id or id prefix refers to
///
/// An exact id match wins; otherwise the prefix must match exactly one
/// session.
///
/// # Errors
///
/// Returns `AskmeError::Config` if nothing matches or the prefix is
/// ambiguous
pub fn resolve_session_id(sessions: &[Session], raw: &str) -> Result<SessionId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AskmeError::Config("Session id cannot be empty".to_string()).into());
    }

    if let Some(session) = sessions.iter().find(|s| s.id.as_str() == raw) {
        return Ok(session.id.clone());
    }

    let matches: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.id.as_str().starts_with(raw))
        .collect();
    match matches.as_slice() {
        [session] => Ok(session.id.clone()),
        [] => Err(AskmeError::Config(format!("No session matches '{}'", raw)).into()),
        _ => Err(AskmeError::Config(format!(
            "'{}' matches {} sessions; use a longer prefix",
            raw,
            matches.len()
        ))
        .into()),
    }
}

/// Print saved sessions as a table
pub fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("{}", "No saved sessions found.".yellow());
        return;
    }

    println!("\nSaved Sessions:");
    sessions_table(sessions).printstd();
    println!();
    println!("Use {} to resume a session.", "askme chat --resume <ID>".cyan());
    println!();
}

fn sessions_table(sessions: &[Session]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Name".bold(),
        "Messages".bold(),
        "Last Message".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();
        let preview = session
            .last_message
            .as_deref()
            .map(|m| ellipsize(&m.replace('\n', " "), 40))
            .unwrap_or_else(|| "-".to_string());

        table.add_row(prettytable::row![
            short_id(&session.id).cyan(),
            ellipsize(&session.name, 40),
            session.message_count,
            preview,
            updated
        ]);
    }

    table
}

/// Print a transcript with speaker labels
pub fn print_transcript(messages: &[Message]) {
    for message in messages {
        let label = if message.is_user {
            "You:".green().bold()
        } else {
            "Ask Me:".cyan().bold()
        };
        let content = if message.error {
            message.content.red().to_string()
        } else {
            message.content.clone()
        };
        println!("{} {}\n", label, content);
    }
}

/// First eight characters of an id, for display
pub fn short_id(id: &SessionId) -> &str {
    let raw = id.as_str();
    raw.char_indices().nth(8).map_or(raw, |(end, _)| &raw[..end])
}

fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(id: &str, name: &str) -> Session {
        Session {
            id: SessionId::from(id),
            name: name.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            message_count: 0,
            last_message: None,
            remote_conversation_id: None,
        }
    }

    #[test]
    fn test_resolve_exact_id() {
        let sessions = vec![session("abc", "one"), session("abcdef", "two")];
        assert_eq!(
            resolve_session_id(&sessions, "abc").unwrap(),
            SessionId::from("abc")
        );
    }

    #[test]
    fn test_resolve_unique_prefix() {
        let sessions = vec![session("abc123", "one"), session("def456", "two")];
        assert_eq!(
            resolve_session_id(&sessions, "de").unwrap(),
            SessionId::from("def456")
        );
    }

    #[test]
    fn test_resolve_ambiguous_prefix() {
        let sessions = vec![session("abc123", "one"), session("abd456", "two")];
        let err = resolve_session_id(&sessions, "ab").unwrap_err();
        assert!(err.to_string().contains("matches 2 sessions"));
    }

    #[test]
    fn test_resolve_no_match() {
        let sessions = vec![session("abc123", "one")];
        let err = resolve_session_id(&sessions, "zzz").unwrap_err();
        assert!(err.to_string().contains("No session matches"));
        assert!(resolve_session_id(&sessions, "  ").is_err());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id(&SessionId::from("0123456789ab")), "01234567");
        assert_eq!(short_id(&SessionId::from("abc")), "abc");
    }

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("a longer session name", 10), "a longe...");
    }

    #[test]
    fn test_sessions_table_has_header_and_rows() {
        let mut with_preview = session("abc123", "Trip");
        with_preview.last_message = Some("see you\nsoon".to_string());
        let table = sessions_table(&[with_preview, session("def456", "Work")]);
        assert_eq!(table.len(), 3);
    }
}
