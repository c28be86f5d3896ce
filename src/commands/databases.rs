use crate::client::HttpChatClient;
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;

/// Print the databases the chat service can answer from
pub async fn run_databases(config: &Config) -> Result<()> {
    let client = HttpChatClient::new(&config.api)?;
    let databases = client.list_databases().await?;
    tracing::debug!(count = databases.len(), "Fetched database list");

    if databases.is_empty() {
        println!("{}", "The chat service reported no databases.".yellow());
        return Ok(());
    }

    println!("\nAvailable Databases:");
    for name in &databases {
        println!("  {} {}", "•".cyan(), name);
    }
    println!();
    Ok(())
}
