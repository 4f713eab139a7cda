//! History command handlers
//!
//! Lists, shows, searches, deletes, and exports stored conversations.

use crate::cli::HistoryCommand;
use crate::error::{Result, TalariaError};
use crate::export::{self, ExportFormat};
use crate::storage::{ConversationStore, SqliteStore};
use colored::Colorize;
use prettytable::{format, Table};

/// Handle history commands
pub fn handle_history(command: HistoryCommand) -> Result<()> {
    let store = SqliteStore::new()?;

    match command {
        HistoryCommand::List {
            limit,
            offset,
            search,
        } => {
            let summaries = store.list(limit, offset, search.as_deref())?;

            if summaries.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Model".bold(),
                "Messages".bold(),
                "Tokens".bold(),
                "Last Updated".bold()
            ]);

            for summary in summaries {
                let title = if summary.title.chars().count() > 40 {
                    let prefix: String = summary.title.chars().take(37).collect();
                    format!("{}...", prefix)
                } else {
                    summary.title
                };
                let updated = summary.updated_at.format("%Y-%m-%d %H:%M").to_string();

                table.add_row(prettytable::row![
                    summary.id.cyan(),
                    title,
                    summary.model,
                    summary.message_count,
                    summary.token_count,
                    updated
                ]);
            }

            println!("\nConversation History:");
            table.printstd();
            println!();
            println!(
                "Use {} to resume a session.",
                "talaria chat --conversation <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id, limit } => {
            let record = store
                .get_conversation(&id)?
                .ok_or_else(|| TalariaError::Storage(format!("Conversation {} not found", id)))?;

            println!("\n{}", record.summary.title.bright_cyan());
            println!(
                "Model: {} | Messages: {} | Tokens: {}",
                record.summary.model.green(),
                record.summary.message_count,
                record.summary.token_count
            );
            println!();

            let messages = match limit {
                Some(n) => store.get_messages(&id, Some(n))?,
                None => record.messages,
            };
            for msg in messages {
                let timestamp = msg.timestamp.format("%Y-%m-%d %H:%M");
                println!(
                    "{} {}:",
                    format!("[{}]", timestamp).yellow(),
                    msg.role.to_string().green()
                );
                println!("{}\n", msg.content);
            }
        }
        HistoryCommand::Search { query, limit } => {
            let matches = store.search(&query, limit)?;

            if matches.is_empty() {
                println!("{}", "No matches found.".yellow());
                return Ok(());
            }

            println!("\nMatches for {}:", query.green());
            for m in matches {
                println!(
                    "{} {} ({})",
                    m.conversation_id.cyan(),
                    m.title,
                    m.updated_at.format("%Y-%m-%d %H:%M")
                );
                println!("  {}\n", m.snippet.bright_black());
            }
        }
        HistoryCommand::Delete { id } => {
            store.delete(&id)?;
            println!("{}", format!("Deleted conversation {}", id).green());
        }
        HistoryCommand::Export { id, format, output } => {
            let format = ExportFormat::parse(&format)?;
            let record = store
                .get_conversation(&id)?
                .ok_or_else(|| TalariaError::Storage(format!("Conversation {} not found", id)))?;

            let rendered = export::render(&record, format)?;
            let path = output.unwrap_or_else(|| {
                std::path::PathBuf::from(format!("conversation_{}.{}", id, format.extension()))
            });
            std::fs::write(&path, rendered).map_err(TalariaError::Io)?;
            println!("{}", format!("Exported to {}", path.display()).green());
        }
    }

    Ok(())
}
