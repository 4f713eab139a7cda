//! Interactive chat mode handler
//!
//! Runs a readline-based loop that submits user input to the relay and
//! prints streamed fragments as they arrive. A few in-session commands
//! (`history`, `context`, `new`, `exit`) mirror the web UI's conversation
//! controls.

use crate::commands::{build_app, AppContext};
use crate::config::Config;
use crate::error::Result;
use crate::relay::RelayEvent;
use crate::tokens::estimate;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use tokio::sync::mpsc;

/// Messages shown by the in-session `history` command
const HISTORY_PREVIEW_MESSAGES: usize = 15;

/// Characters of each message shown by the `history` command
const HISTORY_PREVIEW_CHARS: usize = 300;

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Loaded configuration (consumed)
/// * `conversation` - Optional conversation id to resume
/// * `model` - Optional model override for this session
pub async fn run_chat(
    config: Config,
    conversation: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let app = build_app(config)?;

    let (default_model, context_window) = {
        let config = app.config.read().await;
        (config.api.model.clone(), config.context.window)
    };
    let session_model = model.clone().unwrap_or(default_model);

    let mut conversation_id = match conversation {
        Some(id) => {
            if app.store.get_conversation(&id)?.is_none() {
                println!(
                    "{}",
                    format!("Conversation {} not found, starting fresh", id).yellow()
                );
                app.store.create(None, &session_model, context_window)?
            } else {
                id
            }
        }
        None => app.store.create(None, &session_model, context_window)?,
    };

    println!("{}", "Talaria chat session".bright_cyan());
    println!("Model: {}", session_model.green());
    println!("Conversation: {}", conversation_id.cyan());
    println!(
        "Commands: {}, {}, {}, {}",
        "history".green(),
        "context".green(),
        "new".green(),
        "exit".green()
    );
    println!();

    let mut editor = DefaultEditor::new()?;

    loop {
        let line = editor.readline("You> ");
        match line {
            Ok(input) => {
                let input = input.trim().to_string();
                if input.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&input);

                match input.as_str() {
                    "exit" | "quit" => break,
                    "new" => {
                        conversation_id = app.store.create(None, &session_model, context_window)?;
                        println!(
                            "{}",
                            format!("Started new conversation {}", conversation_id).green()
                        );
                        continue;
                    }
                    "history" => {
                        print_history(&app, &conversation_id)?;
                        continue;
                    }
                    "context" => {
                        print_context(&app, &conversation_id, context_window)?;
                        continue;
                    }
                    _ => {}
                }

                stream_turn(&app, &input, &conversation_id, model.as_deref()).await;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("{}", "Leaving chat session".yellow());
                break;
            }
            Err(e) => {
                eprintln!("{}", format!("Input error: {}", e).red());
                break;
            }
        }
    }

    Ok(())
}

/// Runs one relay cycle and prints the streamed response
async fn stream_turn(app: &AppContext, input: &str, conversation_id: &str, model: Option<&str>) {
    let (tx, mut rx) = mpsc::channel::<RelayEvent>(64);

    let relay = app.relay.clone();
    let input = input.to_string();
    let conversation_id = conversation_id.to_string();
    let model = model.map(|m| m.to_string());
    tokio::spawn(async move {
        relay
            .run(&input, &conversation_id, model.as_deref(), tx)
            .await;
    });

    println!("{}", "Assistant>".bright_cyan());
    while let Some(event) = rx.recv().await {
        match event {
            RelayEvent::Conversation { .. } => {}
            RelayEvent::Content { text } => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            RelayEvent::Error { message, .. } => {
                eprintln!("\n{}", format!("Error: {}", message).red());
                return;
            }
            RelayEvent::Done => break,
        }
    }
    println!();
}

/// Prints the tail of the conversation transcript
fn print_history(app: &AppContext, conversation_id: &str) -> Result<()> {
    let messages = app
        .store
        .get_messages(conversation_id, Some(HISTORY_PREVIEW_MESSAGES))?;

    if messages.is_empty() {
        println!("{}", "No messages yet.".yellow());
        return Ok(());
    }

    println!("{}", "Conversation history".bright_cyan());
    for msg in messages {
        let timestamp = msg.timestamp.format("%H:%M");
        println!(
            "{} {}:",
            format!("[{}]", timestamp).yellow(),
            msg.role.to_string().green()
        );
        let preview: String = msg.content.chars().take(HISTORY_PREVIEW_CHARS).collect();
        println!("{}", preview);
        if msg.content.chars().count() > HISTORY_PREVIEW_CHARS {
            println!("{}", "... (truncated)".bright_black());
        }
        println!();
    }

    Ok(())
}

/// Prints token usage against the configured context window
fn print_context(app: &AppContext, conversation_id: &str, context_window: usize) -> Result<()> {
    let messages = app.store.get_messages(conversation_id, None)?;
    let total_tokens: usize = messages.iter().map(|m| estimate(&m.content)).sum();

    println!("{}", "Context information".bright_cyan());
    println!("Messages: {}", messages.len());
    println!("Estimated tokens: {}", total_tokens);
    println!("Context window: {}", context_window);
    println!(
        "Remaining: {}",
        context_window.saturating_sub(total_tokens)
    );

    Ok(())
}
