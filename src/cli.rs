//! Command-line interface definition for Talaria
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, the local web server, history
//! management, and configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Talaria - terminal and local-web chat client
///
/// Streams chat-completion responses to the terminal or a browser while
/// persisting conversations locally.
#[derive(Parser, Debug, Clone)]
#[command(name = "talaria")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the history database path
    #[arg(long, env = "TALARIA_HISTORY_DB")]
    pub storage_path: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Talaria
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session in the terminal
    Chat {
        /// Resume an existing conversation by id
        #[arg(short = 'r', long)]
        conversation: Option<String>,

        /// Override the configured model for this session
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Run the local web server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage conversation history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Inspect or update configuration
    Config {
        /// Config subcommand
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored conversations, most recently updated first
    List {
        /// Maximum number of conversations to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Number of conversations to skip
        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        /// Filter by title
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show a conversation transcript
    Show {
        /// Conversation id
        id: String,

        /// Show only the most recent N messages
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search message content across conversations
    Search {
        /// Text to search for
        query: String,

        /// Maximum number of matches to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },

    /// Export a conversation to a file
    Export {
        /// Conversation id
        id: String,

        /// Export format: json, txt, or md
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (defaults to conversation_<id>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Print the active configuration (API key redacted)
    Show,

    /// Set a configuration value and persist it
    Set {
        /// Dotted key, e.g. api.model or cache.ttl_days
        key: String,

        /// New value
        value: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_chat_command() {
        let cli = Cli::try_parse_from(["talaria", "chat"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Chat {
                conversation: None,
                model: None
            }
        ));
    }

    #[test]
    fn test_cli_parse_chat_with_resume_and_model() {
        let cli = Cli::try_parse_from([
            "talaria",
            "chat",
            "--conversation",
            "20240101_120000_000",
            "--model",
            "deepseek-coder",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat {
                conversation,
                model,
            } => {
                assert_eq!(conversation.as_deref(), Some("20240101_120000_000"));
                assert_eq!(model.as_deref(), Some("deepseek-coder"));
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_with_port() {
        let cli = Cli::try_parse_from(["talaria", "serve", "--port", "8080"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: Some(8080) }));
    }

    #[test]
    fn test_cli_parse_history_list_defaults() {
        let cli = Cli::try_parse_from(["talaria", "history", "list"]).unwrap();
        match cli.command {
            Commands::History {
                command:
                    HistoryCommand::List {
                        limit,
                        offset,
                        search,
                    },
            } => {
                assert_eq!(limit, 20);
                assert_eq!(offset, 0);
                assert!(search.is_none());
            }
            _ => panic!("expected history list"),
        }
    }

    #[test]
    fn test_cli_parse_history_search() {
        let cli =
            Cli::try_parse_from(["talaria", "history", "search", "lifetimes", "--limit", "5"])
                .unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::Search { query, limit },
            } => {
                assert_eq!(query, "lifetimes");
                assert_eq!(limit, 5);
            }
            _ => panic!("expected history search"),
        }
    }

    #[test]
    fn test_cli_parse_history_export_format() {
        let cli = Cli::try_parse_from([
            "talaria", "history", "export", "some-id", "--format", "md",
        ])
        .unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::Export { id, format, output },
            } => {
                assert_eq!(id, "some-id");
                assert_eq!(format, "md");
                assert!(output.is_none());
            }
            _ => panic!("expected history export"),
        }
    }

    #[test]
    fn test_cli_parse_config_set() {
        let cli =
            Cli::try_parse_from(["talaria", "config", "set", "api.model", "deepseek-coder"])
                .unwrap();
        match cli.command {
            Commands::Config {
                command: ConfigCommand::Set { key, value },
            } => {
                assert_eq!(key, "api.model");
                assert_eq!(value, "deepseek-coder");
            }
            _ => panic!("expected config set"),
        }
    }

    #[test]
    fn test_cli_parse_with_global_flags() {
        let cli = Cli::try_parse_from([
            "talaria",
            "--config",
            "custom.yaml",
            "--verbose",
            "history",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("custom.yaml"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        assert!(Cli::try_parse_from(["talaria"]).is_err());
    }

    #[test]
    fn test_cli_parse_invalid_command_fails() {
        assert!(Cli::try_parse_from(["talaria", "bogus"]).is_err());
    }
}
