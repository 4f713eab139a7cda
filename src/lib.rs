//! Talaria - terminal and local-web chat client library
//!
//! This library provides the core functionality for the Talaria chat
//! client: a streaming relay to chat-completion APIs, conversation
//! persistence, response caching, and the local web server.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `relay`: The streaming relay — one request/response cycle from
//!   prompt assembly through persistence
//! - `context`: Deterministic context-window selection over stored history
//! - `tokens`: Heuristic token estimation
//! - `cache`: Fingerprinted response cache with TTL
//! - `storage`: Conversation store trait and SQLite backend
//! - `upstream`: Chat-completions wire types and streaming HTTP client
//! - `web`: Local web server exposing the relay as server-sent events
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use talaria::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("talaria.yaml")?;
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod prompts;
pub mod relay;
pub mod storage;
pub mod tokens;
pub mod upstream;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, TalariaError};
pub use relay::{Relay, RelayErrorKind, RelayEvent};
pub use storage::{ConversationStore, SqliteStore};
