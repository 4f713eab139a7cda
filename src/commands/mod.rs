/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`       — Interactive terminal chat session
- `serve`      — Local web server
- `history`    — Conversation history management
- `config_cmd` — Configuration inspection and updates

The handlers are intentionally small and wire together the library
components: storage, cache, relay, and the web server.
*/

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::Result;
use crate::relay::Relay;
use crate::storage::{ConversationStore, SqliteStore};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod chat;
pub mod config_cmd;
pub mod history;
pub mod serve;

/// Assembled application components shared by the chat and serve commands
pub struct AppContext {
    /// Shared configuration
    pub config: Arc<RwLock<Config>>,
    /// Conversation storage
    pub store: Arc<dyn ConversationStore>,
    /// The streaming relay
    pub relay: Arc<Relay>,
}

/// Builds the store, cache, and relay from a loaded configuration
pub fn build_app(config: Config) -> Result<AppContext> {
    let store = SqliteStore::new()?;
    let cache = Arc::new(ResponseCache::new_with_path(store.db_path())?);
    let store: Arc<dyn ConversationStore> = Arc::new(store);
    let config = Arc::new(RwLock::new(config));
    let relay = Arc::new(Relay::new(config.clone(), store.clone(), cache));

    Ok(AppContext {
        config,
        store,
        relay,
    })
}
