//! Streaming relay
//!
//! Orchestrates one request/response cycle: assemble the outbound prompt
//! from stored history, consult the response cache, stream the upstream
//! answer to the caller, and persist the completed exchange.
//!
//! The cycle moves through INIT, CACHE_CHECK, then either CACHE_HIT or
//! UPSTREAM_CALL, RELAYING, COMPLETE; any state can fall into a terminal
//! error. Persistence happens only after the full response is known, so a
//! partial stream is never recorded as a finished turn.

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::context;
use crate::error::TalariaError;
use crate::prompts;
use crate::storage::{ConversationStore, Role};
use crate::tokens::estimate;
use crate::upstream::{
    ChatRequest, OutboundMessage, SseBuffer, StreamChunk, UpstreamClient,
    PROVIDER_MAX_OUTPUT_TOKENS,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

/// Cached responses are replayed in chunks of this many characters
const CACHE_REPLAY_CHUNK_CHARS: usize = 10;

/// Pause between replayed chunks, emulating incremental generation
const CACHE_REPLAY_DELAY: Duration = Duration::from_millis(10);

/// Kind of terminal relay failure surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayErrorKind {
    /// No API credential configured; no network call was attempted
    MissingCredential,
    /// Upstream returned a failure (non-2xx status or transport error)
    Upstream,
    /// The network read exceeded the configured deadline
    Timeout,
}

/// Events emitted to the caller during a relay cycle
///
/// The sequence is: one `Conversation`, zero or more `Content` fragments,
/// then either a single `Error` or a terminal `Done`. Content already
/// relayed before an error is never retracted.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Identifies the conversation being extended; always first
    Conversation {
        /// Conversation id
        id: String,
    },
    /// An incremental piece of the response
    Content {
        /// New response characters
        text: String,
    },
    /// Terminal failure
    Error {
        /// Failure classification
        kind: RelayErrorKind,
        /// Human-readable description
        message: String,
    },
    /// End of stream
    Done,
}

/// One-cycle streaming relay between a caller and the upstream API
///
/// Holds the injected configuration, the conversation store, and the
/// response cache. Each [`Relay::run`] call performs exactly one cycle;
/// concurrent cycles may share the same relay.
pub struct Relay {
    config: Arc<RwLock<Config>>,
    store: Arc<dyn ConversationStore>,
    cache: Arc<ResponseCache>,
}

impl Relay {
    /// Creates a relay over the given config, store, and cache
    pub fn new(
        config: Arc<RwLock<Config>>,
        store: Arc<dyn ConversationStore>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
        }
    }

    /// Runs one relay cycle for a user message
    ///
    /// Events are delivered through `tx`; every cycle terminates with a
    /// single `Error` or `Done`. A dropped receiver abandons the cycle:
    /// relaying stops, the in-flight upstream request is dropped, and
    /// nothing is persisted.
    pub async fn run(
        &self,
        user_input: &str,
        conversation_id: &str,
        model_override: Option<&str>,
        tx: mpsc::Sender<RelayEvent>,
    ) {
        let config = self.config.read().await.clone();

        // INIT: refuse to touch the network without a credential.
        if !config.has_credential() {
            let _ = tx
                .send(RelayEvent::Error {
                    kind: RelayErrorKind::MissingCredential,
                    message: "No API key configured; set api.key or TALARIA_API_KEY".to_string(),
                })
                .await;
            return;
        }

        if tx
            .send(RelayEvent::Conversation {
                id: conversation_id.to_string(),
            })
            .await
            .is_err()
        {
            return;
        }

        let model = model_override.unwrap_or(&config.api.model).to_string();

        // History reads are best-effort: a broken store degrades to an
        // empty context rather than failing the cycle.
        let history = match self
            .store
            .get_messages(conversation_id, Some(config.context.max_history))
        {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Failed to load history, continuing without: {}", e);
                Vec::new()
            }
        };

        // CACHE_CHECK
        let fingerprint = ResponseCache::fingerprint(user_input, &model, &history);
        if config.cache.enabled {
            if let Some(cached) = self.cache.lookup(&fingerprint) {
                tracing::debug!(fingerprint = %fingerprint, "Cache hit, replaying stored response");
                self.persist_exchange(conversation_id, user_input, &cached);
                if !replay_cached(&cached, &tx).await {
                    return;
                }
                let _ = tx.send(RelayEvent::Done).await;
                return;
            }
        }

        // UPSTREAM_CALL: system prompt, windowed history, new user message.
        let system_prompt = prompts::load_system_prompt(&config.prompt.path);
        let selected = context::select(&history, config.context.window);

        let mut messages = Vec::with_capacity(selected.len() + 2);
        messages.push(OutboundMessage::new(Role::System, system_prompt));
        for m in &selected {
            messages.push(OutboundMessage::new(m.role, m.content.clone()));
        }
        messages.push(OutboundMessage::new(Role::User, user_input));

        let request = ChatRequest {
            model: model.clone(),
            messages,
            temperature: config.api.temperature,
            top_p: config.api.top_p,
            max_tokens: config.api.max_output_tokens.min(PROVIDER_MAX_OUTPUT_TOKENS),
            stream: true,
        };

        let client = match UpstreamClient::new(
            &config.api.base_url,
            &config.api.key,
            config.api.request_timeout_seconds,
        ) {
            Ok(client) => client,
            Err(e) => {
                let _ = tx.send(error_event(&e)).await;
                return;
            }
        };

        let response = match client.stream_chat(&request).await {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send(error_event(&e)).await;
                return;
            }
        };

        // RELAYING: forward deltas as they arrive, accumulate the full text.
        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();
        let mut full_response = String::new();

        'relay: while let Some(chunk_result) = stream.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    let kind = if e.is_timeout() {
                        RelayErrorKind::Timeout
                    } else {
                        RelayErrorKind::Upstream
                    };
                    let _ = tx
                        .send(RelayEvent::Error {
                            kind,
                            message: format!("Stream read failed: {}", e),
                        })
                        .await;
                    return;
                }
            };

            for payload in buffer.push(&bytes) {
                if payload == "[DONE]" {
                    break 'relay;
                }
                match serde_json::from_str::<StreamChunk>(&payload) {
                    Ok(chunk) => {
                        if let Some(content) = chunk.delta_content() {
                            full_response.push_str(content);
                            if tx
                                .send(RelayEvent::Content {
                                    text: content.to_string(),
                                })
                                .await
                                .is_err()
                            {
                                tracing::debug!("Caller disconnected, abandoning relay");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        // Malformed fragments are skipped, never fatal.
                        tracing::debug!("Skipping malformed stream fragment: {}", e);
                    }
                }
            }
        }

        // COMPLETE: persistence strictly follows the full response.
        self.persist_exchange(conversation_id, user_input, &full_response);
        if config.cache.enabled {
            self.cache.store(
                &fingerprint,
                user_input,
                &full_response,
                &model,
                config.cache.ttl_days,
            );
        }

        let _ = tx.send(RelayEvent::Done).await;
    }

    /// Appends the user message and the assistant response to the store
    ///
    /// Storage failures are logged and swallowed: the caller already
    /// received the relayed text, so the cycle still counts as a success.
    fn persist_exchange(&self, conversation_id: &str, user_input: &str, response: &str) {
        if let Err(e) =
            self.store
                .append(conversation_id, Role::User, user_input, estimate(user_input))
        {
            tracing::warn!("Failed to persist user message: {}", e);
            return;
        }
        if let Err(e) = self.store.append(
            conversation_id,
            Role::Assistant,
            response,
            estimate(response),
        ) {
            tracing::warn!("Failed to persist assistant message: {}", e);
        }
    }
}

/// Replays a cached response in fixed-size chunks with a fixed delay
///
/// Returns false when the caller disconnected mid-replay.
async fn replay_cached(cached: &str, tx: &mpsc::Sender<RelayEvent>) -> bool {
    let chars: Vec<char> = cached.chars().collect();
    for chunk in chars.chunks(CACHE_REPLAY_CHUNK_CHARS) {
        let text: String = chunk.iter().collect();
        if tx.send(RelayEvent::Content { text }).await.is_err() {
            return false;
        }
        tokio::time::sleep(CACHE_REPLAY_DELAY).await;
    }
    true
}

/// Maps an internal error to the caller-facing event taxonomy
fn error_event(e: &anyhow::Error) -> RelayEvent {
    let kind = match e.downcast_ref::<TalariaError>() {
        Some(TalariaError::MissingCredential(_)) => RelayErrorKind::MissingCredential,
        Some(TalariaError::Timeout) => RelayErrorKind::Timeout,
        _ => RelayErrorKind::Upstream,
    };
    RelayEvent::Error {
        kind,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockConversationStore;
    use tempfile::tempdir;

    fn test_cache(dir: &tempfile::TempDir) -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new_with_path(dir.path().join("cache.db")).unwrap())
    }

    async fn collect_events(mut rx: mpsc::Receiver<RelayEvent>) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_missing_credential_short_circuits() {
        let dir = tempdir().unwrap();
        let mut store = MockConversationStore::new();
        // The store must never be touched on this path.
        store.expect_append().times(0);
        store.expect_get_messages().times(0);

        let config = Config::default();
        assert!(!config.has_credential());

        let relay = Relay::new(
            Arc::new(RwLock::new(config)),
            Arc::new(store),
            test_cache(&dir),
        );

        let (tx, rx) = mpsc::channel(16);
        relay.run("hello", "conv-1", None, tx).await;

        let events = collect_events(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RelayEvent::Error {
                kind: RelayErrorKind::MissingCredential,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cache_hit_replays_in_ten_char_chunks_and_persists_once() {
        let dir = tempdir().unwrap();
        let cache = test_cache(&dir);

        let mut config = Config::default();
        config.api.key = "sk-test".to_string();

        let cached_text = "abcdefghijklmnopqrstuvw"; // 23 chars -> 10 + 10 + 3

        // Empty history; seed the cache under the fingerprint the relay
        // will compute.
        let fingerprint = ResponseCache::fingerprint(
            "hello",
            &config.api.model,
            &[],
        );
        cache.store(&fingerprint, "hello", cached_text, &config.api.model, 0);

        let mut store = MockConversationStore::new();
        store
            .expect_get_messages()
            .returning(|_, _| Ok(Vec::new()));
        store
            .expect_append()
            .withf(|id, role, content, _| {
                id == "conv-1" && *role == Role::User && content == "hello"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        store
            .expect_append()
            .withf(move |id, role, content, _| {
                id == "conv-1" && *role == Role::Assistant && content == "abcdefghijklmnopqrstuvw"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let relay = Relay::new(Arc::new(RwLock::new(config)), Arc::new(store), cache);

        let (tx, rx) = mpsc::channel(64);
        relay.run("hello", "conv-1", None, tx).await;

        let events = collect_events(rx).await;
        assert!(matches!(&events[0], RelayEvent::Conversation { id } if id == "conv-1"));
        assert!(matches!(events.last(), Some(RelayEvent::Done)));

        let chunks: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                RelayEvent::Content { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks.concat(), cached_text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_cache_disabled_skips_lookup() {
        let dir = tempdir().unwrap();
        let cache = test_cache(&dir);

        let mut config = Config::default();
        config.api.key = "sk-test".to_string();
        config.cache.enabled = false;
        // Point at a closed port so the upstream call fails fast.
        config.api.base_url = "http://127.0.0.1:9".to_string();

        let fingerprint = ResponseCache::fingerprint("hello", &config.api.model, &[]);
        cache.store(&fingerprint, "hello", "cached", &config.api.model, 0);

        let mut store = MockConversationStore::new();
        store.expect_get_messages().returning(|_, _| Ok(Vec::new()));
        store.expect_append().times(0);

        let relay = Relay::new(Arc::new(RwLock::new(config)), Arc::new(store), cache);

        let (tx, rx) = mpsc::channel(16);
        relay.run("hello", "conv-1", None, tx).await;

        let events = collect_events(rx).await;
        // With the cache disabled the cached entry is ignored and the dead
        // upstream produces an error, not a replay.
        assert!(events
            .iter()
            .all(|e| !matches!(e, RelayEvent::Content { .. })));
        assert!(matches!(
            events.last(),
            Some(RelayEvent::Error {
                kind: RelayErrorKind::Upstream,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_upstream_unreachable_leaves_store_untouched() {
        let dir = tempdir().unwrap();

        let mut config = Config::default();
        config.api.key = "sk-test".to_string();
        config.api.base_url = "http://127.0.0.1:9".to_string();

        let mut store = MockConversationStore::new();
        store.expect_get_messages().returning(|_, _| Ok(Vec::new()));
        store.expect_append().times(0);

        let relay = Relay::new(
            Arc::new(RwLock::new(config)),
            Arc::new(store),
            test_cache(&dir),
        );

        let (tx, rx) = mpsc::channel(16);
        relay.run("hello", "conv-1", None, tx).await;

        let events = collect_events(rx).await;
        assert!(matches!(&events[0], RelayEvent::Conversation { .. }));
        assert!(matches!(
            events.last(),
            Some(RelayEvent::Error {
                kind: RelayErrorKind::Upstream,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_history_read_failure_degrades_to_empty_context() {
        let dir = tempdir().unwrap();

        let mut config = Config::default();
        config.api.key = "sk-test".to_string();
        config.api.base_url = "http://127.0.0.1:9".to_string();

        let mut store = MockConversationStore::new();
        store
            .expect_get_messages()
            .returning(|_, _| Err(TalariaError::Storage("broken".into()).into()));
        store.expect_append().times(0);

        let relay = Relay::new(
            Arc::new(RwLock::new(config)),
            Arc::new(store),
            test_cache(&dir),
        );

        let (tx, rx) = mpsc::channel(16);
        relay.run("hello", "conv-1", None, tx).await;

        // The cycle still reaches the upstream attempt (and its error)
        // instead of aborting on the storage failure.
        let events = collect_events(rx).await;
        assert!(matches!(events.last(), Some(RelayEvent::Error { .. })));
    }

    #[test]
    fn test_error_event_maps_taxonomy() {
        let e: anyhow::Error = TalariaError::Timeout.into();
        assert!(matches!(
            error_event(&e),
            RelayEvent::Error {
                kind: RelayErrorKind::Timeout,
                ..
            }
        ));

        let e: anyhow::Error = TalariaError::Upstream {
            status: 500,
            body: "oops".into(),
        }
        .into();
        assert!(matches!(
            error_event(&e),
            RelayEvent::Error {
                kind: RelayErrorKind::Upstream,
                ..
            }
        ));
    }
}
