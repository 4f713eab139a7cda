//! Local web server
//!
//! Exposes the streaming relay and conversation management over HTTP for
//! the browser front-end: an SSE chat stream plus JSON routes for
//! conversations and configuration.

pub mod routes;
pub mod server;

pub use routes::AppState;
pub use server::{ServerHandle, WebServer};
