//! Serve command handler
//!
//! Assembles the relay and storage, starts the local web server, and
//! shuts it down cleanly on ctrl-c.

use crate::commands::build_app;
use crate::config::Config;
use crate::error::Result;
use crate::web::{AppState, WebServer};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Start the local web server
///
/// # Arguments
///
/// * `config` - Loaded configuration (consumed)
/// * `config_path` - Where config updates from the web UI are persisted
/// * `port` - Optional port override
pub async fn run_serve(config: Config, config_path: String, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.web.port);
    let static_dir = PathBuf::from(&config.web.static_dir);

    let app = build_app(config)?;
    let state = AppState {
        config: app.config.clone(),
        config_path: Arc::new(config_path),
        relay: app.relay.clone(),
        store: app.store.clone(),
    };

    // Bind all interfaces so a phone on the same network can reach the UI.
    let bind_addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let handle = WebServer::new(bind_addr, Some(static_dir), state)
        .start()
        .await?;

    println!(
        "{} {}",
        "Web UI running at".green(),
        format!("http://localhost:{}", handle.local_addr().port()).cyan()
    );
    println!("{}", "Press ctrl-c to stop".yellow());

    tokio::signal::ctrl_c().await.ok();
    println!("\n{}", "Shutting down".yellow());
    handle.stop().await?;

    Ok(())
}
