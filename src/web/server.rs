//! Web server lifecycle
//!
//! The server is an explicit value owned by the process entry point:
//! [`WebServer::start`] binds the listener and returns a
//! [`ServerHandle`] whose `stop` triggers graceful shutdown. No global
//! lifecycle flags.

use crate::error::{Result, TalariaError};
use crate::web::routes::{self, AppState};
use std::net::SocketAddr;
use std::path::Path;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

/// Local web server for the browser front-end
pub struct WebServer {
    bind_addr: SocketAddr,
    static_dir: Option<std::path::PathBuf>,
    state: AppState,
}

/// Handle to a running server
///
/// Dropping the handle without calling [`ServerHandle::stop`] leaves the
/// server running until the process exits.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// The address the server actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals graceful shutdown and waits for the server to finish
    pub async fn stop(self) -> Result<()> {
        // A dropped receiver means the server already exited.
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| TalariaError::Server(format!("Server task panicked: {}", e)))?
            .map_err(|e| TalariaError::Server(e.to_string()))?;
        Ok(())
    }
}

impl WebServer {
    /// Creates a server that will bind the given address
    ///
    /// `static_dir` is served as a fallback for front-end files when the
    /// directory exists; API routes always take precedence.
    pub fn new(bind_addr: SocketAddr, static_dir: Option<std::path::PathBuf>, state: AppState) -> Self {
        Self {
            bind_addr,
            static_dir,
            state,
        }
    }

    /// Binds the listener and starts serving in a background task
    pub async fn start(self) -> Result<ServerHandle> {
        let mut app = routes::create_router(self.state);

        // Permissive CORS: the server only binds locally.
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);

        if let Some(static_dir) = &self.static_dir {
            if Path::new(static_dir).is_dir() {
                tracing::info!("Serving static files from {}", static_dir.display());
                app = app.fallback_service(ServeDir::new(static_dir));
            } else {
                tracing::debug!(
                    "Static directory {} not found, serving API only",
                    static_dir.display()
                );
            }
        }

        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| TalariaError::Server(format!("Failed to bind {}: {}", self.bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TalariaError::Server(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!("Web server listening on http://{}", local_addr);
        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}
