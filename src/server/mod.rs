//! HTTP front end of the assistant.
//!
//! Routes:
//! - `GET  /greeting`      greeting, issues the session cookie
//! - `GET  /`              same as `/greeting` unless static files are served
//! - `POST /chat`          send a message
//! - `POST /clear_history` forget the session's turns
//! - `GET  /get_history`   list the session's turns
//! - `GET  /health`
//!
//! When a static directory is configured it is served for every other path,
//! including `/`, which resolves to its `index.html`.

pub mod error;
pub mod handlers;
pub mod session;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use eyre::Result;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::chat::ChatService;

/// How often idle sessions are swept.
const SWEEP_INTERVAL_SECS: u64 = 600;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub session_ttl: chrono::Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: None,
            session_ttl: chrono::Duration::hours(24),
        }
    }
}

pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let static_dir = static_dir.filter(|dir| {
        let exists = dir.exists();
        if !exists {
            warn!("Static directory {} does not exist, skipping", dir.display());
        }
        exists
    });

    let mut routes = Router::new()
        .route("/greeting", get(handlers::greeting))
        .route("/chat", post(handlers::chat))
        .route("/clear_history", post(handlers::clear_history))
        .route("/get_history", get(handlers::get_history))
        .route("/health", get(handlers::health));
    if static_dir.is_none() {
        routes = routes.route("/", get(handlers::greeting));
    }

    let mut router = routes.layer(TraceLayer::new_for_http()).with_state(state);
    if let Some(dir) = static_dir {
        info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

pub async fn serve(config: ServerConfig, chat: Arc<ChatService>) -> Result<()> {
    spawn_idle_sweeper(chat.clone(), config.session_ttl);

    let app = build_router(AppState { chat }, config.static_dir.as_deref());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn spawn_idle_sweeper(chat: Arc<ChatService>, ttl: chrono::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let store = chat.store();
            store.evict_idle(ttl);
            debug!("Active sessions: {}", store.active_sessions());
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
