//! Server module
//!
//! Axum HTTP server exposing the WebSocket upgrade endpoint and `/health`.

pub mod session;

use anyhow::{Context, Result};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::{Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cli::config::{Config, ConnectionConfig};
use crate::relay::broadcast::Broadcaster;
use crate::relay::dispatcher::Dispatcher;
use crate::relay::handler::HandlerTable;
use crate::relay::registry::Registry;

/// Shared state accessible from axum handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub limits: ConnectionConfig,
    pub start_time: Instant,
}

/// Health check response body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// Currently open connections
    pub connections: usize,
}

/// The relay server
pub struct Server {
    config: Config,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    start_time: Instant,
}

impl Server {
    /// Create a server with the standard command set.
    pub fn new(config: Config) -> Self {
        let handlers = HandlerTable::builder()
            .register(Broadcaster::new(config.broadcast.include_sender))
            .build();
        Self::with_handlers(config, handlers)
    }

    /// Create a server with a custom command set.
    pub fn with_handlers(config: Config, handlers: HandlerTable) -> Self {
        if handlers.is_empty() {
            warn!("No command handlers registered; every command will be rejected");
        } else {
            info!(count = handlers.len(), commands = ?handlers.names(), "Command handlers registered");
        }

        let registry = Arc::new(Registry::new());
        let dispatcher = Dispatcher::new(Arc::new(handlers), registry.clone());
        Self {
            config,
            registry,
            dispatcher,
            start_time: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Build the axum router with all routes
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            limits: self.config.connection.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route(&self.config.server.path, get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }

    /// Bind the configured listen address.
    pub async fn bind(self) -> Result<BoundServer> {
        let addr = self.config.server.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        Ok(BoundServer {
            server: self,
            listener,
        })
    }
}

/// A server holding its listening socket
pub struct BoundServer {
    server: Server,
    listener: TcpListener,
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.server.registry()
    }

    /// Serve until `shutdown` resolves, then close every open connection.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let registry = self.server.registry.clone();
        let app = self.server.router();

        info!(%addr, path = %self.server.config.server.path, "Relay listening");

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            let closed = registry.close_all();
            info!(closed, "Shutting down, closed open connections");
        })
        .await
        .context("Server error")?;

        Ok(())
    }
}

/// GET <server.path>
async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<AppState>,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    ws.max_message_size(state.limits.max_message_bytes)
        .on_upgrade(move |socket| session::run_session(socket, peer, state))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.dispatcher.registry().open_count(),
    })
}
