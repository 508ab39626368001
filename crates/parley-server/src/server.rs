//! `ParleyServer`: Axum HTTP + WebSocket server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::relay::{ConnectionRegistry, Relay};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::lifecycle::{ConnectionContext, run_connection};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Per-connection context handed to each lifecycle task.
    pub connection: ConnectionContext,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`.
    pub metrics: PrometheusHandle,
    /// Tracks upgraded connection tasks for draining.
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// The relay server.
pub struct ParleyServer {
    config: Arc<ServerConfig>,
    relay: Arc<Relay>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl ParleyServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            relay: Arc::new(Relay::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            connection: ConnectionContext {
                relay: Arc::clone(&self.relay),
                config: Arc::clone(&self.config),
                shutdown: self.shutdown.token(),
            },
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            shutdown: Arc::clone(&self.shutdown),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in a background task until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(addr = %local_addr, "parley relay listening");
        Ok((local_addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.relay.registry
    }

    /// Get the relay components.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Display name from the handshake query: `username`, then `name`, then
/// the configured default. Blank values count as absent.
pub fn display_name_from(params: &HashMap<String, String>, default: &str) -> String {
    ["username", "name"]
        .iter()
        .filter_map(|key| params.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// GET /ws and GET /: WebSocket upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Response {
    let ctx = state.connection;
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let live = ctx.relay.registry.len();
    if live >= ctx.config.max_connections {
        warn!(live, max = ctx.config.max_connections, "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let display_name = display_name_from(&params, &ctx.config.default_display_name);
    let shutdown = state.shutdown;
    ws.max_message_size(ctx.config.max_message_size)
        .on_upgrade(move |socket| shutdown.track(run_connection(socket, display_name, ctx)))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connection.relay.registry.len();
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
