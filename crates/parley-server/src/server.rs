//! `ParleyServer`: axum HTTP + WebSocket front end for the realtime engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_realtime::{AuthenticationProvider, EventDistributor, Poster, RealtimeError};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api;
use crate::config::ServerConfig;
use crate::errors::{ApiError, ServerError};
use crate::health::{self, HealthResponse};
use crate::metrics::WS_REJECTIONS_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Credential verification for HTTP routes.
    pub auth: Arc<dyn AuthenticationProvider>,
    /// The realtime engine.
    pub distributor: Arc<EventDistributor>,
    /// The write path.
    pub poster: Arc<Poster>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The Parley server.
pub struct ParleyServer {
    state: AppState,
}

impl ParleyServer {
    /// Create a server around an engine and write path.
    pub fn new(
        config: ServerConfig,
        auth: Arc<dyn AuthenticationProvider>,
        distributor: Arc<EventDistributor>,
        poster: Arc<Poster>,
    ) -> Self {
        Self {
            state: AppState {
                config: Arc::new(config),
                auth,
                distributor,
                poster,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route(
                "/v1/sessions/{id}/messages",
                post(api::post_session_message).get(api::session_history),
            )
            .route(
                "/v1/panels/{id}/messages",
                post(api::post_panel_message).get(api::panel_history),
            )
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in the background until shutdown is requested.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let listener = tokio::net::TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        info!(%addr, "parley server listening");
        let join = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "server exited with error");
            }
        });
        Ok(ServerHandle { addr, join })
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// A running server.
pub struct ServerHandle {
    /// Bound address.
    pub addr: SocketAddr,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// The serve task, for graceful shutdown.
    pub fn into_join_handle(self) -> JoinHandle<()> {
        self.join
    }
}

/// Credential from `Authorization: Bearer …`, falling back to `?token=`.
pub(crate) fn bearer_token<'a>(headers: &'a HeaderMap, query: Option<&'a str>) -> Option<&'a str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .or(query)
        .filter(|t| !t.is_empty())
}

/// `?token=` for clients that cannot set upgrade headers.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Bearer token.
    pub token: Option<String>,
}

/// GET /ws
///
/// Authentication and the connection limit are checked before upgrading, so
/// a refused client never gets engine state.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let credential = bearer_token(&headers, params.token.as_deref()).unwrap_or_default();
    let principal = match state.distributor.verify(credential).await {
        Ok(p) => p,
        Err(e) => {
            let reason = if matches!(e, RealtimeError::EngineStopped) {
                "stopped"
            } else {
                "unauthorized"
            };
            counter!(WS_REJECTIONS_TOTAL, "reason" => reason).increment(1);
            return ApiError(e).into_response();
        }
    };

    // Early refusal before the upgrade; concurrent upgrades are capped again
    // by the engine when the session attaches.
    if state.distributor.connections().connection_count() >= state.config.max_connections {
        counter!(WS_REJECTIONS_TOTAL, "reason" => "capacity").increment(1);
        warn!(limit = state.config.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let max_size = state.config.max_message_size;
    ws.max_message_size(max_size)
        .on_upgrade(move |socket| run_ws_session(socket, principal, state))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.distributor.connections();
    Json(health::health_check(
        state.start_time,
        state.distributor.is_running(),
        registry.connection_count(),
        registry.online_identity_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
