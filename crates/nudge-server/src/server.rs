//! `NudgeServer`: Axum HTTP server wiring the core to the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use nudge_core::{ChannelRegistry, PushDispatcher, SessionId, SessionStore};
use serde::Serialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::health_handler;
use crate::identity::{HeaderIdentityResolver, IdentityResolver};
use crate::shutdown::ShutdownCoordinator;
use crate::sweeper::spawn_sweeper;
use crate::{metrics, stream, trigger};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Push dispatcher shared by streams and triggers.
    pub dispatcher: Arc<PushDispatcher>,
    /// Caller identity lookup.
    pub resolver: Arc<dyn IdentityResolver>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

/// The push server.
pub struct NudgeServer {
    config: Arc<ServerConfig>,
    dispatcher: Arc<PushDispatcher>,
    resolver: Arc<dyn IdentityResolver>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl NudgeServer {
    /// Create a server with a fresh store, registry and dispatcher.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let store = Arc::new(SessionStore::new(config.reidentify));
        let registry = Arc::new(ChannelRegistry::new());
        let dispatcher = Arc::new(PushDispatcher::new(store, registry, config.delivery));
        Self {
            config: Arc::new(config),
            dispatcher,
            resolver: Arc::new(HeaderIdentityResolver),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Replace the identity resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            resolver: self.resolver.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/stream", get(stream::stream_handler))
            .route("/sessions", post(issue_session_handler))
            .route("/sessions/{session_id}/push", post(trigger::push_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address and the serving task. The task completes
    /// once shutdown is signalled and every open stream has closed.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;

        let sweeper = self.config.idle_timeout().map(|max_idle| {
            spawn_sweeper(
                self.dispatcher.clone(),
                max_idle,
                self.config.sweep_interval(),
                self.shutdown.token(),
            )
        });

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(%error, "server error");
            }
            if let Some(sweeper) = sweeper {
                let _ = sweeper.await;
            }
            info!("server stopped");
        });

        info!(%addr, "nudge server listening");
        Ok((addr, handle))
    }

    /// The push dispatcher, for in-process trigger sources.
    pub fn dispatcher(&self) -> &Arc<PushDispatcher> {
        &self.dispatcher
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Body of `POST /sessions`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    /// Fresh server-issued session id.
    pub session_id: SessionId,
}

/// POST /sessions: issue an id for a client that has none. The session record
/// itself is created when a stream first attaches.
async fn issue_session_handler() -> Json<IssuedSession> {
    Json(IssuedSession {
        session_id: SessionId::generate(),
    })
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}
