//! `RealtimeService` — Axum HTTP + WebSocket gateway.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_auth::TokenService;
use parley_core::{RoomId, ServerEvent, UserId};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::auth;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::membership::RoomDirectory;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastDispatcher;
use crate::websocket::presence::PresenceRegistry;
use crate::websocket::rooms::{RoomCoordinator, RoomRegistry};
use crate::websocket::session::{SessionSettings, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    tokens: Arc<TokenService>,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    coordinator: Arc<RoomCoordinator>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    session_settings: SessionSettings,
    max_connections: usize,
    max_message_size: usize,
    metrics: Option<PrometheusHandle>,
}

/// The real-time gateway, constructed explicitly and owned by the
/// embedding application — no process-wide singleton.
///
/// Lifecycle: [`new`](Self::new) → mount [`router`](Self::router) or call
/// [`serve`](Self::serve) → [`shutdown`](Self::shutdown) to stop.
pub struct RealtimeService {
    config: ServerConfig,
    dispatcher: Arc<BroadcastDispatcher>,
    state: AppState,
}

impl RealtimeService {
    /// Create a gateway over the given token service and membership
    /// directory.
    pub fn new(
        config: ServerConfig,
        tokens: TokenService,
        directory: Arc<dyn RoomDirectory>,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let coordinator = Arc::new(RoomCoordinator::new(Arc::clone(&rooms), directory));
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            Arc::clone(&rooms),
            Arc::clone(&presence),
        ));

        let session_settings = SessionSettings {
            ping_interval: Duration::from_secs(config.heartbeat_interval_secs),
            pong_timeout: Duration::from_secs(config.heartbeat_timeout_secs),
            send_queue_capacity: config.send_queue_capacity,
        };

        let state = AppState {
            tokens: Arc::new(tokens),
            presence,
            rooms,
            coordinator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            session_settings,
            max_connections: config.max_connections,
            max_message_size: config.max_message_size,
            metrics: None,
        };

        Self {
            config,
            dispatcher,
            state,
        }
    }

    /// Attach an installed Prometheus recorder for the `/metrics` route.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router: `/health`, `/metrics`, `/ws`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
    }

    /// Fan a committed message out to a room's live connections.
    ///
    /// Called by the CRUD layer after its database write; fire-and-forget.
    pub fn broadcast_to_room(&self, room: RoomId, event: &ServerEvent) {
        self.dispatcher.broadcast_to_room(room, event);
    }

    /// Push a payload to every open connection of `user`.
    pub fn notify_user(&self, user: UserId, event: &ServerEvent) {
        self.dispatcher.notify_user(user, event);
    }

    /// The broadcast dispatcher, for callers that want to hold it directly.
    pub fn dispatcher(&self) -> &Arc<BroadcastDispatcher> {
        &self.dispatcher
    }

    /// The presence registry.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.state.presence
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind and serve until shutdown is initiated.
    ///
    /// Returns a handle carrying the bound port; the accept loop runs on a
    /// spawned task and drains on the shutdown token.
    pub async fn serve(&self) -> io::Result<ServerHandle> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.state.shutdown.token();

        info!(port = local_addr.port(), "realtime gateway started");

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                warn!(error = %e, "gateway accept loop exited with error");
            }
        });

        Ok(ServerHandle {
            port: local_addr.port(),
            server,
        })
    }
}

/// Handle returned by [`RealtimeService::serve`].
pub struct ServerHandle {
    /// Bound port (useful with `port = 0`).
    pub port: u16,
    /// The accept-loop task; resolves after graceful shutdown.
    pub server: tokio::task::JoinHandle<()>,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.presence.connection_count(),
        state.presence.online_count(),
        state.rooms.active_room_count(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws — token-gated WebSocket upgrade.
///
/// Authentication happens here, before the upgrade completes: a refused
/// attempt never fires the connected path and never touches the presence
/// registry.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user_id) = auth::authenticate(&headers, &state.tokens) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if state.presence.connection_count() >= state.max_connections {
        warn!("connection limit reached, refusing upgrade");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let presence = Arc::clone(&state.presence);
    let coordinator = Arc::clone(&state.coordinator);
    let settings = state.session_settings;
    let cancel = state.shutdown.token();

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, user_id, presence, coordinator, settings, cancel)
        })
}
