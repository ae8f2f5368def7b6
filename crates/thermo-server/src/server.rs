use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use thermo_core::{Clock, LinkState, StatusMailbox};
use thermo_settings::ServerSettings;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::hub::BroadcastHub;
use crate::registry::{self, SubscriberRegistry};
use crate::session::{self, InputEvent, SessionTiming};
use crate::sink::{self, OutputSink};

const INDEX_FILE: &str = "index.htm";
const INPUT_QUEUE: usize = 1024;
/// Pings a subscriber may miss before it is considered dead.
const MISSED_PINGS: u32 = 3;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub timing: SessionTiming,
    pub status_interval: Duration,
    pub max_send_queue: usize,
    /// Silence after which a subscriber is dropped. Swept once per ping period.
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        let ping = Duration::from_millis(settings.ping_interval_ms);
        Self {
            host: settings.host.clone(),
            port: settings.port,
            static_dir: PathBuf::from(&settings.static_dir),
            timing: SessionTiming {
                heartbeat: Duration::from_millis(settings.heartbeat_interval_ms),
                ping,
            },
            status_interval: Duration::from_millis(settings.status_interval_ms),
            max_send_queue: settings.max_send_queue,
            client_timeout: ping * MISSED_PINGS,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub input_tx: mpsc::Sender<InputEvent>,
    pub timing: SessionTiming,
    pub clock: Arc<dyn Clock>,
    pub link_state: watch::Receiver<LinkState>,
}

/// Build the Axum router: WebSocket, health, and the static page.
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route_service("/", ServeFile::new(static_dir.join(INDEX_FILE)))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    mailbox: Arc<StatusMailbox>,
    link_state: watch::Receiver<LinkState>,
    output: Arc<dyn OutputSink>,
    clock: Arc<dyn Clock>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(SubscriberRegistry::new(
        config.max_send_queue,
        config.client_timeout,
    ));

    let hub = BroadcastHub::new(Arc::clone(&registry), mailbox);
    let hub_handle = hub.start(config.status_interval);

    let cleanup_handle = registry::start_cleanup_task(Arc::clone(&registry), config.timing.ping);

    let (input_tx, input_rx) = mpsc::channel::<InputEvent>(INPUT_QUEUE);
    let relay_handle = sink::start_input_relay(input_rx, output);

    let state = AppState {
        registry: Arc::clone(&registry),
        input_tx,
        timing: config.timing,
        clock,
        link_state,
    };
    let router = build_router(state, &config.static_dir);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        static_dir = %config.static_dir.display(),
        "thermo server started"
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "http server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        tasks: vec![server_handle, hub_handle, cleanup_handle, relay_handle],
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub registry: Arc<SubscriberRegistry>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop the listener, the hub and the cleanup sweep. The input relay
    /// exits on its own once the last session drops its sender.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        session::handle_subscriber(
            socket,
            state.registry,
            state.input_tx,
            state.timing,
            state.clock,
        )
    })
}

/// Health check: 200 while the controller link is open, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let device = *state.link_state.borrow();
    let (code, status) = if device.is_open() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = serde_json::json!({
        "status": status,
        "device": device,
        "subscribers": state.registry.count(),
    });
    (code, Json(body))
}
