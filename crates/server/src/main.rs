use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::{get, post}, Json, Router};
use blindhub_core::{
    CommandError, Coordinator, CoordinatorEvent, CoverCommand, CoverPlatform, DeviceError,
    Executor, HubConfig,
};
use blindhub_sim::SimulatedHub;
use dotenvy::dotenv;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod models;
mod services;

use models::*;
use services::CoverService;

#[derive(Clone)]
struct AppState {
    instance: Arc<str>,
    covers: CoverService,
    metrics: Arc<Metrics>,
}

struct Metrics {
    commands_total: IntCounterVec,         // label: command
    command_failures_total: IntCounterVec, // label: command
    refresh_failures_total: IntCounter,
    covers: IntGauge,
    ws_clients: IntGauge,
}

impl Metrics {
    fn new() -> prometheus::Result<Arc<Self>> {
        Self::with_registry(prometheus::default_registry())
    }

    fn with_registry(registry: &Registry) -> prometheus::Result<Arc<Self>> {
        let commands_total = IntCounterVec::new(
            Opts::new("blindhub_cover_commands_total", "Cover commands dispatched to the hub"),
            &["command"],
        )?;
        let command_failures_total = IntCounterVec::new(
            Opts::new("blindhub_cover_command_failures_total", "Cover commands that returned an error"),
            &["command"],
        )?;
        let refresh_failures_total = IntCounter::new(
            "blindhub_coordinator_refresh_failures_total",
            "Failed hub polls",
        )?;
        let covers = IntGauge::new("blindhub_covers", "Cover entities currently set up")?;
        let ws_clients = IntGauge::new("blindhub_ws_clients", "Number of connected WebSocket clients")?;

        registry.register(Box::new(commands_total.clone()))?;
        registry.register(Box::new(command_failures_total.clone()))?;
        registry.register(Box::new(refresh_failures_total.clone()))?;
        registry.register(Box::new(covers.clone()))?;
        registry.register(Box::new(ws_clients.clone()))?;

        Ok(Arc::new(Self { commands_total, command_failures_total, refresh_failures_total, covers, ws_clients }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let cfg = HubConfig::from_env();
    info!(instance = %cfg.instance_name, blinds = cfg.sim_blinds, latency_ms = cfg.sim_latency_ms, "Configuring simulated hub");

    let hub = Arc::new(SimulatedHub::new(cfg.sim_blinds, cfg.sim_latency()));
    let executor = Executor::new(cfg.max_workers);
    let coordinator = Coordinator::new(hub, executor.clone());
    let metrics = Metrics::new().context("failed to register metrics")?;

    // Subscribe before the first refresh so its outcome is counted too
    tokio::spawn(coordinator_event_loop(coordinator.events(), metrics.clone()));

    let mut platform = CoverPlatform::setup(coordinator)
        .await
        .context("initial hub refresh failed")?;
    platform.start_polling(cfg.poll_interval());
    metrics.covers.set(platform.len() as i64);

    let covers = CoverService::new(platform, metrics.clone());
    let state = AppState {
        instance: Arc::from(cfg.instance_name.as_str()),
        covers: covers.clone(),
        metrics,
    };

    let app = router(state);

    let addr: SocketAddr = cfg
        .http_addr
        .parse()
        .with_context(|| format!("invalid BLINDHUB_HTTP_ADDR {}", cfg.http_addr))?;

    info!(%addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    covers.unload().await;
    executor.shutdown();
    info!("Shut down");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/version", get(version))
        .route("/metrics", get(metrics_handler))
        // Cover API
        .route("/api/covers", get(api_list_covers))
        .route("/api/covers/:ain", get(api_get_cover))
        .route("/api/covers/:ain/open", post(api_open_cover))
        .route("/api/covers/:ain/close", post(api_close_cover))
        .route("/api/covers/:ain/stop", post(api_stop_cover))
        .route("/api/covers/:ain/position", post(api_set_cover_position))
        .route("/api/covers/:ain/command", post(api_cover_command))
        .route("/api/admin/refresh", post(api_refresh))
        .route("/ws/covers", get(ws_covers))
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,axum=info,hyper=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn healthz() -> &'static str { "ok" }

async fn readyz(State(state): State<AppState>) -> StatusCode {
    if state.covers.hub_reachable() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(?e, "metrics encoding failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}

// ----- Cover API handlers -----

async fn api_list_covers(State(state): State<AppState>) -> Json<CoversResponse> {
    Json(CoversResponse {
        instance: state.instance.to_string(),
        hub_reachable: state.covers.hub_reachable(),
        last_refresh: state.covers.last_refresh(),
        covers: state.covers.list().await,
    })
}

async fn api_get_cover(Path(ain): Path<String>, State(state): State<AppState>) -> Response {
    match state.covers.get(&ain).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => {
            tracing::warn!(%ain, "cover lookup failed");
            command_error_response(&CommandError::NotFound(ain))
        }
    }
}

async fn api_open_cover(Path(ain): Path<String>, State(state): State<AppState>) -> Response {
    run_command(&state, &ain, CoverCommand::Open).await
}

async fn api_close_cover(Path(ain): Path<String>, State(state): State<AppState>) -> Response {
    run_command(&state, &ain, CoverCommand::Close).await
}

async fn api_stop_cover(Path(ain): Path<String>, State(state): State<AppState>) -> Response {
    run_command(&state, &ain, CoverCommand::Stop).await
}

async fn api_set_cover_position(Path(ain): Path<String>, State(state): State<AppState>, Json(body): Json<PositionPayload>) -> Response {
    run_command(&state, &ain, CoverCommand::SetPosition(body.position)).await
}

async fn api_cover_command(Path(ain): Path<String>, State(state): State<AppState>, Json(command): Json<CoverCommand>) -> Response {
    run_command(&state, &ain, command).await
}

async fn api_refresh(State(state): State<AppState>) -> Response {
    tracing::info!("Hub refresh requested via API");
    match state.covers.refresh().await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Hub refresh via API failed");
            command_error_response(&e)
        }
    }
}

async fn run_command(state: &AppState, ain: &str, command: CoverCommand) -> Response {
    match state.covers.execute(ain, command).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => command_error_response(&e),
    }
}

fn command_error_status(err: &CommandError) -> StatusCode {
    match err {
        CommandError::NotFound(_) => StatusCode::NOT_FOUND,
        CommandError::Device(DeviceError::Busy(_)) => StatusCode::CONFLICT,
        CommandError::Device(_) => StatusCode::BAD_GATEWAY,
        CommandError::Executor(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn command_error_response(err: &CommandError) -> Response {
    (command_error_status(err), Json(ErrorBody { error: err.to_string() })).into_response()
}

// ----- WebSocket cover updates -----

async fn ws_covers(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| covers_ws_loop(state, socket))
}

async fn covers_ws_loop(state: AppState, mut socket: WebSocket) {
    state.metrics.ws_clients.inc();
    tracing::info!("Cover WebSocket client connected");

    let mut rx = state.covers.events();
    let initial = CoverStreamMessage::Covers { covers: state.covers.list().await };
    if send_json(&mut socket, &initial).await {
        loop {
            let msg = tokio::select! {
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                },
                event = rx.recv() => match event {
                    Ok(CoordinatorEvent::Refreshed { .. }) => CoverStreamMessage::Covers { covers: state.covers.list().await },
                    Ok(CoordinatorEvent::RefreshFailed { error }) => CoverStreamMessage::RefreshFailed { error },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Cover WebSocket lagging behind coordinator events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if !send_json(&mut socket, &msg).await {
                break;
            }
        }
    }

    let _ = socket.close().await;
    state.metrics.ws_clients.dec();
    tracing::info!("Cover WebSocket connection closed");
}

async fn send_json(socket: &mut WebSocket, msg: &CoverStreamMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(?e, "failed to encode cover update");
            return true;
        }
    };
    socket.send(Message::Text(text)).await.is_ok()
}

// ----- Background coordinator consumer -> metrics -----
async fn coordinator_event_loop(mut rx: broadcast::Receiver<CoordinatorEvent>, metrics: Arc<Metrics>) {
    loop {
        match rx.recv().await {
            Ok(CoordinatorEvent::RefreshFailed { .. }) => metrics.refresh_failures_total.inc(),
            Ok(CoordinatorEvent::Refreshed { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
