use std::{
    collections::{BTreeMap, BTreeSet},
    net::SocketAddr,
    sync::Arc,
};

use anyhow::Context;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use fop::{spawn_field_of_play, FopHandle, SilentTones};
use mqtt_bridge::MqttBridge;
use serde::Deserialize;
use shared::{
    domain::AthleteId,
    error::{ApiError, ErrorCode},
    protocol::{FopEvent, FopEventKind, FopSnapshot, Origin},
};
use storage::{AthleteRepository, MemoryStorage};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

use config::{load_settings, Settings};

const MAX_EVENT_BYTES: usize = 16 * 1024;
const DEFAULT_PLATFORM: &str = "A";

#[derive(Clone)]
struct AppState {
    platforms: BTreeMap<String, FopHandle>,
}

#[derive(Debug, Deserialize)]
struct EventRequest {
    event: FopEventKind,
    #[serde(default)]
    athlete: Option<AthleteId>,
    #[serde(default)]
    session: Option<Uuid>,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage = MemoryStorage::from_json_file(&settings.competition_path).map_err(|error| {
        error!(
            path = %settings.competition_path,
            %error,
            "failed to load competition; check competition_path"
        );
        error
    })?;
    let names = platform_names(&settings, &storage)?;
    let repo: Arc<dyn AthleteRepository> = Arc::new(storage);

    let mut platforms = BTreeMap::new();
    let mut tasks = Vec::new();
    for name in names {
        let (handle, task) = spawn_field_of_play(
            name.clone(),
            settings.fop_config(),
            repo.clone(),
            Box::new(SilentTones),
        );
        platforms.insert(name, handle);
        tasks.push(task);
    }

    let bridge = settings
        .mqtt_enabled
        .then(|| MqttBridge::new(settings.mqtt.clone(), platforms.values().cloned()).spawn());

    let state = AppState {
        platforms: platforms.clone(),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    info!(%addr, platforms = platforms.len(), "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(bridge) = bridge {
        bridge.abort();
    }
    for handle in platforms.values() {
        handle.shutdown();
    }
    for task in tasks {
        if let Err(err) = task.await {
            warn!(error = %err, "platform task ended abnormally");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Platforms from the settings, else those named by the competition's groups.
fn platform_names(settings: &Settings, storage: &MemoryStorage) -> anyhow::Result<Vec<String>> {
    if !settings.platforms.is_empty() {
        return Ok(settings.platforms.clone());
    }
    let named: BTreeSet<String> = storage
        .groups()?
        .into_iter()
        .filter_map(|group| group.platform)
        .collect();
    if named.is_empty() {
        return Ok(vec![DEFAULT_PLATFORM.to_string()]);
    }
    Ok(named.into_iter().collect())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/platforms", get(list_platforms))
        .route("/platforms/:platform/events", post(post_event))
        .route("/platforms/:platform/state", get(platform_state))
        .route("/platforms/:platform/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_EVENT_BYTES))
        .with_state(state)
}

fn platform<'a>(state: &'a AppState, name: &str) -> ApiResult<&'a FopHandle> {
    state.platforms.get(name).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(
                ErrorCode::NotFound,
                format!("unknown platform '{name}'"),
            )),
        )
    })
}

/// Events only the controller's own timers may produce.
fn is_timer_event(kind: &FopEventKind) -> bool {
    matches!(
        kind,
        FopEventKind::BreakTimeOver { .. }
            | FopEventKind::TimeOver
            | FopEventKind::ClockWarning { .. }
            | FopEventKind::RevealDecision { .. }
            | FopEventKind::RefereeReminder { .. }
            | FopEventKind::RefereeReminderTimeout { .. }
            | FopEventKind::JuryReveal { .. }
    )
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_platforms(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.platforms.keys().cloned().collect())
}

async fn post_event(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<EventRequest>,
) -> ApiResult<StatusCode> {
    let handle = platform(&state, &name)?;
    if is_timer_event(&req.event) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                format!("'{}' is raised by the controller itself", req.event.name()),
            )),
        ));
    }

    let origin = match req.session {
        Some(session) => Origin::Session(session),
        None => Origin::Controller,
    };
    let mut event = FopEvent::new(req.event, origin);
    if let Some(athlete) = req.athlete {
        event = event.with_athlete(athlete);
    }
    handle.post(event);
    Ok(StatusCode::ACCEPTED)
}

async fn platform_state(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<FopSnapshot>> {
    let handle = platform(&state, &name)?;
    let snapshot = handle.snapshot().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok(Json(snapshot))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let handle = platform(&state, &name)?.clone();
    Ok(ws.on_upgrade(move |socket| ws_connection(handle, socket)))
}

/// Streams the platform's output events as JSON text frames. A lagging
/// client skips events rather than slowing the controller.
async fn ws_connection(handle: FopHandle, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};
    use tokio_stream::wrappers::BroadcastStream;

    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(handle.subscribe());
    let platform = handle.platform().to_string();

    let send_task = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            let Ok(event) = item else {
                warn!(%platform, "websocket client lagged");
                continue;
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
