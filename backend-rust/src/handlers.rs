//! # handlers
//!
//! The thin HTTP/WebSocket surface over the core operations: start/stop/
//! status for the single replay session, a live event stream, and the alert
//! review workflow. Routes validate payloads and delegate; nothing here owns
//! pipeline state.

use std::path::PathBuf;

use ais_types::{AlertStatus, RuleType};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::db::Database;
use crate::error::StartError;
use crate::replay::{ReplayManager, ReplayParams};

#[derive(Clone)]
pub struct AppState {
    pub manager: ReplayManager,
    pub db: Database,
    pub bus: EventBus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/replay/start", post(start_replay))
        .route("/api/replay/stop", post(stop_replay))
        .route("/api/replay/status", get(replay_status))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/:id/status", patch(update_alert_status))
        .route("/api/vessels", get(list_vessels))
        .route("/ws", get(ws_events))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Replay control ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StartReplayRequest {
    path: PathBuf,
    speedup: Option<f64>,
    use_streaming: Option<bool>,
    batch_size: Option<usize>,
}

async fn start_replay(
    State(state): State<AppState>,
    Json(req): Json<StartReplayRequest>,
) -> Response {
    let params = ReplayParams {
        path: req.path,
        speedup: req.speedup.unwrap_or(1.0),
        use_streaming: req.use_streaming.unwrap_or(false),
        batch_size: req.batch_size,
    };
    match state.manager.start(params).await {
        Ok(session_id) => (StatusCode::OK, Json(json!({ "session_id": session_id }))).into_response(),
        Err(e) => {
            let code = match &e {
                StartError::State(_) => StatusCode::CONFLICT,
                StartError::Source(_) | StartError::Params(_) => StatusCode::BAD_REQUEST,
            };
            warn!(error = %e, "replay start rejected");
            (code, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn stop_replay(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stopped = state.manager.stop();
    Json(json!({ "stopped": stopped }))
}

async fn replay_status(State(state): State<AppState>) -> Response {
    Json(state.manager.status()).into_response()
}

// ── Alert queries & review workflow ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AlertQuery {
    mmsi: Option<String>,
    rule_type: Option<String>,
    limit: Option<i64>,
}

async fn list_alerts(State(state): State<AppState>, Query(query): Query<AlertQuery>) -> Response {
    let rule_type = match query.rule_type.as_deref() {
        None => None,
        Some(raw) => match RuleType::parse(raw) {
            Some(rule) => Some(rule),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("unknown rule type {raw:?}") })),
                )
                    .into_response();
            }
        },
    };
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    match state.db.recent_alerts(query.mmsi.as_deref(), rule_type, limit).await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => internal_error("alert query failed", e),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateAlertStatusRequest {
    /// Deserialization rejects anything outside the closed status set
    status: AlertStatus,
    notes: Option<String>,
}

async fn update_alert_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAlertStatusRequest>,
) -> Response {
    match state
        .db
        .update_alert_status(id, req.status, req.notes.as_deref())
        .await
    {
        Ok(true) => Json(json!({ "updated": true })).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown alert id {id}") })),
        )
            .into_response(),
        Err(e) => internal_error("alert status update failed", e),
    }
}

async fn list_vessels(State(state): State<AppState>) -> Response {
    match state.db.latest_vessels(500).await {
        Ok(vessels) => Json(vessels).into_response(),
        Err(e) => internal_error("vessel query failed", e),
    }
}

fn internal_error(context: &str, e: sqlx::Error) -> Response {
    warn!(error = %e, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": context })),
    )
        .into_response()
}

// ── Live event stream ─────────────────────────────────────────────────────────

async fn ws_events(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_events(socket, state.bus))
}

/// Relay bus events to one WebSocket client. A client that falls behind the
/// mailbox bound loses the oldest messages (counted), never stalls the
/// driver.
async fn handle_events(mut socket: WebSocket, bus: EventBus) {
    let mut rx = bus.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize bus event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    bus.record_lag(n);
                    debug!(dropped = n, "subscriber lagged; oldest events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Subscribers only listen; anything else is ignored
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}
