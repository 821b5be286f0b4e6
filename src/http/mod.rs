//! HTTP Control Plane (C7): a stateless dispatcher over C1–C6 exposing the
//! endpoint surface pinned in §6. Every handler validates its input, calls
//! the matching [`Engine`]/[`RecorderRunner`] operation, and returns
//! `{success, message?, data?}` or lets [`AppError`]'s `IntoResponse` impl
//! produce the structured error body.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::reconnection::ConnectionStatus;
use crate::domain::session::DataFormat;
use crate::engine::Engine;
use crate::error::{AppError, AppResult};
use crate::monitoring::MonitoringTask;
use crate::ports::session_repository::SessionRepository;
use crate::ws::WsState;

const HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for every HTTP handler.
#[derive(Clone)]
pub struct HttpState {
    pub engine: Arc<Engine>,
    pub session_repo: Arc<dyn SessionRepository>,
    pub monitoring: Arc<MonitoringTask>,
    pub ws: WsState,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics/", get(metrics))
        .route("/device/scan", get(device_scan))
        .route("/device/list", get(device_list))
        .route("/device/register_device", post(device_register))
        .route("/device/connect", post(device_connect))
        .route("/device/disconnect", post(device_disconnect))
        .route("/device/status", get(device_status))
        .route("/device/battery", get(device_battery))
        .route("/stream/init", post(stream_init))
        .route("/stream/start", post(stream_start))
        .route("/stream/stop", post(stream_stop))
        .route("/stream/status", get(stream_status))
        .route("/stream/auto-status", get(stream_auto_status))
        .route("/data/start-recording", post(data_start_recording))
        .route("/data/stop-recording", post(data_stop_recording))
        .route("/data/recording-status", get(data_recording_status))
        .route("/data/sessions", get(data_sessions))
        .route("/data/sessions/:name", get(data_session_detail))
        .route("/data/sessions/:name/files", get(data_session_files))
        .route(
            "/data/sessions/:name/prepare-export",
            post(data_prepare_export),
        )
        .with_state(state)
}

/// `{success, message?, data?}` per §4.7.
#[derive(Serialize)]
struct Envelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn ok() -> Json<Envelope> {
    Json(Envelope {
        success: true,
        message: None,
        data: None,
    })
}

async fn with_timeout<T>(fut: impl std::future::Future<Output = AppResult<T>>) -> AppResult<T> {
    match tokio::time::timeout(HANDLER_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::DeviceTimeout),
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "name": "linkband-server", "version": env!("CARGO_PKG_VERSION") }))
}

async fn health(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({ "status": "ok", "uptime_seconds": state.engine.uptime_seconds() }))
}

async fn metrics(State(state): State<HttpState>) -> Json<Value> {
    let snapshot = state.monitoring.latest().await;
    Json(json!({
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "system": snapshot.as_ref().map(|s| json!({
            "cpu_usage": s.system.cpu_usage_percent,
            "memory_usage": s.system.memory_used_mb,
            "disk_usage": s.system.disk_free_mb,
            "uptime": state.engine.uptime_seconds(),
        })).unwrap_or_else(|| json!({ "uptime": state.engine.uptime_seconds() })),
        "system_health": snapshot.as_ref().map(|s| s.system_health),
    }))
}

#[derive(Deserialize)]
struct ScanQuery {
    duration: Option<u64>,
}

async fn device_scan(
    State(state): State<HttpState>,
    Query(query): Query<ScanQuery>,
) -> AppResult<Json<Value>> {
    // Exempt from HANDLER_TIMEOUT per §5; Engine::scan caps itself at its
    // own SCAN_TIMEOUT, which can legitimately exceed 5s.
    let duration = Duration::from_secs(query.duration.unwrap_or(5));
    let devices = state.engine.scan(duration).await?;
    let is_connected_id = match state.engine.connection_status() {
        ConnectionStatus::Connected { device_id } => Some(device_id),
        _ => None,
    };
    let devices: Vec<Value> = devices
        .into_iter()
        .map(|d| {
            json!({
                "name": d.name,
                "address": d.id,
                "rssi": d.rssi,
                "is_connected": is_connected_id.as_deref() == Some(d.id.as_str()),
            })
        })
        .collect();
    Ok(Json(json!({ "devices": devices })))
}

async fn device_list(State(state): State<HttpState>) -> AppResult<Json<Value>> {
    let devices = state.engine.list_devices().await?;
    Ok(Json(json!({ "data": devices })))
}

#[derive(Deserialize)]
struct RegisterDeviceBody {
    name: String,
    address: String,
}

async fn device_register(
    State(state): State<HttpState>,
    Json(body): Json<RegisterDeviceBody>,
) -> AppResult<Json<Envelope>> {
    state.engine.register_device(&body.address, &body.name).await?;
    Ok(ok())
}

#[derive(Deserialize)]
struct ConnectBody {
    address: String,
}

async fn device_connect(
    State(state): State<HttpState>,
    Json(body): Json<ConnectBody>,
) -> AppResult<Json<Envelope>> {
    with_timeout(state.engine.connect(&body.address)).await?;
    Ok(ok())
}

async fn device_disconnect(State(state): State<HttpState>) -> AppResult<Json<Envelope>> {
    state.engine.disconnect().await?;
    Ok(ok())
}

async fn device_status(State(state): State<HttpState>) -> Json<Value> {
    let status = state.engine.connection_status();
    let body = match status {
        ConnectionStatus::Connected { device_id } => json!({
            "is_connected": true,
            "device_address": device_id,
        }),
        ConnectionStatus::Reconnecting { attempt, max_attempts } => json!({
            "is_connected": false,
            "reconnecting": true,
            "attempt": attempt,
            "max_attempts": max_attempts,
        }),
        _ => json!({ "is_connected": false }),
    };
    Json(body)
}

async fn device_battery(State(state): State<HttpState>) -> AppResult<Json<Value>> {
    let level = state.engine.battery().await?;
    Ok(Json(json!({ "data": { "level": level } })))
}

async fn stream_init(State(_state): State<HttpState>) -> Json<Envelope> {
    ok()
}

async fn stream_start(State(_state): State<HttpState>) -> Json<Envelope> {
    // Streaming begins automatically once `/device/connect` enables
    // notifications (§4.1); this endpoint just acknowledges the request.
    ok()
}

async fn stream_stop(State(state): State<HttpState>) -> AppResult<Json<Envelope>> {
    state.engine.disconnect().await?;
    Ok(ok())
}

async fn stream_status(State(state): State<HttpState>) -> Json<Value> {
    let is_streaming = state.engine.is_streaming();
    let clients = state.ws.client_count.load(Ordering::Relaxed);
    Json(json!({
        "is_running": is_streaming,
        "is_streaming": is_streaming,
        "clients_connected": clients,
    }))
}

async fn stream_auto_status(State(state): State<HttpState>) -> Json<Value> {
    let snapshot = state.monitoring.latest().await;
    let active_sensors: Vec<&str> = snapshot
        .as_ref()
        .map(|s| {
            s.streaming
                .sensor_rates_hz
                .iter()
                .filter(|(kind, hz)| *hz >= kind.nominal_rate_hz() * 0.5)
                .map(|(kind, _)| kind.as_str())
                .collect()
        })
        .unwrap_or_default();
    Json(json!({
        "is_streaming": state.engine.is_streaming(),
        "is_active": state.engine.is_streaming(),
        "active_sensors": active_sensors,
        "auto_detected": true,
    }))
}

#[derive(Deserialize)]
struct StartRecordingBody {
    session_name: Option<String>,
    settings: Option<RecordingSettings>,
}

#[derive(Deserialize)]
struct RecordingSettings {
    data_format: Option<String>,
    #[allow(dead_code)]
    export_path: Option<String>,
}

async fn data_start_recording(
    State(state): State<HttpState>,
    Json(body): Json<StartRecordingBody>,
) -> AppResult<Json<Value>> {
    let session_name = body
        .session_name
        .unwrap_or_else(|| format!("session-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S")));
    let data_format = match body
        .settings
        .as_ref()
        .and_then(|s| s.data_format.as_deref())
    {
        Some("csv") => DataFormat::Csv,
        _ => DataFormat::Json,
    };

    let session = state
        .engine
        .recorder
        .start_recording(session_name, data_format)
        .await?;

    Ok(Json(json!({
        "session_id": session.id,
        "session_name": session.name,
        "start_time": session.started_at,
        "data_format": session.data_format,
    })))
}

async fn data_stop_recording(State(state): State<HttpState>) -> AppResult<Json<Value>> {
    let session = state.engine.recorder.stop_recording().await?;
    Ok(Json(json!({
        "session_id": session.id,
        "end_time": session.ended_at,
    })))
}

async fn data_recording_status(State(state): State<HttpState>) -> Json<Value> {
    let label = state.engine.recorder.status_label().await;
    let is_recording = label == "recording" || label == "arming";
    let current = state.engine.recorder.last_session().await;
    Json(json!({
        "is_recording": is_recording,
        "current_session": current.as_ref().map(|s| &s.name),
        "start_time": current.as_ref().map(|s| &s.started_at),
    }))
}

async fn data_sessions(State(state): State<HttpState>) -> AppResult<Json<Value>> {
    let sessions = state
        .session_repo
        .list()
        .await
        .map_err(|e| AppError::StorageFailure(e.to_string()))?;
    Ok(Json(json!({ "sessions": sessions })))
}

async fn data_session_detail(
    State(state): State<HttpState>,
    AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Value>> {
    let session = state
        .session_repo
        .get(&name)
        .await
        .map_err(|e| AppError::StorageFailure(e.to_string()))?
        .ok_or_else(|| AppError::SessionNotFound(name.clone()))?;
    Ok(Json(serde_json::to_value(session).map_err(AppError::Json)?))
}

async fn data_session_files(
    State(state): State<HttpState>,
    AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Value>> {
    let session = state
        .session_repo
        .get(&name)
        .await
        .map_err(|e| AppError::StorageFailure(e.to_string()))?
        .ok_or_else(|| AppError::SessionNotFound(name.clone()))?;
    Ok(Json(json!({ "files": session.file_index })))
}

async fn data_prepare_export(
    State(state): State<HttpState>,
    AxumPath(name): AxumPath<String>,
) -> AppResult<Json<Value>> {
    // Also exempt from HANDLER_TIMEOUT per §5; the repository lookup below
    // is local-disk I/O with no device-side deadline to bound it to.
    let session = state
        .session_repo
        .get(&name)
        .await
        .map_err(|e| AppError::StorageFailure(e.to_string()))?
        .ok_or_else(|| AppError::SessionNotFound(name.clone()))?;

    Ok(Json(json!({
        "download_url": format!("/data/sessions/{}/download", session.name),
    })))
}
