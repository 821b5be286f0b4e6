//! WebSocket Broker (C5): a single `/ws` endpoint bridging the event bus to
//! each connected client, plus a small command surface mirroring the HTTP
//! control plane (§4.5). This is the only socket-aware code in the crate;
//! everything it touches is plain [`Engine`] dispatch (§9).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bus::{BusMessage, Topic};
use crate::domain::sample::SensorKind;
use crate::engine::Engine;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const SILENCE_TIMEOUT: Duration = Duration::from_secs(45);

/// Shared server state for the `/ws` route.
#[derive(Clone)]
pub struct WsState {
    pub engine: Arc<Engine>,
    pub client_count: Arc<AtomicUsize>,
}

pub fn router(state: WsState) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
struct ClientCommand {
    command: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    correlation_id: Option<String>,
}

fn topics_from_names(names: &[String]) -> Vec<Topic> {
    names
        .iter()
        .filter_map(|name| match name.as_str() {
            "raw.eeg" => Some(Topic::Raw(SensorKind::Eeg)),
            "raw.ppg" => Some(Topic::Raw(SensorKind::Ppg)),
            "raw.acc" => Some(Topic::Raw(SensorKind::Acc)),
            "raw.bat" => Some(Topic::Raw(SensorKind::Bat)),
            "processed.eeg" => Some(Topic::Processed(SensorKind::Eeg)),
            "processed.ppg" => Some(Topic::Processed(SensorKind::Ppg)),
            "processed.acc" => Some(Topic::Processed(SensorKind::Acc)),
            "event" => Some(Topic::Event),
            "monitoring" => Some(Topic::Monitoring),
            _ => None,
        })
        .collect()
}

/// Reshape a bus message into its wire envelope, remapping battery raw
/// samples into the `sensor_data` shape per §4.5 (the bus itself stays
/// presentation-agnostic; this remapping is WS-only).
fn to_wire(message: &BusMessage) -> Value {
    if let BusMessage::RawData {
        sensor_type: SensorKind::Bat,
        timestamp,
        data,
    } = message
    {
        let level = data.last().and_then(|sample| match sample {
            crate::domain::sample::RawSample::Bat(b) => Some(b.level_percent),
            _ => None,
        });
        return serde_json::json!({
            "type": "sensor_data",
            "sensor_type": "bat",
            "timestamp": timestamp,
            "data": { "level": level },
        });
    }
    serde_json::to_value(message).unwrap_or(Value::Null)
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let client_id = Uuid::new_v4().to_string();
    let mut rx = state.engine.bus.register(&client_id);
    state.client_count.fetch_add(1, Ordering::Relaxed);

    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // Command results arrive here rather than being sent inline from
    // `handle_command`, so a long-running `scan`/`connect` doesn't block
    // this client's heartbeat and bus forwarding for its whole duration.
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Value>(8);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if tokio::time::timeout(Duration::from_secs(1), sender.send(Message::Ping(Vec::new()))).await.is_err() {
                    break;
                }
            }
            bus_msg = rx.recv() => {
                let Some(bus_msg) = bus_msg else { break };
                let text = to_wire(&bus_msg).to_string();
                if tokio::time::timeout(Duration::from_secs(1), sender.send(Message::Text(text))).await.is_err() {
                    break;
                }
            }
            Some(wire) = cmd_rx.recv() => {
                if tokio::time::timeout(Duration::from_secs(1), sender.send(Message::Text(wire.to_string()))).await.is_err() {
                    break;
                }
            }
            incoming = tokio::time::timeout(SILENCE_TIMEOUT, receiver.next()) => {
                match incoming {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        handle_command(state.clone(), client_id.clone(), text, cmd_tx.clone());
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Err(_) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) => break,
                }
            }
        }
    }

    state.engine.bus.unregister(&client_id);
    state.client_count.fetch_sub(1, Ordering::Relaxed);
}

/// Runs one client command to completion on its own task and delivers the
/// `command.result` wire message back through `cmd_tx`. Spawned rather than
/// awaited inline so `scan`/`connect` never stall this client's socket loop.
fn handle_command(state: WsState, client_id: String, text: String, cmd_tx: mpsc::Sender<Value>) {
    tokio::spawn(async move {
        let Ok(cmd) = serde_json::from_str::<ClientCommand>(&text) else {
            return;
        };

        let result: Result<Value, crate::error::AppError> = match cmd.command.as_str() {
            "scan" => {
                let duration_secs = cmd.payload.get("duration").and_then(Value::as_u64).unwrap_or(5);
                state
                    .engine
                    .scan(Duration::from_secs(duration_secs))
                    .await
                    .map(|devices| serde_json::json!({ "devices": devices }))
            }
            "connect" => {
                let Some(address) = cmd.payload.get("address").and_then(Value::as_str) else {
                    return;
                };
                state.engine.connect(address).await.map(|_| Value::Null)
            }
            "start_stream" | "stop_stream" => Ok(Value::Null),
            "subscribe" => {
                let names: Vec<String> = cmd
                    .payload
                    .get("topics")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                state.engine.bus.subscribe(&client_id, &topics_from_names(&names));
                Ok(Value::Null)
            }
            "unsubscribe" => {
                let names: Vec<String> = cmd
                    .payload
                    .get("topics")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                state.engine.bus.unsubscribe(&client_id, &topics_from_names(&names));
                Ok(Value::Null)
            }
            _ => return,
        };

        let data = serde_json::json!({
            "command": cmd.command,
            "correlation_id": cmd.correlation_id,
            "result": match &result {
                Ok(value) => value.clone(),
                Err(e) => serde_json::json!({ "error_code": e.error_code() }),
            },
        });
        let response = BusMessage::event("command.result", data);
        let _ = cmd_tx.send(to_wire(&response)).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::BatterySample;

    #[test]
    fn topics_from_names_skips_unknown_entries() {
        let topics = topics_from_names(&["raw.eeg".to_string(), "bogus".to_string()]);
        assert_eq!(topics, vec![Topic::Raw(SensorKind::Eeg)]);
    }

    #[test]
    fn to_wire_remaps_battery_raw_to_sensor_data() {
        let msg = BusMessage::raw(
            SensorKind::Bat,
            vec![crate::domain::sample::RawSample::Bat(BatterySample {
                t_host: 1,
                level_percent: 42,
                voltage: None,
                charging: None,
            })],
        );
        let wire = to_wire(&msg);
        assert_eq!(wire["type"], "sensor_data");
        assert_eq!(wire["data"]["level"], 42);
    }

    #[test]
    fn to_wire_passes_through_non_battery_raw() {
        let msg = BusMessage::event("device.connected", serde_json::json!({}));
        let wire = to_wire(&msg);
        assert_eq!(wire["type"], "event");
    }
}
