//! Device Link (C1) state machine and its async runner.
//!
//! `DeviceLinkState` is the pure statig transition table for §4.1's
//! `Idle → Scanning → Connecting → Connected → Streaming → Disconnecting →
//! Idle` cycle, with `Error` as the bounded-backoff wait before a reconnect
//! retry. `DeviceLinkRunner` is the async half: it drives the BLE adapter,
//! decodes notifications through [`crate::domain::frame`], and schedules
//! reconnect attempts using [`ReconnectionPolicy`].

#![allow(missing_docs)] // statig macro generates code that triggers missing_docs warnings

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use parking_lot::Mutex;
use statig::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusMessage, EventBus};
use crate::domain::frame;
use crate::domain::reconnection::{ConnectionStatus, ReconnectionPolicy};
use crate::domain::sample::RawSample;
use crate::ports::ble_adapter::{BleAdapter, Characteristic};

/// Events that drive the device link's state transitions.
#[derive(Debug, Clone)]
pub enum DeviceLinkEvent {
    /// User requests a scan.
    StartScan,
    /// The ≤10 s scan window elapsed, or the user stopped it early.
    ScanEnded,
    /// User selects a device to connect to.
    Connect { device_id: String },
    /// `Connecting → Connected`: all characteristics discovered, battery read.
    ConnectSucceeded,
    /// The 10 s connect timeout elapsed, or the adapter reported a failure.
    ConnectFailed,
    /// `Connected → Streaming`: notifications enabled on the configured subset.
    NotificationsEnabled,
    /// The BLE link dropped without an explicit disconnect request.
    LinkLost,
    /// User requested disconnect.
    ExplicitDisconnect,
    /// `Disconnecting` finished tearing down the adapter-side connection.
    DisconnectComplete,
    /// The backoff delay for a reconnect attempt elapsed.
    BackoffElapsed,
}

/// States of the device link, per §4.1.
#[derive(Debug, Default, Clone)]
pub enum DeviceLinkState {
    /// No device selected; nothing in flight.
    #[default]
    Idle,
    /// Actively scanning for advertising devices.
    Scanning,
    /// Connection attempt in progress.
    Connecting { device_id: String },
    /// Connected; characteristics discovered, not yet streaming.
    Connected { device_id: String },
    /// Notifications enabled; samples flowing to C2.
    Streaming { device_id: String },
    /// Tearing down the connection; always terminates in `Idle`.
    Disconnecting { device_id: Option<String> },
    /// Waiting out the exponential backoff before the next reconnect attempt.
    Error { device_id: String, attempt: u32 },
}

/// Shared context visible to every state handler.
pub struct DeviceLinkContext {
    adapter: Arc<dyn BleAdapter + Send + Sync>,
}

impl DeviceLinkContext {
    pub fn new(adapter: Arc<dyn BleAdapter + Send + Sync>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &(dyn BleAdapter + Send + Sync) {
        self.adapter.as_ref()
    }

    /// A cloned owning handle to the adapter, for callers that need to hold
    /// it across an `.await` without keeping the state machine locked.
    pub fn adapter_handle(&self) -> Arc<dyn BleAdapter + Send + Sync> {
        Arc::clone(&self.adapter)
    }
}

#[state_machine(
    initial = "State::idle()",
    state(derive(Debug, Clone)),
    on_transition = "Self::on_transition"
)]
impl DeviceLinkState {
    #[state]
    fn idle(event: &DeviceLinkEvent) -> Response<State> {
        match event {
            DeviceLinkEvent::StartScan => Transition(State::scanning()),
            DeviceLinkEvent::Connect { device_id } => {
                Transition(State::connecting(device_id.clone()))
            }
            _ => Super,
        }
    }

    #[state]
    fn scanning(event: &DeviceLinkEvent) -> Response<State> {
        match event {
            DeviceLinkEvent::ScanEnded => Transition(State::idle()),
            _ => Super,
        }
    }

    #[state]
    #[allow(clippy::ptr_arg)]
    fn connecting(device_id: &String, event: &DeviceLinkEvent) -> Response<State> {
        match event {
            DeviceLinkEvent::ConnectSucceeded => Transition(State::connected(device_id.clone())),
            DeviceLinkEvent::ConnectFailed => Transition(State::idle()),
            DeviceLinkEvent::ExplicitDisconnect => {
                Transition(State::disconnecting(Some(device_id.clone())))
            }
            _ => Super,
        }
    }

    #[state]
    #[allow(clippy::ptr_arg)]
    fn connected(device_id: &String, event: &DeviceLinkEvent) -> Response<State> {
        match event {
            DeviceLinkEvent::NotificationsEnabled => {
                Transition(State::streaming(device_id.clone()))
            }
            DeviceLinkEvent::LinkLost => Transition(State::disconnecting(Some(device_id.clone()))),
            DeviceLinkEvent::ExplicitDisconnect => {
                Transition(State::disconnecting(Some(device_id.clone())))
            }
            _ => Super,
        }
    }

    #[state]
    #[allow(clippy::ptr_arg)]
    fn streaming(device_id: &String, event: &DeviceLinkEvent) -> Response<State> {
        match event {
            DeviceLinkEvent::LinkLost => Transition(State::error(device_id.clone(), 1)),
            DeviceLinkEvent::ExplicitDisconnect => {
                Transition(State::disconnecting(Some(device_id.clone())))
            }
            _ => Super,
        }
    }

    #[state]
    fn disconnecting(device_id: &Option<String>, event: &DeviceLinkEvent) -> Response<State> {
        let _ = device_id;
        match event {
            DeviceLinkEvent::DisconnectComplete => Transition(State::idle()),
            _ => Super,
        }
    }

    /// Bounded backoff wait before retrying a dropped streaming connection.
    #[state]
    #[allow(clippy::ptr_arg)]
    fn error(device_id: &String, attempt: &u32, event: &DeviceLinkEvent) -> Response<State> {
        match event {
            DeviceLinkEvent::BackoffElapsed => {
                Transition(State::connecting(device_id.clone()))
            }
            DeviceLinkEvent::ConnectFailed => {
                Transition(State::error(device_id.clone(), attempt + 1))
            }
            DeviceLinkEvent::ConnectSucceeded => Transition(State::connected(device_id.clone())),
            DeviceLinkEvent::ExplicitDisconnect => Transition(State::idle()),
            _ => Super,
        }
    }

    fn on_transition(&mut self, source: &State, target: &State) {
        tracing::info!(?source, ?target, "device link transition");
    }
}

/// Synchronous state machine plus its context, mirroring the teacher's
/// `ConnectionStateMachine` wrapper shape.
pub struct DeviceLinkStateMachine {
    machine: statig::blocking::InitializedStateMachine<DeviceLinkState>,
    context: DeviceLinkContext,
}

impl DeviceLinkStateMachine {
    pub fn new(adapter: Arc<dyn BleAdapter + Send + Sync>) -> Self {
        Self {
            machine: DeviceLinkState::default().uninitialized_state_machine().init(),
            context: DeviceLinkContext::new(adapter),
        }
    }

    pub fn handle(&mut self, event: DeviceLinkEvent) {
        tracing::debug!(?event, "device link event");
        self.machine.handle(&event);
    }

    pub fn state(&self) -> &State {
        self.machine.state()
    }

    pub fn context(&self) -> &DeviceLinkContext {
        &self.context
    }

    /// Project the current FSM state onto the `ConnectionStatus` domain type
    /// surfaced by `/device/status` and `device.*` bus events.
    pub fn connection_status(&self) -> ConnectionStatus {
        match self.machine.state() {
            State::Idle {} | State::Scanning {} | State::Disconnecting { .. } => {
                ConnectionStatus::Disconnected
            }
            State::Connecting { .. } => ConnectionStatus::Connecting,
            State::Connected { device_id } | State::Streaming { device_id } => {
                ConnectionStatus::Connected {
                    device_id: device_id.clone(),
                }
            }
            State::Error { attempt, .. } => ConnectionStatus::Reconnecting {
                attempt: *attempt,
                max_attempts: None,
            },
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Nominal inter-notification interval for a characteristic's sample rate,
/// used by the gap detector to recognize a stall (§4.1).
fn characteristic_nominal_interval(characteristic: Characteristic) -> Duration {
    let hz = match characteristic {
        Characteristic::Eeg => 250.0,
        Characteristic::Ppg => 50.0,
        Characteristic::Acc => 25.0,
        Characteristic::Battery => 1.0,
    };
    Duration::from_secs_f64(1.0 / hz)
}

/// Drives the device link: owns the BLE adapter, decodes notifications, and
/// runs the unbounded-retry reconnect loop described in §4.1.
pub struct DeviceLinkRunner {
    adapter: Arc<dyn BleAdapter + Send + Sync>,
    policy: ReconnectionPolicy,
    frame_malformed_count: Arc<AtomicU32>,
    /// Cancellation for the current connection session. One-shot per
    /// `CancellationToken` semantics, so `begin_session` swaps in a fresh
    /// token each time `Engine::connect` starts a new session — otherwise a
    /// token cancelled by an explicit disconnect would stay cancelled and
    /// silently disable every later reconnect attempt too.
    cancel: Mutex<CancellationToken>,
}

impl DeviceLinkRunner {
    pub fn new(adapter: Arc<dyn BleAdapter + Send + Sync>) -> Self {
        Self {
            adapter,
            policy: ReconnectionPolicy::default(),
            frame_malformed_count: Arc::new(AtomicU32::new(0)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of malformed packets dropped so far (`error.frame_malformed`).
    pub fn frame_malformed_count(&self) -> u32 {
        self.frame_malformed_count.load(Ordering::Relaxed)
    }

    /// Start a new connection session, discarding any prior cancellation.
    /// Must be called once per `Engine::connect`, before the first
    /// `connect_and_stream`, so a token cancelled by a past disconnect can't
    /// leak into this session.
    pub fn begin_session(&self) {
        *self.cancel.lock() = CancellationToken::new();
    }

    /// Cancel the current session's in-flight reconnect loop, e.g. on
    /// explicit disconnect or server shutdown.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether the current session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_cancelled()
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Connect, enable notifications, and forward decoded samples to
    /// `raw_tx` until the link drops or `disconnect()` is called.
    ///
    /// Spawns the decode loop and returns immediately; samples arrive on
    /// `raw_tx` from a background task. `link_lost_tx`, if given, receives a
    /// single notification when the notification stream ends, so a
    /// supervisor can fire `LinkLost` and schedule a reconnect. Publishes
    /// `stream.stalled`/`stream.resumed` on `bus`, per characteristic, when a
    /// notification gap exceeds 3x that characteristic's nominal
    /// inter-sample interval (§4.1) — this never tears down the link itself.
    pub async fn connect_and_stream(
        &self,
        device_id: &str,
        raw_tx: mpsc::Sender<RawSample>,
        link_lost_tx: Option<mpsc::Sender<()>>,
        bus: EventBus,
    ) -> Result<()> {
        self.adapter.connect(device_id).await?;
        let mut notifications = self.adapter.subscribe_notifications().await?;

        let malformed = Arc::clone(&self.frame_malformed_count);
        tokio::spawn(async move {
            let mut last_arrival: HashMap<Characteristic, Instant> = HashMap::new();
            let mut stalled: HashMap<Characteristic, bool> = HashMap::new();

            while let Some(notification) = notifications.recv().await {
                let characteristic = notification.characteristic;
                let now = Instant::now();
                if let Some(last) = last_arrival.insert(characteristic, now) {
                    let gap = now.duration_since(last);
                    let nominal = characteristic_nominal_interval(characteristic);
                    let is_stalled = gap > nominal * 3;
                    let was_stalled = stalled.insert(characteristic, is_stalled).unwrap_or(false);
                    if is_stalled && !was_stalled {
                        bus.publish(BusMessage::event(
                            "stream.stalled",
                            serde_json::json!({
                                "characteristic": format!("{characteristic:?}"),
                                "gap_ms": gap.as_millis(),
                            }),
                        ));
                    } else if was_stalled && !is_stalled {
                        bus.publish(BusMessage::event(
                            "stream.resumed",
                            serde_json::json!({ "characteristic": format!("{characteristic:?}") }),
                        ));
                    }
                }

                match frame::parse_notification(&notification, now_ms()) {
                    Ok(samples) => {
                        for sample in samples {
                            if raw_tx.send(sample).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        malformed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "dropped malformed frame");
                    }
                }
            }
            if let Some(tx) = link_lost_tx {
                let _ = tx.send(()).await;
            }
        });

        Ok(())
    }

    /// Disconnect from the adapter and cancel any pending reconnect loop.
    pub async fn disconnect(&self) -> Result<()> {
        self.cancel();
        self.adapter.disconnect().await
    }

    /// Unbounded exponential-backoff reconnect loop, per §4.1: `1, 2, 4, 8,
    /// 16 s, cap 30 s`. Runs until `connect_and_stream` succeeds or `cancel`
    /// is requested.
    pub async fn run_reconnect_loop(
        &self,
        device_id: &str,
        raw_tx: mpsc::Sender<RawSample>,
        link_lost_tx: Option<mpsc::Sender<()>>,
        bus: EventBus,
    ) {
        let mut attempt: u32 = 1;
        loop {
            let cancel = self.cancel_token();
            if cancel.is_cancelled() {
                return;
            }
            let delay = self.policy.calculate_delay(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }

            match self
                .connect_and_stream(device_id, raw_tx.clone(), link_lost_tx.clone(), bus.clone())
                .await
            {
                Ok(()) => {
                    tracing::info!(attempt, "reconnected after link loss");
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::DiscoveredDevice;
    use crate::ports::ble_adapter::RawNotification;
    use async_trait::async_trait;

    struct StubAdapter;

    #[async_trait]
    impl BleAdapter for StubAdapter {
        async fn start_scan(&self) -> Result<()> {
            Ok(())
        }
        async fn stop_scan(&self) -> Result<()> {
            Ok(())
        }
        async fn get_discovered_devices(&self) -> Vec<DiscoveredDevice> {
            vec![]
        }
        async fn connect(&self, _device_id: &str) -> Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
        async fn subscribe_notifications(&self) -> Result<mpsc::Receiver<RawNotification>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn read_battery(&self) -> Result<Option<u8>> {
            Ok(Some(90))
        }
    }

    #[test]
    fn idle_to_streaming_happy_path() {
        let adapter = Arc::new(StubAdapter);
        let mut machine = DeviceLinkStateMachine::new(adapter);

        machine.handle(DeviceLinkEvent::Connect {
            device_id: "dev-1".to_string(),
        });
        machine.handle(DeviceLinkEvent::ConnectSucceeded);
        machine.handle(DeviceLinkEvent::NotificationsEnabled);

        match machine.state() {
            State::Streaming { device_id } => assert_eq!(device_id, "dev-1"),
            other => panic!("expected Streaming, got {other:?}"),
        }
    }

    #[test]
    fn link_loss_while_streaming_enters_error_backoff() {
        let adapter = Arc::new(StubAdapter);
        let mut machine = DeviceLinkStateMachine::new(adapter);

        machine.handle(DeviceLinkEvent::Connect {
            device_id: "dev-1".to_string(),
        });
        machine.handle(DeviceLinkEvent::ConnectSucceeded);
        machine.handle(DeviceLinkEvent::NotificationsEnabled);
        machine.handle(DeviceLinkEvent::LinkLost);

        match machine.state() {
            State::Error { device_id, attempt } => {
                assert_eq!(device_id, "dev-1");
                assert_eq!(*attempt, 1);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn backoff_elapsed_retries_connecting() {
        let adapter = Arc::new(StubAdapter);
        let mut machine = DeviceLinkStateMachine::new(adapter);

        machine.handle(DeviceLinkEvent::Connect {
            device_id: "dev-1".to_string(),
        });
        machine.handle(DeviceLinkEvent::ConnectSucceeded);
        machine.handle(DeviceLinkEvent::NotificationsEnabled);
        machine.handle(DeviceLinkEvent::LinkLost);
        machine.handle(DeviceLinkEvent::BackoffElapsed);

        assert!(matches!(machine.state(), State::Connecting { .. }));
    }

    #[test]
    fn connect_timeout_returns_to_idle() {
        let adapter = Arc::new(StubAdapter);
        let mut machine = DeviceLinkStateMachine::new(adapter);

        machine.handle(DeviceLinkEvent::Connect {
            device_id: "dev-1".to_string(),
        });
        machine.handle(DeviceLinkEvent::ConnectFailed);

        assert!(matches!(machine.state(), State::Idle {}));
    }

    #[test]
    fn explicit_disconnect_from_streaming_reaches_idle() {
        let adapter = Arc::new(StubAdapter);
        let mut machine = DeviceLinkStateMachine::new(adapter);

        machine.handle(DeviceLinkEvent::Connect {
            device_id: "dev-1".to_string(),
        });
        machine.handle(DeviceLinkEvent::ConnectSucceeded);
        machine.handle(DeviceLinkEvent::NotificationsEnabled);
        machine.handle(DeviceLinkEvent::ExplicitDisconnect);
        machine.handle(DeviceLinkEvent::DisconnectComplete);

        assert!(matches!(machine.state(), State::Idle {}));
    }

    #[tokio::test]
    async fn connect_and_stream_forwards_decoded_samples() {
        let adapter = Arc::new(StubAdapter);
        let runner = DeviceLinkRunner::new(adapter);
        let (tx, _rx) = mpsc::channel(8);
        assert!(runner
            .connect_and_stream("dev-1", tx, None, EventBus::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn begin_session_clears_a_prior_cancellation() {
        let adapter = Arc::new(StubAdapter);
        let runner = DeviceLinkRunner::new(adapter);
        runner.cancel();
        assert!(runner.is_cancelled());
        runner.begin_session();
        assert!(!runner.is_cancelled());
    }
}
