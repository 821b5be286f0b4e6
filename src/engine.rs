//! Engine (C0): the single root that owns every component and wires them
//! together, per §9's "shared global state → a single Engine context".
//!
//! No task holds a process-global singleton; every handle here is either
//! owned directly by `Engine` or injected into the task that needs it.
//! Shutdown unwinds in the reverse dependency order from §9: HTTP → Broker
//! → Monitoring → Recorder → Pipelines → Router → Device Link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusMessage, EventBus};
use crate::config::ServerConfig;
use crate::domain::device::{Device, DiscoveredDevice};
use crate::domain::reconnection::ConnectionStatus;
use crate::domain::sample::RawSample;
use crate::error::{AppError, AppResult};
use crate::pipeline::PipelineSet;
use crate::ports::{BleAdapter, DeviceCatalogue};
use crate::state::{DeviceLinkEvent, DeviceLinkRunner, DeviceLinkStateMachine, RecorderRunner};

const SCAN_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECORDER_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Owns every long-lived component and exposes the operations the HTTP and
/// WebSocket layers dispatch into.
pub struct Engine {
    pub config: ServerConfig,
    pub bus: EventBus,
    pub device_catalogue: Arc<dyn DeviceCatalogue>,
    pub recorder: Arc<RecorderRunner>,
    pub pipelines: PipelineSet,
    link: Mutex<DeviceLinkStateMachine>,
    runner: Arc<DeviceLinkRunner>,
    raw_tx: mpsc::Sender<RawSample>,
    streaming: AtomicBool,
    started_at: Instant,
    cancel: CancellationToken,
}

impl Engine {
    /// Wire up every component and spawn the router-forwarding task. Does
    /// not start listening; `http`/`ws` bind separately against this handle.
    pub fn new(
        config: ServerConfig,
        adapter: Arc<dyn BleAdapter + Send + Sync>,
        device_catalogue: Arc<dyn DeviceCatalogue>,
        recorder: Arc<RecorderRunner>,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let bus = EventBus::new();
        let pipelines = PipelineSet::spawn(bus.clone(), recorder.clone(), cancel.clone());
        let runner = Arc::new(DeviceLinkRunner::new(adapter.clone()));
        let link = Mutex::new(DeviceLinkStateMachine::new(adapter));

        let (raw_tx, mut raw_rx) = mpsc::channel::<RawSample>(512);
        let router = pipelines.router.clone();
        let forward_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forward_cancel.cancelled() => break,
                    sample = raw_rx.recv() => {
                        let Some(sample) = sample else { break };
                        router.route(sample).await;
                    }
                }
            }
        });

        Arc::new(Self {
            config,
            bus,
            device_catalogue,
            recorder,
            pipelines,
            link,
            runner,
            raw_tx,
            streaming: AtomicBool::new(false),
            started_at: Instant::now(),
            cancel,
        })
    }

    /// Seconds since the engine was constructed, for `/health`.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Current device link status, for `/device/status`.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.link.lock().connection_status()
    }

    /// Whether the link is in `Streaming`.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    /// Malformed-frame counter from the device link decode task.
    pub fn frame_malformed_count(&self) -> u32 {
        self.runner.frame_malformed_count()
    }

    /// The engine's top-level cancellation token, for tasks spawned outside
    /// `Engine::new` (Monitoring, HTTP/WS listeners) to observe shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn adapter_handle(&self) -> Arc<dyn BleAdapter + Send + Sync> {
        self.link.lock().context().adapter_handle()
    }

    /// Scan for `duration` (capped at [`SCAN_TIMEOUT`]), returning every
    /// device observed, each flagged with whether it is already registered.
    pub async fn scan(&self, duration: Duration) -> AppResult<Vec<DiscoveredDevice>> {
        let adapter = self.adapter_handle();
        self.link.lock().handle(DeviceLinkEvent::StartScan);
        adapter
            .start_scan()
            .await
            .map_err(|e| AppError::DeviceScanFailed(e.to_string()))?;

        tokio::time::sleep(duration.min(SCAN_TIMEOUT)).await;

        let _ = adapter.stop_scan().await;
        self.link.lock().handle(DeviceLinkEvent::ScanEnded);

        let registered = self
            .device_catalogue
            .list()
            .await
            .map_err(|e| AppError::StorageFailure(e.to_string()))?;
        let discovered = adapter.get_discovered_devices().await;
        Ok(discovered
            .into_iter()
            .map(|mut d| {
                d.is_registered = registered.iter().any(|r| r.id == d.id);
                d
            })
            .collect())
    }

    /// Register (or rename) a device in the catalogue.
    pub async fn register_device(&self, id: &str, name: &str) -> AppResult<()> {
        self.device_catalogue
            .register(id, name)
            .await
            .map_err(|e| AppError::StorageFailure(e.to_string()))
    }

    /// Every registered device.
    pub async fn list_devices(&self) -> AppResult<Vec<Device>> {
        self.device_catalogue
            .list()
            .await
            .map_err(|e| AppError::StorageFailure(e.to_string()))
    }

    /// Fire the transition + bus events for a freshly (re)established link.
    fn mark_connected(&self, device_id: &str, first_time: bool) {
        self.link.lock().handle(DeviceLinkEvent::ConnectSucceeded);
        self.link
            .lock()
            .handle(DeviceLinkEvent::NotificationsEnabled);
        self.streaming.store(true, Ordering::Relaxed);
        self.bus.publish(BusMessage::event(
            "device.connected",
            serde_json::json!({ "device_id": device_id }),
        ));
        self.bus
            .publish(BusMessage::event("stream.started", serde_json::json!({})));
        if !first_time {
            tracing::info!(device_id, "link restored after reconnect");
        }
    }

    /// Connect to `device_id`, enable notifications, and start routing
    /// samples. Spawns a background supervisor that fires `LinkLost` and
    /// runs the unbounded reconnect loop whenever the link subsequently
    /// drops, until `disconnect()`/`shutdown()` cancels it.
    pub async fn connect(self: &Arc<Self>, device_id: &str) -> AppResult<()> {
        self.link.lock().handle(DeviceLinkEvent::Connect {
            device_id: device_id.to_string(),
        });
        self.runner.begin_session();

        let (lost_tx, lost_rx) = mpsc::channel(1);
        let attempt = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.runner.connect_and_stream(
                device_id,
                self.raw_tx.clone(),
                Some(lost_tx),
                self.bus.clone(),
            ),
        )
        .await;

        match attempt {
            Ok(Ok(())) => {
                self.mark_connected(device_id, true);
                let engine = Arc::clone(self);
                let device_id = device_id.to_string();
                tokio::spawn(async move { engine.supervise_link(device_id, lost_rx).await });
                Ok(())
            }
            _ => {
                self.link.lock().handle(DeviceLinkEvent::ConnectFailed);
                Err(AppError::DeviceTimeout)
            }
        }
    }

    /// Waits for link-loss notifications and re-establishes the link after
    /// each one, until cancelled.
    ///
    /// Also bails out whenever the runner's current session has been
    /// cancelled — an explicit `disconnect()` cancels that session without
    /// touching `self.cancel` (which is reserved for full engine shutdown),
    /// so checking only `self.cancel` here would let a disconnect race with
    /// the link-loss wake-up and spuriously reconnect and re-publish
    /// `device.connected`/`stream.started` after the user asked to stop.
    async fn supervise_link(self: Arc<Self>, device_id: String, mut lost_rx: mpsc::Receiver<()>) {
        while lost_rx.recv().await.is_some() {
            if self.cancel.is_cancelled() || self.runner.is_cancelled() {
                return;
            }
            self.streaming.store(false, Ordering::Relaxed);
            self.link.lock().handle(DeviceLinkEvent::LinkLost);
            self.bus.publish(BusMessage::event(
                "device.disconnected",
                serde_json::json!({ "device_id": device_id }),
            ));
            if self.recorder.status_label().await == "recording" {
                let _ = self.recorder.abort_recording().await;
            }

            let (next_lost_tx, next_lost_rx) = mpsc::channel(1);
            self.runner
                .run_reconnect_loop(
                    &device_id,
                    self.raw_tx.clone(),
                    Some(next_lost_tx),
                    self.bus.clone(),
                )
                .await;
            if self.cancel.is_cancelled() || self.runner.is_cancelled() {
                return;
            }
            self.mark_connected(&device_id, false);
            lost_rx = next_lost_rx;
        }
    }

    /// Disconnect the active device and return the link to `Idle`.
    pub async fn disconnect(&self) -> AppResult<()> {
        self.link
            .lock()
            .handle(DeviceLinkEvent::ExplicitDisconnect);
        self.streaming.store(false, Ordering::Relaxed);
        if let Err(e) = self.runner.disconnect().await {
            tracing::warn!(error = %e, "adapter reported an error during disconnect");
        }
        self.link
            .lock()
            .handle(DeviceLinkEvent::DisconnectComplete);
        self.bus
            .publish(BusMessage::event("device.disconnected", serde_json::json!({})));
        Ok(())
    }

    /// Read the connected device's battery level.
    pub async fn battery(&self) -> AppResult<Option<u8>> {
        self.adapter_handle()
            .read_battery()
            .await
            .map_err(|_| AppError::DeviceNotConnected)
    }

    /// Cancel every owned task. Gives the recorder up to
    /// [`RECORDER_SHUTDOWN_GRACE`] to finish `Closing` before forcing an
    /// abort, per §5.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.runner.cancel();

        if self.recorder.status_label().await != "idle" {
            let recorder = self.recorder.clone();
            let finished = tokio::time::timeout(RECORDER_SHUTDOWN_GRACE, async move {
                let _ = recorder.stop_recording().await;
            })
            .await;
            if finished.is_err() {
                let _ = self.recorder.abort_recording().await;
            }
        }
    }
}
