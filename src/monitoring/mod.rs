//! Monitoring (C8): a 1 Hz sampler deriving `system_health` and alerts from
//! the rest of the engine's snapshot functions (§4.8, §9's "Monitoring reads
//! C2/C5 state by snapshot, never by holding references to internal queues").

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusMessage, EventBus};
use crate::domain::sample::SensorKind;
use crate::engine::Engine;
use crate::ports::metrics_source::OsMetrics;
use crate::ports::MetricsSource;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const MAX_ALERTS: usize = 50;
const CPU_ALERT_THRESHOLD: f32 = 85.0;
const MEMORY_ALERT_THRESHOLD: f64 = 85.0;
const RATE_ALERT_FRACTION: f64 = 0.5;
const LAG_DROP_RATE_THRESHOLD: f64 = 1.0;
const CPU_ALERT_SUSTAIN: Duration = Duration::from_secs(10);
const RATE_ALERT_SUSTAIN: Duration = Duration::from_secs(5);
/// §8: a sensor rate below 50% of nominal for >=3s publishes `stream.stalled`;
/// recovering above that fraction for >=3s publishes `stream.resumed`.
const STREAM_STALL_SUSTAIN: Duration = Duration::from_secs(3);

/// One alert entry in the bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub code: String,
    pub message: String,
    pub timestamp: u64,
}

/// A single monitoring sample, published as `monitoring_metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringSnapshot {
    pub system_health: f64,
    pub system: SystemSnapshot,
    pub streaming: StreamingSnapshot,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub disk_free_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamingSnapshot {
    pub is_active: bool,
    pub sensor_rates_hz: Vec<(SensorKind, f64)>,
    pub client_count: usize,
    pub lag_drops: u64,
    pub recorder_state: &'static str,
}

/// Per-sensor `stream.stalled`/`stream.resumed` edge-tracking state (§8).
struct StreamStallState {
    stalled: bool,
    stall_tracker: SustainTracker,
    resume_tracker: SustainTracker,
}

impl StreamStallState {
    fn new() -> Self {
        Self {
            stalled: false,
            stall_tracker: SustainTracker::new(),
            resume_tracker: SustainTracker::new(),
        }
    }
}

struct SustainTracker {
    since: Option<Instant>,
}

impl SustainTracker {
    fn new() -> Self {
        Self { since: None }
    }

    /// Returns true the instant `condition` has held continuously for `min_duration`.
    fn update(&mut self, condition: bool, min_duration: Duration) -> bool {
        if !condition {
            self.since = None;
            return false;
        }
        let now = Instant::now();
        let since = *self.since.get_or_insert(now);
        now.duration_since(since) >= min_duration && now.duration_since(since) < min_duration + SAMPLE_INTERVAL
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Runs the 1 Hz monitoring sampler until `cancel` fires.
pub struct MonitoringTask {
    engine: Arc<Engine>,
    bus: EventBus,
    metrics: AsyncMutex<Box<dyn MetricsSource + Send>>,
    alerts: AsyncMutex<VecDeque<Alert>>,
    client_count: Arc<std::sync::atomic::AtomicUsize>,
    latest: AsyncMutex<Option<MonitoringSnapshot>>,
}

impl MonitoringTask {
    pub fn new(
        engine: Arc<Engine>,
        bus: EventBus,
        metrics: Box<dyn MetricsSource + Send>,
        client_count: Arc<std::sync::atomic::AtomicUsize>,
    ) -> Self {
        Self {
            engine,
            bus,
            metrics: AsyncMutex::new(metrics),
            alerts: AsyncMutex::new(VecDeque::new()),
            client_count,
            latest: AsyncMutex::new(None),
        }
    }

    /// The most recently computed snapshot, for `GET /metrics/` to reuse
    /// without sampling the OS a second time.
    pub async fn latest(&self) -> Option<MonitoringSnapshot> {
        self.latest.lock().await.clone()
    }

    /// Drive the sampler loop; returns once `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut cpu_sustain = SustainTracker::new();
        let mut rate_sustain: std::collections::HashMap<SensorKind, SustainTracker> =
            std::collections::HashMap::new();
        let mut stall_state: std::collections::HashMap<SensorKind, StreamStallState> =
            std::collections::HashMap::new();
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    self.sample_once(&mut cpu_sustain, &mut rate_sustain, &mut stall_state).await;
                }
            }
        }
    }

    async fn sample_once(
        &self,
        cpu_sustain: &mut SustainTracker,
        rate_sustain: &mut std::collections::HashMap<SensorKind, SustainTracker>,
        stall_state: &mut std::collections::HashMap<SensorKind, StreamStallState>,
    ) {
        let os: OsMetrics = self.metrics.lock().await.sample();
        let router_stats = self.engine.pipelines.router.stats();
        let lag_drops = self.engine.bus.lag_drops();
        let recorder_state = self.engine.recorder.status_label().await;
        let is_streaming = self.engine.is_streaming();

        let mut new_alerts = Vec::new();

        if cpu_sustain.update(os.cpu_usage_percent > CPU_ALERT_THRESHOLD, CPU_ALERT_SUSTAIN) {
            new_alerts.push(("alert.cpu_high".to_string(), format!(
                "CPU usage {:.1}% exceeded {CPU_ALERT_THRESHOLD}% for {CPU_ALERT_SUSTAIN:?}",
                os.cpu_usage_percent
            )));
        }
        let memory_percent = if os.memory_total_mb > 0.0 {
            100.0 * os.memory_used_mb / os.memory_total_mb
        } else {
            0.0
        };
        if memory_percent > MEMORY_ALERT_THRESHOLD {
            new_alerts.push(("alert.memory_high".to_string(), format!(
                "memory usage {memory_percent:.1}% exceeded {MEMORY_ALERT_THRESHOLD}%"
            )));
        }

        let mut active_count = 0usize;
        let mut healthy_count = 0usize;
        for (kind, stats) in &router_stats {
            if *kind == SensorKind::Bat {
                continue;
            }
            active_count += 1;
            let nominal = kind.nominal_rate_hz();
            let ok = stats.rate_hz >= nominal * RATE_ALERT_FRACTION;
            if ok {
                healthy_count += 1;
            }
            let tracker = rate_sustain.entry(*kind).or_insert_with(SustainTracker::new);
            if tracker.update(!ok, RATE_ALERT_SUSTAIN) {
                new_alerts.push((
                    "alert.sensor_rate_low".to_string(),
                    format!("{} rate {:.1} Hz below 50% of nominal for 5s", kind.as_str(), stats.rate_hz),
                ));
            }

            let stall = stall_state.entry(*kind).or_insert_with(StreamStallState::new);
            if stall.stall_tracker.update(!ok, STREAM_STALL_SUSTAIN) {
                stall.stalled = true;
                self.bus.publish(BusMessage::event(
                    "stream.stalled",
                    serde_json::json!({ "sensor_type": kind.as_str(), "rate_hz": stats.rate_hz }),
                ));
            }
            if stall
                .resume_tracker
                .update(ok && stall.stalled, STREAM_STALL_SUSTAIN)
            {
                stall.stalled = false;
                self.bus.publish(BusMessage::event(
                    "stream.resumed",
                    serde_json::json!({ "sensor_type": kind.as_str(), "rate_hz": stats.rate_hz }),
                ));
            }
        }

        if lag_drops as f64 > LAG_DROP_RATE_THRESHOLD {
            new_alerts.push((
                "alert.client_lag".to_string(),
                format!("lag-drop rate exceeded {LAG_DROP_RATE_THRESHOLD}/s"),
            ));
        }

        let streaming_score = if is_streaming { 40.0 } else { 0.0 };
        let signal_score = if active_count == 0 {
            20.0
        } else {
            20.0 * healthy_count as f64 / active_count as f64
        };
        let cpu_headroom = 15.0 * (1.0 - (os.cpu_usage_percent as f64 / 100.0).min(1.0));
        let memory_headroom = 15.0 * (1.0 - (memory_percent / 100.0).min(1.0));
        let connection_stability = if is_streaming { 10.0 } else { 0.0 };
        let system_health =
            (streaming_score + signal_score + cpu_headroom + memory_headroom + connection_stability)
                .clamp(0.0, 100.0);

        if !new_alerts.is_empty() {
            let mut alerts = self.alerts.lock().await;
            for (code, message) in new_alerts {
                self.bus.publish(BusMessage::event(
                    code.clone(),
                    serde_json::json!({ "message": message }),
                ));
                alerts.push_back(Alert {
                    code,
                    message,
                    timestamp: now_ms(),
                });
                while alerts.len() > MAX_ALERTS {
                    alerts.pop_front();
                }
            }
        }

        let snapshot = MonitoringSnapshot {
            system_health,
            system: SystemSnapshot {
                cpu_usage_percent: os.cpu_usage_percent,
                memory_used_mb: os.memory_used_mb,
                memory_total_mb: os.memory_total_mb,
                disk_free_mb: os.disk_free_mb,
            },
            streaming: StreamingSnapshot {
                is_active: is_streaming,
                sensor_rates_hz: router_stats.iter().map(|(k, s)| (*k, s.rate_hz)).collect(),
                client_count: self.client_count.load(std::sync::atomic::Ordering::Relaxed),
                lag_drops,
                recorder_state,
            },
            alerts: self.alerts.lock().await.iter().cloned().collect(),
        };

        self.bus.publish(BusMessage::monitoring(
            serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null),
        ));
        *self.latest.lock().await = Some(snapshot);
    }
}
