//! Sample Router (C2): fan-out from the device link to the pipelines, the
//! recorder, and the bus (§4.2).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::bus::{BusMessage, EventBus};
use crate::domain::sample::{RawSample, SensorKind};
use crate::state::RecorderRunner;

const RECORDER_TIMEOUT: Duration = Duration::from_millis(100);
/// Smoothing time constant for the per-sensor rate EWMA.
const RATE_TAU_SECS: f64 = 1.0;

/// Exponentially-weighted moving rate estimate, updated on every arrival.
struct RateCounter {
    hz: f64,
    last_arrival: Option<Instant>,
}

impl RateCounter {
    fn new() -> Self {
        Self {
            hz: 0.0,
            last_arrival: None,
        }
    }

    fn record(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_arrival {
            let dt = now.duration_since(last).as_secs_f64().max(1e-6);
            let instantaneous = 1.0 / dt;
            let alpha = (dt / RATE_TAU_SECS).min(1.0);
            self.hz += alpha * (instantaneous - self.hz);
        }
        self.last_arrival = Some(now);
    }
}

/// Per-sensor drop counters surfaced by Monitoring (C8).
#[derive(Default)]
struct DropCounters {
    pipeline_full: AtomicU64,
    recorder_timeout: AtomicU64,
}

/// Snapshot of router health for one sensor kind, read by Monitoring (C8).
#[derive(Debug, Clone, Copy)]
pub struct SensorRouterStats {
    pub rate_hz: f64,
    pub pipeline_drops: u64,
    pub recorder_drops: u64,
}

/// Fans out raw samples from the device link to pipeline queues, the
/// recorder, and the event bus.
pub struct SampleRouter {
    pipeline_txs: HashMap<SensorKind, mpsc::Sender<RawSample>>,
    recorder: Arc<RecorderRunner>,
    bus: EventBus,
    rates: Mutex<HashMap<SensorKind, RateCounter>>,
    drops: HashMap<SensorKind, DropCounters>,
}

impl SampleRouter {
    pub fn new(
        pipeline_txs: HashMap<SensorKind, mpsc::Sender<RawSample>>,
        recorder: Arc<RecorderRunner>,
        bus: EventBus,
    ) -> Self {
        let mut rates = HashMap::new();
        let mut drops = HashMap::new();
        for kind in [SensorKind::Eeg, SensorKind::Ppg, SensorKind::Acc, SensorKind::Bat] {
            rates.insert(kind, RateCounter::new());
            drops.insert(kind, DropCounters::default());
        }
        Self {
            pipeline_txs,
            recorder,
            bus,
            rates: Mutex::new(rates),
            drops,
        }
    }

    /// Route one decoded sample: publish to the bus, fan into its pipeline
    /// queue (drop-oldest on overflow), and into the recorder (block up to
    /// 100 ms, then drop).
    pub async fn route(&self, sample: RawSample) {
        let kind = sample.kind();

        if let Some(counter) = self.rates.lock().get_mut(&kind) {
            counter.record();
        }

        self.bus.publish(BusMessage::raw(kind, vec![sample.clone()]));

        if let Some(tx) = self.pipeline_txs.get(&kind) {
            if let Err(mpsc::error::TrySendError::Full(msg)) = tx.try_send(sample.clone()) {
                let _ = tx.try_recv();
                let _ = tx.try_send(msg);
                if let Some(counters) = self.drops.get(&kind) {
                    counters.pipeline_full.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        match tokio::time::timeout(RECORDER_TIMEOUT, self.recorder.write_raw(&sample)).await {
            Ok(Ok(())) | Ok(Err(crate::error::AppError::RecordingNotActive)) => {}
            _ => {
                if let Some(counters) = self.drops.get(&kind) {
                    counters.recorder_timeout.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Current rate/drop snapshot for every sensor kind, for Monitoring (C8).
    pub fn stats(&self) -> HashMap<SensorKind, SensorRouterStats> {
        let rates = self.rates.lock();
        [SensorKind::Eeg, SensorKind::Ppg, SensorKind::Acc, SensorKind::Bat]
            .into_iter()
            .map(|kind| {
                let rate_hz = rates.get(&kind).map(|c| c.hz).unwrap_or(0.0);
                let (pipeline_drops, recorder_drops) = match self.drops.get(&kind) {
                    Some(c) => (
                        c.pipeline_full.load(Ordering::Relaxed),
                        c.recorder_timeout.load(Ordering::Relaxed),
                    ),
                    None => (0, 0),
                };
                (
                    kind,
                    SensorRouterStats {
                        rate_hz,
                        pipeline_drops,
                        recorder_drops,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FileSessionRepository;
    use crate::domain::sample::BatterySample;

    async fn test_router() -> (SampleRouter, mpsc::Receiver<RawSample>) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(FileSessionRepository::new(dir.path().to_path_buf()).await.unwrap());
        let recorder = Arc::new(RecorderRunner::new(dir.path().to_path_buf(), repo));
        let bus = EventBus::new();
        let (tx, rx) = mpsc::channel(4);
        let mut txs = HashMap::new();
        txs.insert(SensorKind::Bat, tx);
        (SampleRouter::new(txs, recorder, bus), rx)
    }

    #[tokio::test]
    async fn routes_sample_into_pipeline_queue() {
        let (router, mut rx) = test_router().await;
        router
            .route(RawSample::Bat(BatterySample {
                t_host: 1,
                level_percent: 80,
                voltage: None,
                charging: None,
            }))
            .await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stats_tracks_rate_after_first_sample() {
        let (router, _rx) = test_router().await;
        router
            .route(RawSample::Bat(BatterySample {
                t_host: 1,
                level_percent: 80,
                voltage: None,
                charging: None,
            }))
            .await;
        let stats = router.stats();
        assert!(stats.contains_key(&SensorKind::Bat));
    }
}
