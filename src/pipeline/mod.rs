//! Sample Router (C2) and per-sensor processing pipelines (C3).

pub mod acc;
pub mod eeg;
pub mod ppg;
pub mod router;

pub use router::{SampleRouter, SensorRouterStats};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::domain::sample::SensorKind;
use crate::state::RecorderRunner;

/// Queue depth for one sensor's pipeline input: roughly 1 s of samples at
/// its nominal rate (§4.2).
fn queue_depth(kind: SensorKind) -> usize {
    (kind.nominal_rate_hz().ceil() as usize).max(1)
}

/// The router plus the three running pipeline tasks it feeds.
pub struct PipelineSet {
    pub router: Arc<SampleRouter>,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineSet {
    /// Build the EEG/PPG/ACC pipeline channels, spawn their tasks, and wire
    /// the router that feeds them (battery has no pipeline: it only flows
    /// raw → bus/recorder).
    pub fn spawn(bus: EventBus, recorder: Arc<RecorderRunner>, cancel: CancellationToken) -> Self {
        let mut pipeline_txs = HashMap::new();
        let mut tasks = Vec::new();

        let (eeg_tx, eeg_rx) = mpsc::channel(queue_depth(SensorKind::Eeg));
        pipeline_txs.insert(SensorKind::Eeg, eeg_tx);
        tasks.push(tokio::spawn(eeg::run(eeg_rx, bus.clone(), recorder.clone(), cancel.clone())));

        let (ppg_tx, ppg_rx) = mpsc::channel(queue_depth(SensorKind::Ppg));
        pipeline_txs.insert(SensorKind::Ppg, ppg_tx);
        tasks.push(tokio::spawn(ppg::run(ppg_rx, bus.clone(), recorder.clone(), cancel.clone())));

        let (acc_tx, acc_rx) = mpsc::channel(queue_depth(SensorKind::Acc));
        pipeline_txs.insert(SensorKind::Acc, acc_tx);
        tasks.push(tokio::spawn(acc::run(acc_rx, bus.clone(), recorder.clone(), cancel.clone())));

        let router = Arc::new(SampleRouter::new(pipeline_txs, recorder, bus));

        Self { router, tasks }
    }

    /// Await every pipeline task's shutdown, e.g. after the owning
    /// [`CancellationToken`] has been cancelled.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
