//! Accelerometer processing pipeline (§4.3): magnitude and activity state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusMessage, EventBus};
use crate::domain::acc::{classify_activity, magnitude, window_stats};
use crate::domain::sample::{AccProcessed, ProcessedFrame, RawSample};
use crate::state::RecorderRunner;

const WINDOW_SECS: f64 = 4.0;
const SAMPLE_RATE_HZ: f64 = 25.0;
const WINDOW_SAMPLES: usize = (WINDOW_SECS as usize) * SAMPLE_RATE_HZ as usize; // 4 s sliding window
const HOP_SAMPLES: usize = SAMPLE_RATE_HZ as usize; // 1 s hop

/// Drive the ACC pipeline until `rx` closes or `cancel` fires.
///
/// Maintains a 4 s sliding window, hop 1 s, and emits nothing until the
/// first window has fully accumulated (§3).
pub async fn run(
    mut rx: mpsc::Receiver<RawSample>,
    bus: EventBus,
    recorder: Arc<RecorderRunner>,
    cancel: CancellationToken,
) {
    let mut magnitudes: VecDeque<f64> = VecDeque::with_capacity(WINDOW_SAMPLES);
    let mut samples_since_hop = 0usize;
    let mut t_host_latest = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            sample = rx.recv() => {
                let Some(RawSample::Acc(s)) = sample else { break };
                magnitudes.push_back(magnitude(s.x, s.y, s.z));
                if magnitudes.len() > WINDOW_SAMPLES {
                    magnitudes.pop_front();
                }
                t_host_latest = s.t_host;
                samples_since_hop += 1;

                if magnitudes.len() < WINDOW_SAMPLES {
                    continue;
                }
                if samples_since_hop < HOP_SAMPLES {
                    continue;
                }
                samples_since_hop = 0;

                let start = Instant::now();
                let frame = compute_window(&magnitudes, t_host_latest);
                if start.elapsed() > Duration::from_secs(1) {
                    bus.publish(BusMessage::event(
                        "processing.slow",
                        serde_json::json!({ "sensor_type": "acc" }),
                    ));
                    continue;
                }

                bus.publish(BusMessage::processed(ProcessedFrame::Acc(frame)));
                let _ = recorder.write_processed(&ProcessedFrame::Acc(frame)).await;
            }
        }
    }
}

fn compute_window(magnitudes: &VecDeque<f64>, t_host: u64) -> AccProcessed {
    let window: Vec<f64> = magnitudes.iter().copied().collect();
    let (avg, std, max) = window_stats(&window);
    AccProcessed {
        t_host,
        avg_movement: avg,
        std_movement: std,
        max_movement: max,
        activity_state: classify_activity(avg),
    }
}
