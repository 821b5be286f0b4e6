//! PPG processing pipeline (§4.3): filter, peak detection, HRV metrics.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusMessage, EventBus};
use crate::domain::ppg::{
    detect_rr_intervals_ms, frequency_domain_hrv, median_bpm, ppg_sqi, time_domain_hrv,
    window_is_sufficient, PpgFilter,
};
use crate::domain::sample::{PpgProcessed, ProcessedFrame, RawSample};
use crate::state::RecorderRunner;

const WINDOW_SECS: f64 = 60.0;
const SAMPLE_RATE_HZ: f64 = 50.0;
const WINDOW_SAMPLES: usize = (WINDOW_SECS as usize) * SAMPLE_RATE_HZ as usize; // 60 s sliding window
const HOP_SAMPLES: usize = SAMPLE_RATE_HZ as usize; // 1 s hop
const HRV_WINDOW_SECS: f64 = 60.0;
const HRV_RR_CAP: usize = (HRV_WINDOW_SECS as usize) * 10; // generous bound on buffered beats

/// Drive the PPG pipeline until `rx` closes or `cancel` fires.
///
/// Filters incoming samples continuously into a 60 s sliding window, hop
/// 1 s (§3), and emits one [`ProcessedFrame::Ppg`] per hop once the first
/// window has fully accumulated. RR intervals are detected incrementally
/// from each 1 s hop (not re-detected across the whole sliding window, to
/// avoid double-counting beats) and accumulated into a rolling 60 s HRV
/// history. BPM/HRV fields stay null until that history has at least 60 s
/// and 20 beats.
pub async fn run(
    mut rx: mpsc::Receiver<RawSample>,
    bus: EventBus,
    recorder: Arc<RecorderRunner>,
    cancel: CancellationToken,
) {
    let mut filter = PpgFilter::new();
    let mut window: VecDeque<f32> = VecDeque::with_capacity(WINDOW_SAMPLES);
    let mut hop_buffer: Vec<f32> = Vec::with_capacity(HOP_SAMPLES);
    let mut rr_history: VecDeque<f64> = VecDeque::new();
    let mut rr_history_secs = 0.0_f64;
    let mut samples_since_hop = 0usize;
    let mut t_host_latest = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            sample = rx.recv() => {
                let Some(RawSample::Ppg(s)) = sample else { break };
                let value = filter.process(s.red - s.ir);
                window.push_back(value);
                if window.len() > WINDOW_SAMPLES {
                    window.pop_front();
                }
                hop_buffer.push(value);
                t_host_latest = s.t_host;
                samples_since_hop += 1;

                if window.len() < WINDOW_SAMPLES {
                    continue;
                }
                if samples_since_hop < HOP_SAMPLES {
                    continue;
                }
                samples_since_hop = 0;

                let start = Instant::now();
                let filtered_snapshot: Vec<f32> = window.iter().copied().collect();
                let frame = compute_window(
                    filtered_snapshot,
                    &mut hop_buffer,
                    &mut rr_history,
                    &mut rr_history_secs,
                    t_host_latest,
                );
                if start.elapsed() > Duration::from_secs(1) {
                    bus.publish(BusMessage::event(
                        "processing.slow",
                        serde_json::json!({ "sensor_type": "ppg" }),
                    ));
                    continue;
                }

                bus.publish(BusMessage::processed(ProcessedFrame::Ppg(frame.clone())));
                let _ = recorder.write_processed(&ProcessedFrame::Ppg(frame)).await;
            }
        }
    }
}

fn compute_window(
    filtered_snapshot: Vec<f32>,
    hop_buffer: &mut Vec<f32>,
    rr_history: &mut VecDeque<f64>,
    rr_history_secs: &mut f64,
    t_host: u64,
) -> PpgProcessed {
    let sqi = ppg_sqi(&filtered_snapshot);

    let new_rr = detect_rr_intervals_ms(hop_buffer, SAMPLE_RATE_HZ);
    hop_buffer.clear();
    for rr in &new_rr {
        rr_history.push_back(*rr);
        *rr_history_secs += rr / 1000.0;
    }
    while *rr_history_secs > HRV_WINDOW_SECS && rr_history.len() > 1 {
        if let Some(oldest) = rr_history.pop_front() {
            *rr_history_secs -= oldest / 1000.0;
        }
    }
    while rr_history.len() > HRV_RR_CAP {
        rr_history.pop_front();
    }

    let rr_slice: Vec<f64> = rr_history.iter().copied().collect();
    let beat_count = rr_slice.len() + if rr_slice.is_empty() { 0 } else { 1 };
    let sufficient = window_is_sufficient(*rr_history_secs, beat_count);

    let bpm = sufficient.then(|| median_bpm(&rr_slice)).flatten();
    let time_hrv = sufficient.then(|| time_domain_hrv(&rr_slice)).flatten();
    let freq_hrv = sufficient.then(|| frequency_domain_hrv(&rr_slice)).flatten();

    PpgProcessed {
        t_host,
        filtered_ppg: filtered_snapshot,
        ppg_sqi: sqi,
        bpm,
        sdnn: time_hrv.map(|h| h.sdnn),
        rmssd: time_hrv.map(|h| h.rmssd),
        pnn50: time_hrv.map(|h| h.pnn50),
        sdsd: time_hrv.map(|h| h.sdsd),
        lf: freq_hrv.map(|(lf, _, _)| lf),
        hf: freq_hrv.map(|(_, hf, _)| hf),
        lf_hf_ratio: freq_hrv.map(|(_, _, ratio)| ratio),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_window_emits_null_bpm_and_hrv() {
        let filtered_snapshot = vec![0.0; WINDOW_SAMPLES];
        let mut hop_buffer = vec![0.0; HOP_SAMPLES];
        let mut rr_history = VecDeque::new();
        let mut rr_history_secs = 0.0;
        let frame = compute_window(
            filtered_snapshot,
            &mut hop_buffer,
            &mut rr_history,
            &mut rr_history_secs,
            1000,
        );
        assert!(frame.bpm.is_none());
        assert!(frame.sdnn.is_none());
        assert!(frame.lf_hf_ratio.is_none());
    }
}
