//! EEG processing pipeline (§4.3): filter, spectrum, derived indices.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusMessage, EventBus};
use crate::domain::eeg::{band_powers, derived_indices, hemispheric_balance, signal_quality_index, welch_psd, EegFilterChain};
use crate::domain::sample::{BandPowers, EegProcessed, ProcessedFrame, RawSample, SensorKind};
use crate::state::RecorderRunner;

const WINDOW_SECS: f64 = 10.0;
const SAMPLE_RATE_HZ: f64 = 250.0;
const WINDOW_SAMPLES: usize = (WINDOW_SECS as usize) * SAMPLE_RATE_HZ as usize; // 10 s sliding window
const HOP_SAMPLES: usize = SAMPLE_RATE_HZ as usize; // 1 s hop
const WELCH_SEGMENT_LEN: usize = 64;
const LEADOFF_THROTTLE: Duration = Duration::from_secs(5);

struct LeadoffThrottle {
    last_emit: Option<Instant>,
}

impl LeadoffThrottle {
    fn new() -> Self {
        Self { last_emit: None }
    }

    fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        let ready = match self.last_emit {
            Some(last) => now.duration_since(last) >= LEADOFF_THROTTLE,
            None => true,
        };
        if ready {
            self.last_emit = Some(now);
        }
        ready
    }
}

struct ChannelWindow {
    filter: EegFilterChain,
    filtered: VecDeque<f32>,
    leadoff: VecDeque<bool>,
    leadoff_throttle: LeadoffThrottle,
}

impl ChannelWindow {
    fn new() -> Self {
        Self {
            filter: EegFilterChain::new(),
            filtered: VecDeque::with_capacity(WINDOW_SAMPLES),
            leadoff: VecDeque::with_capacity(WINDOW_SAMPLES),
            leadoff_throttle: LeadoffThrottle::new(),
        }
    }

    /// Push one filtered sample, sliding the window once it's full.
    fn push(&mut self, raw: f32, leadoff: bool) {
        self.filtered.push_back(self.filter.process(raw));
        self.leadoff.push_back(leadoff);
        if self.filtered.len() > WINDOW_SAMPLES {
            self.filtered.pop_front();
            self.leadoff.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.filtered.len()
    }

    /// Snapshot the current window contents without consuming them — the
    /// window slides by hop, it isn't drained on emission.
    fn snapshot(&mut self) -> (Vec<f32>, Vec<bool>) {
        (
            self.filtered.make_contiguous().to_vec(),
            self.leadoff.make_contiguous().to_vec(),
        )
    }
}

/// Drive the EEG pipeline until `rx` closes or `cancel` fires.
///
/// Consumes raw samples into a 10 s sliding window per channel and publishes
/// one [`ProcessedFrame::Eeg`] per 1 s hop once the first window has filled
/// (§3: "a pipeline must emit nothing until it has accumulated a full first
/// window"). Best-effort: a window whose computation overruns its 1 s hop
/// budget is dropped with a `processing.slow` event instead of backing up
/// the queue.
pub async fn run(
    mut rx: mpsc::Receiver<RawSample>,
    bus: EventBus,
    recorder: Arc<RecorderRunner>,
    cancel: CancellationToken,
) {
    let mut ch1 = ChannelWindow::new();
    let mut ch2 = ChannelWindow::new();
    let mut samples_since_hop = 0usize;
    let mut t_host_latest = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            sample = rx.recv() => {
                let Some(RawSample::Eeg(s)) = sample else { break };
                ch1.push(s.ch1_raw, s.leadoff_ch1);
                ch2.push(s.ch2_raw, s.leadoff_ch2);
                t_host_latest = s.t_host;
                samples_since_hop += 1;

                if ch1.len() < WINDOW_SAMPLES {
                    continue;
                }
                if samples_since_hop < HOP_SAMPLES {
                    continue;
                }
                samples_since_hop = 0;

                let start = Instant::now();
                let frame = compute_window(&mut ch1, &mut ch2, &bus, t_host_latest);
                if start.elapsed() > Duration::from_secs(1) {
                    bus.publish(BusMessage::event(
                        "processing.slow",
                        serde_json::json!({ "sensor_type": "eeg" }),
                    ));
                    continue;
                }

                bus.publish(BusMessage::processed(ProcessedFrame::Eeg(frame.clone())));
                let _ = recorder.write_processed(&ProcessedFrame::Eeg(frame)).await;
            }
        }
    }
}

fn compute_window(
    ch1: &mut ChannelWindow,
    ch2: &mut ChannelWindow,
    bus: &EventBus,
    t_host: u64,
) -> EegProcessed {
    let (ch1_filtered, ch1_leadoff) = ch1.snapshot();
    let (ch2_filtered, ch2_leadoff) = ch2.snapshot();

    let ch1_sqi = signal_quality_index(&ch1_filtered, &ch1_leadoff);
    let ch2_sqi = signal_quality_index(&ch2_filtered, &ch2_leadoff);

    let (frequencies, ch1_power) = welch_psd(&ch1_filtered, SAMPLE_RATE_HZ, WELCH_SEGMENT_LEN);
    let (_, ch2_power) = welch_psd(&ch2_filtered, SAMPLE_RATE_HZ, WELCH_SEGMENT_LEN);

    let ch1_bands = leadoff_gate(ch1, "ch1", &ch1_leadoff, &frequencies, &ch1_power, bus);
    let ch2_bands = leadoff_gate(ch2, "ch2", &ch2_leadoff, &frequencies, &ch2_power, bus);

    let valid_bands: Vec<BandPowers> = [ch1_bands, ch2_bands].into_iter().flatten().collect();
    let indices: Vec<_> = valid_bands.iter().map(derived_indices).collect();

    let avg = |f: fn(&crate::domain::eeg::DerivedIndices) -> f64| -> Option<f64> {
        if indices.is_empty() {
            None
        } else {
            Some(indices.iter().map(|i| f(i)).sum::<f64>() / indices.len() as f64)
        }
    };

    let hemispheric = match (ch1_bands, ch2_bands) {
        (Some(a), Some(b)) => Some(hemispheric_balance(a.alpha, b.alpha)),
        _ => None,
    };

    EegProcessed {
        t_host,
        ch1_filtered,
        ch2_filtered,
        ch1_sqi,
        ch2_sqi,
        frequencies,
        ch1_power,
        ch2_power,
        ch1_band_powers: ch1_bands,
        ch2_band_powers: ch2_bands,
        focus_index: avg(|i| i.focus_index),
        relaxation_index: avg(|i| i.relaxation_index),
        stress_index: avg(|i| i.stress_index),
        cognitive_load: avg(|i| i.cognitive_load),
        emotional_stability: avg(|i| i.emotional_stability),
        hemispheric_balance: hemispheric,
        total_power: avg(|i| i.total_power),
    }
}

/// Null out a channel's band powers under sustained lead-off, and publish
/// `error.leadoff` on the bus, throttled to once per 5 s per channel (§4.3).
fn leadoff_gate(
    channel: &mut ChannelWindow,
    channel_label: &str,
    leadoff: &[bool],
    frequencies: &[f64],
    power: &[f64],
    bus: &EventBus,
) -> Option<BandPowers> {
    let leadoff_count = leadoff.iter().filter(|&&f| f).count();
    if leadoff.is_empty() || leadoff_count as f64 / leadoff.len() as f64 > 0.5 {
        if channel.leadoff_throttle.should_emit() {
            tracing::warn!(channel = channel_label, "eeg channel lead-off for more than half of window");
            bus.publish(BusMessage::event(
                "error.leadoff",
                serde_json::json!({ "sensor_type": SensorKind::Eeg.as_str(), "channel": channel_label }),
            ));
        }
        return None;
    }
    Some(band_powers(frequencies, power))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leadoff_throttle_fires_once_then_waits() {
        let mut throttle = LeadoffThrottle::new();
        assert!(throttle.should_emit());
        assert!(!throttle.should_emit());
    }

    #[test]
    fn compute_window_nulls_indices_on_sustained_leadoff() {
        let mut ch1 = ChannelWindow::new();
        let mut ch2 = ChannelWindow::new();
        for _ in 0..WINDOW_SAMPLES {
            ch1.push(0.0, true);
            ch2.push(0.0, false);
        }
        let bus = EventBus::new();
        let frame = compute_window(&mut ch1, &mut ch2, &bus, 1000);
        assert!(frame.ch1_band_powers.is_none());
        assert!(frame.ch2_band_powers.is_some());
        assert!(frame.hemispheric_balance.is_none());
    }

    #[test]
    fn leadoff_gate_publishes_error_event_once_per_throttle_window() {
        let mut channel = ChannelWindow::new();
        let bus = EventBus::new();
        let mut rx = bus.register("watcher");
        bus.subscribe("watcher", &[crate::bus::Topic::Event]);
        let leadoff = vec![true; WINDOW_SAMPLES];

        let first = leadoff_gate(&mut channel, "ch1", &leadoff, &[], &[], &bus);
        assert!(first.is_none());
        let second = leadoff_gate(&mut channel, "ch1", &leadoff, &[], &[], &bus);
        assert!(second.is_none());

        let mut leadoff_events = 0;
        while let Ok(msg) = rx.try_recv() {
            if let BusMessage::Event { event_type, .. } = msg {
                if event_type == "error.leadoff" {
                    leadoff_events += 1;
                }
            }
        }
        assert_eq!(leadoff_events, 1, "throttle must suppress the second call's event");
    }
}
