//! Latency acceptance test for the EEG/PPG window pipelines.
//!
//! The EEG pipeline logs `processing.slow` if a single hop's compute exceeds
//! its 1 s budget (§5's "Queues are bounded ... 1 s of samples at nominal
//! rate"). This test fills the pipeline's 10 s sliding window once, then
//! feeds several more 1 s hops through the live pipeline to observe several
//! processed frames, and asserts both that no hop ever trips
//! `processing.slow` and that hop-to-hop latency (last sample of the hop
//! routed → `ProcessedData` observed on the bus) stays comfortably under
//! that 1 s budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use linkband_server::adapters::FileSessionRepository;
use linkband_server::bus::{BusMessage, EventBus};
use linkband_server::domain::sample::{EegSample, ProcessedFrame, RawSample};
use linkband_server::pipeline::PipelineSet;
use linkband_server::state::RecorderRunner;
use tokio_util::sync::CancellationToken;

fn eeg_sample(t: u64) -> RawSample {
    let phase = 2.0 * std::f64::consts::PI * 10.0 * t as f64 / 250.0;
    RawSample::Eeg(EegSample {
        t_device: t,
        t_host: t,
        ch1_raw: (phase.sin() * 50.0) as f32,
        ch2_raw: (phase.sin() * 45.0) as f32,
        leadoff_ch1: false,
        leadoff_ch2: false,
    })
}

#[tokio::test]
async fn eeg_hops_stay_under_the_one_second_budget() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(FileSessionRepository::new(dir.path().to_path_buf()).await.unwrap());
    let recorder = Arc::new(RecorderRunner::new(dir.path().to_path_buf(), repo));
    let bus = EventBus::new();
    let cancel = CancellationToken::new();

    let mut rx = bus.register("latency-watcher");
    let pipelines = PipelineSet::spawn(bus.clone(), recorder, cancel.clone());

    const WINDOW_SAMPLES: u64 = 2500; // 10 s at 250 Hz, the first full window
    const HOPS: usize = 5;
    const SAMPLES_PER_HOP: u64 = 250; // 1 s hop

    // Fill the first 10 s window; §3 requires nothing be emitted until then.
    for i in 0..WINDOW_SAMPLES {
        pipelines.router.route(eeg_sample(i)).await;
    }

    let mut hop_latencies = Vec::with_capacity(HOPS);
    let mut saw_slow_warning = false;

    for h in 0..HOPS {
        let hop_start = Instant::now();
        for i in 0..SAMPLES_PER_HOP {
            pipelines
                .router
                .route(eeg_sample(WINDOW_SAMPLES + h as u64 * SAMPLES_PER_HOP + i))
                .await;
        }

        let outcome = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Some(BusMessage::ProcessedData { data: ProcessedFrame::Eeg(_), .. }) => {
                        return true;
                    }
                    Some(BusMessage::Event { event_type, .. }) if event_type == "processing.slow" => {
                        return false;
                    }
                    Some(_) => continue,
                    None => return false,
                }
            }
        })
        .await
        .expect("should observe a processed frame or a slow-processing event within 2s");

        if !outcome {
            saw_slow_warning = true;
        }
        hop_latencies.push(hop_start.elapsed());
    }

    cancel.cancel();

    assert!(!saw_slow_warning, "pipeline reported processing.slow for at least one hop");

    let mut sorted = hop_latencies.clone();
    sorted.sort();
    let p95 = sorted[(sorted.len() * 95 / 100).min(sorted.len() - 1)];
    assert!(
        p95 < Duration::from_secs(1),
        "p95 hop latency {p95:?} exceeded the 1s processing budget"
    );
}
