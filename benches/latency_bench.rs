use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linkband_server::domain::acc::{classify_activity, magnitude, window_stats};
use linkband_server::domain::eeg::{band_powers, signal_quality_index, welch_psd, EegFilterChain};
use linkband_server::domain::ppg::{
    detect_rr_intervals_ms, frequency_domain_hrv, median_bpm, ppg_sqi, time_domain_hrv, PpgFilter,
};

const EEG_SAMPLE_RATE_HZ: f64 = 250.0;
const EEG_WINDOW_SAMPLES: usize = 2500; // 10 s sliding window (§3)
const EEG_WELCH_SEGMENT_LEN: usize = 64;
const PPG_SAMPLE_RATE_HZ: f64 = 50.0;
const PPG_WINDOW_SAMPLES: usize = 3000; // 60 s sliding window (§3)
const PPG_HOP_SAMPLES: usize = 50; // 1 s hop; RR detection runs per hop, not per 60 s window
const ACC_WINDOW_SAMPLES: usize = 100; // 4 s sliding window (§3)

/// One full 10 s EEG window of a synthetic 10 Hz sine wave, the kind of
/// input the Welch/SQI steps process once per 1 s hop.
fn synthetic_eeg_window() -> Vec<f32> {
    (0..EEG_WINDOW_SAMPLES)
        .map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / EEG_SAMPLE_RATE_HZ).sin() as f32 * 50.0)
        .collect()
}

/// One full 60 s PPG sliding window with a clear ~72 BPM pulse, the kind of
/// input `ppg_sqi` runs over once per 1 s hop.
fn synthetic_ppg_window() -> Vec<f32> {
    (0..PPG_WINDOW_SAMPLES)
        .map(|i| (2.0 * std::f64::consts::PI * 1.2 * i as f64 / PPG_SAMPLE_RATE_HZ).sin() as f32 * 1000.0)
        .collect()
}

/// One 1 s PPG hop buffer — the unit RR detection actually runs over, to
/// avoid re-detecting already-counted beats from the rest of the 60 s window.
fn synthetic_ppg_hop() -> Vec<f32> {
    (0..PPG_HOP_SAMPLES)
        .map(|i| (2.0 * std::f64::consts::PI * 1.2 * i as f64 / PPG_SAMPLE_RATE_HZ).sin() as f32 * 1000.0)
        .collect()
}

/// Benchmark the per-sample EEG bandpass + 60 Hz notch chain.
///
/// This runs once per incoming sample (250 Hz nominal), so its per-call cost
/// directly bounds how much headroom the EEG task has before it falls behind.
fn bench_eeg_filter_chain(c: &mut Criterion) {
    let mut chain = EegFilterChain::new();
    c.bench_function("eeg_filter_chain_process", |b| {
        b.iter(|| chain.process(black_box(37.5)))
    });
}

/// Benchmark one 1 s EEG window's signal-quality index.
fn bench_eeg_signal_quality(c: &mut Criterion) {
    let window = synthetic_eeg_window();
    let leadoff = vec![false; EEG_WINDOW_SAMPLES];
    c.bench_function("eeg_signal_quality_index", |b| {
        b.iter(|| signal_quality_index(black_box(&window), black_box(&leadoff)))
    });
}

/// Benchmark the Welch PSD + band-power extraction run once per 1 s EEG window.
///
/// This is the most expensive step in the EEG pipeline (an FFT per segment);
/// it must stay well under the 1 s window budget the pipeline logs as
/// `processing.slow` if exceeded.
fn bench_eeg_welch_and_bands(c: &mut Criterion) {
    let window = synthetic_eeg_window();
    c.bench_function("eeg_welch_psd_and_band_powers", |b| {
        b.iter(|| {
            let (freqs, power) = welch_psd(black_box(&window), EEG_SAMPLE_RATE_HZ, EEG_WELCH_SEGMENT_LEN);
            black_box(band_powers(&freqs, &power))
        })
    });
}

/// Benchmark the PPG notch/bandpass chain applied to one raw red-ir sample.
fn bench_ppg_filter(c: &mut Criterion) {
    let mut filter = PpgFilter::new();
    c.bench_function("ppg_filter_process", |b| {
        b.iter(|| filter.process(black_box(250.0)))
    });
}

/// Benchmark RR-interval peak detection over one 1 s PPG hop.
fn bench_ppg_rr_detection(c: &mut Criterion) {
    let hop = synthetic_ppg_hop();
    c.bench_function("ppg_detect_rr_intervals", |b| {
        b.iter(|| detect_rr_intervals_ms(black_box(&hop), PPG_SAMPLE_RATE_HZ))
    });
}

/// Benchmark the full per-hop PPG HRV derivation: SQI over the 60 s sliding
/// window, plus BPM and time-/frequency-domain HRV over a realistic 60-beat
/// rolling RR buffer.
fn bench_ppg_hrv_suite(c: &mut Criterion) {
    let window = synthetic_ppg_window();
    let rr_intervals: Vec<f64> = (0..60).map(|i| 833.0 + (i % 7) as f64 * 4.0).collect();

    c.bench_function("ppg_hrv_suite", |b| {
        b.iter(|| {
            black_box(ppg_sqi(black_box(&window)));
            black_box(median_bpm(black_box(&rr_intervals)));
            black_box(time_domain_hrv(black_box(&rr_intervals)));
            black_box(frequency_domain_hrv(black_box(&rr_intervals)))
        })
    });
}

/// Benchmark the ACC pipeline's per-sample magnitude plus per-window stats
/// and activity classification over a full 4 s (100-sample) window.
fn bench_acc_window(c: &mut Criterion) {
    let magnitudes: Vec<f64> = (0..ACC_WINDOW_SAMPLES)
        .map(|i| magnitude(black_box(0.1 * i as f32), black_box(0.2), black_box(9.8)))
        .collect();

    c.bench_function("acc_window_stats_and_classify", |b| {
        b.iter(|| {
            let (mean, std_dev, _peak) = window_stats(black_box(&magnitudes));
            black_box(classify_activity(mean + std_dev))
        })
    });
}

criterion_group!(
    benches,
    bench_eeg_filter_chain,
    bench_eeg_signal_quality,
    bench_eeg_welch_and_bands,
    bench_ppg_filter,
    bench_ppg_rr_detection,
    bench_ppg_hrv_suite,
    bench_acc_window,
);

criterion_main!(benches);
