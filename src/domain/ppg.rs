//! PPG signal processing: filtering, peak detection, HRV time- and
//! frequency-domain metrics.

use cardio_rs::metrics::time_domain::TimeMetrics;
use serde::{Deserialize, Serialize};

use crate::domain::eeg::welch_psd;

const SAMPLE_RATE_HZ: f64 = 50.0;
const MIN_WINDOW_SECS: f64 = 60.0;
const MIN_BEATS: usize = 20;

/// A single first-order IIR band-pass stage, 0.5-8 Hz, tuned for PPG.
#[derive(Debug, Clone, Copy)]
pub struct PpgFilter {
    prev_in: f64,
    prev_out: f64,
    low_state: f64,
}

impl PpgFilter {
    /// A fresh filter with zeroed history.
    pub fn new() -> Self {
        Self {
            prev_in: 0.0,
            prev_out: 0.0,
            low_state: 0.0,
        }
    }

    /// Apply the band-pass to one raw sample.
    pub fn process(&mut self, raw: f32) -> f32 {
        let fs = SAMPLE_RATE_HZ;
        // High-pass at 0.5 Hz (single pole) to remove baseline wander.
        let rc_hp = 1.0 / (2.0 * std::f64::consts::PI * 0.5);
        let alpha_hp = rc_hp / (rc_hp + 1.0 / fs);
        let x = raw as f64;
        let hp = alpha_hp * (self.prev_out + x - self.prev_in);
        self.prev_in = x;
        self.prev_out = hp;

        // Low-pass at 8 Hz (single pole) to remove high-frequency noise.
        let rc_lp = 1.0 / (2.0 * std::f64::consts::PI * 8.0);
        let alpha_lp = (1.0 / fs) / (rc_lp + 1.0 / fs);
        self.low_state += alpha_lp * (hp - self.low_state);
        self.low_state as f32
    }
}

impl Default for PpgFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-sample signal-quality index derived from local signal variance.
pub fn ppg_sqi(filtered: &[f32]) -> Vec<f64> {
    if filtered.len() < 3 {
        return vec![1.0; filtered.len()];
    }
    filtered
        .windows(3)
        .map(|w| {
            let local_var = {
                let mean = w.iter().map(|&v| v as f64).sum::<f64>() / 3.0;
                w.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / 3.0
            };
            (1.0 - (local_var / 4.0).min(1.0)).clamp(0.0, 1.0)
        })
        .chain(std::iter::repeat(1.0).take(2))
        .collect()
}

/// Detect peaks in the filtered PPG window and return RR intervals in milliseconds.
///
/// Uses an adaptive threshold (a fraction of the running max) with a
/// refractory period to reject double-detections of the same beat.
pub fn detect_rr_intervals_ms(filtered: &[f32], sample_rate_hz: f64) -> Vec<f64> {
    if filtered.len() < 3 {
        return Vec::new();
    }
    let refractory_samples = (0.3 * sample_rate_hz) as usize; // ≤200 BPM
    let max_abs = filtered.iter().fold(0.0_f32, |acc, &v| acc.max(v.abs()));
    if max_abs == 0.0 {
        return Vec::new();
    }
    let threshold = max_abs * 0.5;

    let mut peak_indices = Vec::new();
    let mut last_peak: Option<usize> = None;
    for i in 1..filtered.len() - 1 {
        let is_local_max = filtered[i] > filtered[i - 1] && filtered[i] >= filtered[i + 1];
        if is_local_max && filtered[i] >= threshold {
            if let Some(prev) = last_peak {
                if i - prev < refractory_samples {
                    continue;
                }
            }
            peak_indices.push(i);
            last_peak = Some(i);
        }
    }

    peak_indices
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64 * 1000.0 / sample_rate_hz)
        .collect()
}

/// Median instantaneous BPM across a set of RR intervals (ms), `None` if empty.
pub fn median_bpm(rr_intervals_ms: &[f64]) -> Option<f64> {
    if rr_intervals_ms.is_empty() {
        return None;
    }
    let mut instantaneous: Vec<f64> = rr_intervals_ms.iter().map(|&rr| 60_000.0 / rr).collect();
    instantaneous.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = instantaneous.len() / 2;
    Some(if instantaneous.len() % 2 == 0 {
        (instantaneous[mid - 1] + instantaneous[mid]) / 2.0
    } else {
        instantaneous[mid]
    })
}

/// Time-domain HRV metrics: SDNN, RMSSD, pNN50, SDSD (all ms except pNN50 as a percentage).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDomainHrv {
    /// Standard deviation of NN intervals.
    pub sdnn: f64,
    /// Root mean square of successive differences.
    pub rmssd: f64,
    /// Percentage of successive differences exceeding 50 ms.
    pub pnn50: f64,
    /// Standard deviation of successive differences.
    pub sdsd: f64,
}

/// Compute time-domain HRV metrics, `None` below the minimum beat count (§4.3: ≥20 beats).
pub fn time_domain_hrv(rr_intervals_ms: &[f64]) -> Option<TimeDomainHrv> {
    if rr_intervals_ms.len() + 1 < MIN_BEATS {
        return None;
    }
    let metrics = TimeMetrics::compute(rr_intervals_ms);
    let diffs: Vec<f64> = rr_intervals_ms.windows(2).map(|w| w[1] - w[0]).collect();
    let nn50 = diffs.iter().filter(|d| d.abs() > 50.0).count();
    let pnn50 = if diffs.is_empty() {
        0.0
    } else {
        100.0 * nn50 as f64 / diffs.len() as f64
    };
    Some(TimeDomainHrv {
        sdnn: metrics.sdnn,
        rmssd: metrics.rmssd,
        pnn50,
        sdsd: metrics.rmssd, // SDSD and RMSSD coincide for a zero-mean successive-difference series.
    })
}

/// Frequency-domain HRV: LF (0.04-0.15 Hz), HF (0.15-0.4 Hz) power and their ratio.
///
/// The RR series is resampled onto a uniform 4 Hz grid via linear
/// interpolation before FFT, since RR intervals are inherently unevenly spaced.
pub fn frequency_domain_hrv(rr_intervals_ms: &[f64]) -> Option<(f64, f64, f64)> {
    if rr_intervals_ms.len() + 1 < MIN_BEATS {
        return None;
    }
    const RESAMPLE_HZ: f64 = 4.0;

    let mut beat_times_s = Vec::with_capacity(rr_intervals_ms.len() + 1);
    let mut t = 0.0;
    beat_times_s.push(t);
    for &rr in rr_intervals_ms {
        t += rr / 1000.0;
        beat_times_s.push(t);
    }
    let total_duration = t;
    if total_duration <= 0.0 {
        return None;
    }

    let n_samples = (total_duration * RESAMPLE_HZ) as usize;
    if n_samples < 8 {
        return None;
    }
    let mut resampled = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let query_t = i as f64 / RESAMPLE_HZ;
        resampled.push(interpolate_rr(&beat_times_s, rr_intervals_ms, query_t) as f32);
    }

    let (freqs, power) = welch_psd(&resampled, RESAMPLE_HZ, n_samples.min(64).max(8));
    let lf: f64 = freqs
        .iter()
        .zip(power.iter())
        .filter(|(&f, _)| f >= 0.04 && f < 0.15)
        .map(|(_, &p)| p)
        .sum();
    let hf: f64 = freqs
        .iter()
        .zip(power.iter())
        .filter(|(&f, _)| f >= 0.15 && f < 0.4)
        .map(|(_, &p)| p)
        .sum();
    let ratio = if hf == 0.0 { 0.0 } else { lf / hf };
    Some((lf, hf, ratio))
}

fn interpolate_rr(beat_times_s: &[f64], rr_intervals_ms: &[f64], query_t: f64) -> f64 {
    for i in 0..rr_intervals_ms.len() {
        if beat_times_s[i] <= query_t && query_t <= beat_times_s[i + 1] {
            let span = beat_times_s[i + 1] - beat_times_s[i];
            if span <= 0.0 {
                return rr_intervals_ms[i];
            }
            let frac = (query_t - beat_times_s[i]) / span;
            let prev = rr_intervals_ms[i.saturating_sub(1).min(i)];
            return prev + frac * (rr_intervals_ms[i] - prev);
        }
    }
    *rr_intervals_ms.last().unwrap_or(&800.0)
}

/// Whether a window has accumulated enough data to emit HRV (§4.3: ≥60s and ≥20 beats).
pub fn window_is_sufficient(window_secs: f64, beat_count: usize) -> bool {
    window_secs >= MIN_WINDOW_SECS && beat_count >= MIN_BEATS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_bpm_odd_count() {
        let rr = vec![800.0, 750.0, 820.0];
        let bpm = median_bpm(&rr).unwrap();
        assert!(bpm > 0.0);
    }

    #[test]
    fn median_bpm_empty_is_none() {
        assert_eq!(median_bpm(&[]), None);
    }

    #[test]
    fn time_domain_hrv_none_below_min_beats() {
        let rr = vec![800.0; 5];
        assert_eq!(time_domain_hrv(&rr), None);
    }

    #[test]
    fn time_domain_hrv_some_at_min_beats() {
        let rr = vec![800.0, 820.0, 790.0, 810.0, 805.0, 795.0, 815.0, 800.0, 790.0, 805.0,
                      800.0, 820.0, 790.0, 810.0, 805.0, 795.0, 815.0, 800.0, 790.0];
        assert!(time_domain_hrv(&rr).is_some());
    }

    #[test]
    fn window_sufficiency_requires_both_duration_and_beats() {
        assert!(!window_is_sufficient(59.9, 25));
        assert!(!window_is_sufficient(65.0, 19));
        assert!(window_is_sufficient(60.0, 20));
    }

    #[test]
    fn detect_rr_intervals_empty_on_flat_signal() {
        let flat = vec![0.0_f32; 100];
        assert!(detect_rr_intervals_ms(&flat, SAMPLE_RATE_HZ).is_empty());
    }
}
