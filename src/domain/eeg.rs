//! EEG signal processing: filtering, spectral estimation, derived indices.
//!
//! Pure functions over in-memory windows; no channel or task concerns live
//! here, those belong to `pipeline::eeg`.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::domain::sample::BandPowers;

const SAMPLE_RATE_HZ: f64 = 250.0;
const LEADOFF_NULL_FRACTION: f64 = 0.5;

/// A simple biquad IIR stage (direct form I), used for both band-pass and notch.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn bandpass(center_hz: f64, bandwidth_hz: f64, fs: f64) -> Self {
        let w0 = 2.0 * PI * center_hz / fs;
        let alpha = (w0.sin()) * (bandwidth_hz / center_hz) / 2.0;
        let cos_w0 = w0.cos();
        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn notch(center_hz: f64, q: f64, fs: f64) -> Self {
        let w0 = 2.0 * PI * center_hz / fs;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();
        let b0 = 1.0;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x0: f64) -> f64 {
        let y0 = self.b0 * x0 + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        self.y1 = y0;
        y0
    }
}

/// Band-pass 1-45 Hz followed by a 60 Hz notch, per §4.3.
pub struct EegFilterChain {
    bandpass: Biquad,
    notch: Biquad,
}

impl EegFilterChain {
    /// Build a fresh chain; each channel keeps its own instance and history.
    pub fn new() -> Self {
        let center = (1.0_f64 * 45.0).sqrt();
        Self {
            bandpass: Biquad::bandpass(center, 44.0, SAMPLE_RATE_HZ),
            notch: Biquad::notch(60.0, 30.0, SAMPLE_RATE_HZ),
        }
    }

    /// Filter a single raw sample, returning the filtered value.
    pub fn process(&mut self, raw: f32) -> f32 {
        let band = self.bandpass.process(raw as f64);
        self.notch.process(band) as f32
    }
}

impl Default for EegFilterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal-quality index in [0,1] for a window, `None` if lead-off invalidated it.
///
/// Computed from the fraction of samples with lead-off asserted and the
/// variance of the filtered signal relative to a plausible physiological range.
pub fn signal_quality_index(filtered: &[f32], leadoff_flags: &[bool]) -> Option<f64> {
    if filtered.is_empty() {
        return None;
    }
    let leadoff_count = leadoff_flags.iter().filter(|&&f| f).count();
    if leadoff_count as f64 / filtered.len() as f64 > LEADOFF_NULL_FRACTION {
        return None;
    }
    let mean = filtered.iter().map(|&v| v as f64).sum::<f64>() / filtered.len() as f64;
    let variance = filtered
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / filtered.len() as f64;
    // Healthy EEG sits in the low tens of µV²; clamp to [0,1] via a soft knee.
    Some((1.0 - (variance / 2500.0).min(1.0)).clamp(0.0, 1.0))
}

/// Welch-style power spectral density over one window.
///
/// Splits the window into half-overlapping segments, applies a Hann window,
/// FFTs each, and averages the per-bin magnitude-squared. Returns the
/// one-sided frequency axis and PSD.
pub fn welch_psd(samples: &[f32], fs: f64, segment_len: usize) -> (Vec<f64>, Vec<f64>) {
    if samples.len() < segment_len || segment_len == 0 {
        return (Vec::new(), Vec::new());
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(segment_len);

    let hann: Vec<f64> = (0..segment_len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / (segment_len - 1) as f64).cos())
        .collect();
    let window_power: f64 = hann.iter().map(|w| w * w).sum();

    let hop = segment_len / 2;
    let n_bins = segment_len / 2 + 1;
    let mut accum = vec![0.0_f64; n_bins];
    let mut segments = 0usize;

    let mut start = 0;
    while start + segment_len <= samples.len() {
        let mut buf: Vec<Complex<f64>> = samples[start..start + segment_len]
            .iter()
            .zip(hann.iter())
            .map(|(&s, &w)| Complex::new(s as f64 * w, 0.0))
            .collect();
        fft.process(&mut buf);
        for (bin, value) in accum.iter_mut().enumerate() {
            let mag2 = buf[bin].norm_sqr();
            *value += mag2 / (fs * window_power);
        }
        segments += 1;
        start += hop;
    }

    if segments == 0 {
        return (Vec::new(), Vec::new());
    }
    for value in accum.iter_mut() {
        *value /= segments as f64;
    }
    let freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * fs / segment_len as f64).collect();
    (freqs, accum)
}

/// Integrate a power spectrum over `[lo, hi)` Hz.
fn band_power(freqs: &[f64], power: &[f64], lo: f64, hi: f64) -> f64 {
    freqs
        .iter()
        .zip(power.iter())
        .filter(|(&f, _)| f >= lo && f < hi)
        .map(|(_, &p)| p)
        .sum()
}

/// Compute the five canonical band powers from a power spectrum.
pub fn band_powers(freqs: &[f64], power: &[f64]) -> BandPowers {
    BandPowers {
        delta: band_power(freqs, power, 1.0, 4.0),
        theta: band_power(freqs, power, 4.0, 8.0),
        alpha: band_power(freqs, power, 8.0, 13.0),
        beta: band_power(freqs, power, 13.0, 30.0),
        gamma: band_power(freqs, power, 30.0, 45.0),
    }
}

/// Derived single-channel indices, per the exact ratios of §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedIndices {
    /// β/(α+θ).
    pub focus_index: f64,
    /// α/β.
    pub relaxation_index: f64,
    /// (β+γ)/(α+θ).
    pub stress_index: f64,
    /// θ/α.
    pub cognitive_load: f64,
    /// α/(β+γ).
    pub emotional_stability: f64,
    /// Σ of all five bands.
    pub total_power: f64,
}

/// Compute the per-channel derived indices from band powers, `None` denominators become 0 to
/// avoid NaN propagation (the router emits the whole channel as null on lead-off instead).
pub fn derived_indices(bands: &BandPowers) -> DerivedIndices {
    let alpha_theta = bands.alpha + bands.theta;
    let beta_gamma = bands.beta + bands.gamma;
    DerivedIndices {
        focus_index: safe_div(bands.beta, alpha_theta),
        relaxation_index: safe_div(bands.alpha, bands.beta),
        stress_index: safe_div(beta_gamma, alpha_theta),
        cognitive_load: safe_div(bands.theta, bands.alpha),
        emotional_stability: safe_div(bands.alpha, beta_gamma),
        total_power: bands.delta + bands.theta + bands.alpha + bands.beta + bands.gamma,
    }
}

/// (ch1_α − ch2_α) / (ch1_α + ch2_α).
pub fn hemispheric_balance(ch1_alpha: f64, ch2_alpha: f64) -> f64 {
    safe_div(ch1_alpha - ch2_alpha, ch1_alpha + ch2_alpha)
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// FFT planner reused across windows to avoid reallocating the cached twiddle table.
pub fn planner_for(segment_len: usize) -> Arc<dyn Fft<f64>> {
    FftPlanner::<f64>::new().plan_fft_forward(segment_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_quality_none_above_leadoff_threshold() {
        let filtered = vec![0.0_f32; 10];
        let leadoff = vec![true, true, true, true, true, true, false, false, false, false];
        assert_eq!(signal_quality_index(&filtered, &leadoff), None);
    }

    #[test]
    fn signal_quality_some_below_leadoff_threshold() {
        let filtered = vec![1.0_f32; 10];
        let leadoff = vec![false; 10];
        assert!(signal_quality_index(&filtered, &leadoff).is_some());
    }

    #[test]
    fn welch_psd_produces_matching_axis_lengths() {
        let samples: Vec<f32> = (0..500).map(|i| (i as f32 * 0.1).sin()).collect();
        let (freqs, power) = welch_psd(&samples, SAMPLE_RATE_HZ, 250);
        assert_eq!(freqs.len(), power.len());
        assert!(!freqs.is_empty());
    }

    #[test]
    fn welch_psd_empty_below_segment_len() {
        let samples = vec![0.0_f32; 10];
        let (freqs, power) = welch_psd(&samples, SAMPLE_RATE_HZ, 250);
        assert!(freqs.is_empty());
        assert!(power.is_empty());
    }

    #[test]
    fn derived_indices_zero_denominator_is_zero_not_nan() {
        let bands = BandPowers {
            delta: 1.0,
            theta: 0.0,
            alpha: 0.0,
            beta: 1.0,
            gamma: 0.0,
        };
        let indices = derived_indices(&bands);
        assert_eq!(indices.focus_index, 0.0);
        assert!(!indices.focus_index.is_nan());
    }

    #[test]
    fn hemispheric_balance_symmetric_is_zero() {
        assert_eq!(hemispheric_balance(2.0, 2.0), 0.0);
    }
}
