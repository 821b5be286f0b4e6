//! Raw and processed sample types for each sensor kind.
//!
//! Pure data structures with no I/O dependencies, following the hexagonal
//! architecture principles the rest of this crate observes. See §3 of the
//! design document for the exact field list each variant carries.

use serde::{Deserialize, Serialize};

/// The four sensor kinds a headband exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// 2-channel EEG at 250 Hz.
    Eeg,
    /// Photoplethysmogram at 50 Hz.
    Ppg,
    /// 3-axis accelerometer at 25 Hz.
    Acc,
    /// Battery telemetry, emitted on change (≥1 Hz).
    Bat,
}

impl SensorKind {
    /// Nominal sampling rate in Hz, per §3.
    pub fn nominal_rate_hz(self) -> f64 {
        match self {
            Self::Eeg => 250.0,
            Self::Ppg => 50.0,
            Self::Acc => 25.0,
            Self::Bat => 1.0,
        }
    }

    /// Lower-case wire name used in topics and envelopes (`raw.eeg`, `sensor_type: "ppg"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eeg => "eeg",
            Self::Ppg => "ppg",
            Self::Acc => "acc",
            Self::Bat => "bat",
        }
    }
}

/// A single EEG sample from both channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EegSample {
    /// Device-reported timestamp; may wrap, not used for ordering.
    pub t_device: u64,
    /// Host-assigned monotonic timestamp in milliseconds since an arbitrary epoch.
    pub t_host: u64,
    /// Raw channel 1 reading.
    pub ch1_raw: f32,
    /// Raw channel 2 reading.
    pub ch2_raw: f32,
    /// Whether channel 1's electrode has lost skin contact.
    pub leadoff_ch1: bool,
    /// Whether channel 2's electrode has lost skin contact.
    pub leadoff_ch2: bool,
}

/// A single PPG sample (red and infrared photodiode readings).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PpgSample {
    /// Device-reported timestamp; may wrap, not used for ordering.
    pub t_device: u64,
    /// Host-assigned monotonic timestamp in milliseconds.
    pub t_host: u64,
    /// Red LED photodiode reading.
    pub red: f32,
    /// Infrared LED photodiode reading.
    pub ir: f32,
}

/// A single 3-axis accelerometer sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccSample {
    /// Device-reported timestamp; may wrap, not used for ordering.
    pub t_device: u64,
    /// Host-assigned monotonic timestamp in milliseconds.
    pub t_host: u64,
    /// X-axis acceleration, normalized so 1.0 ≈ 1 g.
    pub x: f32,
    /// Y-axis acceleration, normalized so 1.0 ≈ 1 g.
    pub y: f32,
    /// Z-axis acceleration, normalized so 1.0 ≈ 1 g.
    pub z: f32,
}

/// A battery telemetry sample, emitted on change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    /// Host-assigned monotonic timestamp in milliseconds.
    pub t_host: u64,
    /// Battery level as a percentage (0-100).
    pub level_percent: u8,
    /// Battery voltage in volts, if the device reports it.
    pub voltage: Option<f32>,
    /// Whether the device is currently charging, if known.
    pub charging: Option<bool>,
}

/// A raw sample tagged by sensor kind, as routed by the sample router (C2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor_kind")]
pub enum RawSample {
    /// EEG channel pair.
    Eeg(EegSample),
    /// PPG red/IR pair.
    Ppg(PpgSample),
    /// 3-axis acceleration.
    Acc(AccSample),
    /// Battery level update.
    Bat(BatterySample),
}

impl RawSample {
    /// The sensor kind this sample belongs to.
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Eeg(_) => SensorKind::Eeg,
            Self::Ppg(_) => SensorKind::Ppg,
            Self::Acc(_) => SensorKind::Acc,
            Self::Bat(_) => SensorKind::Bat,
        }
    }

    /// The host timestamp carried by this sample, used for ordering and windowing.
    pub fn t_host(&self) -> u64 {
        match self {
            Self::Eeg(s) => s.t_host,
            Self::Ppg(s) => s.t_host,
            Self::Acc(s) => s.t_host,
            Self::Bat(s) => s.t_host,
        }
    }
}

/// Per-channel EEG band powers, in the five canonical bands (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    /// 1-4 Hz.
    pub delta: f64,
    /// 4-8 Hz.
    pub theta: f64,
    /// 8-13 Hz.
    pub alpha: f64,
    /// 13-30 Hz.
    pub beta: f64,
    /// 30-45 Hz.
    pub gamma: f64,
}

/// A windowed, processed EEG frame. Emitted at most once per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EegProcessed {
    /// Timestamp of the window's end (the `t_host` of its last contributing sample).
    pub t_host: u64,
    /// Band-pass + notch filtered channel 1 samples for the window.
    pub ch1_filtered: Vec<f32>,
    /// Band-pass + notch filtered channel 2 samples for the window.
    pub ch2_filtered: Vec<f32>,
    /// Channel 1 signal-quality index in [0,1], or `None` if lead-off invalidated it.
    pub ch1_sqi: Option<f64>,
    /// Channel 2 signal-quality index in [0,1], or `None` if lead-off invalidated it.
    pub ch2_sqi: Option<f64>,
    /// Frequency axis (Hz) of the Welch power spectrum.
    pub frequencies: Vec<f64>,
    /// Channel 1 power spectral density, aligned with `frequencies`.
    pub ch1_power: Vec<f64>,
    /// Channel 2 power spectral density, aligned with `frequencies`.
    pub ch2_power: Vec<f64>,
    /// Channel 1 band powers, or `None` under sustained lead-off.
    pub ch1_band_powers: Option<BandPowers>,
    /// Channel 2 band powers, or `None` under sustained lead-off.
    pub ch2_band_powers: Option<BandPowers>,
    /// β/(α+θ) averaged across channels with valid data.
    pub focus_index: Option<f64>,
    /// α/β.
    pub relaxation_index: Option<f64>,
    /// (β+γ)/(α+θ).
    pub stress_index: Option<f64>,
    /// θ/α.
    pub cognitive_load: Option<f64>,
    /// α/(β+γ).
    pub emotional_stability: Option<f64>,
    /// (ch1_α−ch2_α)/(ch1_α+ch2_α).
    pub hemispheric_balance: Option<f64>,
    /// Σ of all five bands, averaged across channels with valid data.
    pub total_power: Option<f64>,
}

/// A windowed, processed PPG frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpgProcessed {
    /// Timestamp of the window's end.
    pub t_host: u64,
    /// Band-pass filtered PPG samples for the window.
    pub filtered_ppg: Vec<f32>,
    /// Per-sample signal-quality index in [0,1].
    pub ppg_sqi: Vec<f64>,
    /// Median instantaneous heart rate across the window, `None` below the minimum beat count.
    pub bpm: Option<f64>,
    /// Time-domain HRV: standard deviation of NN intervals (ms).
    pub sdnn: Option<f64>,
    /// Time-domain HRV: root mean square of successive differences (ms).
    pub rmssd: Option<f64>,
    /// Time-domain HRV: percentage of successive differences > 50 ms.
    pub pnn50: Option<f64>,
    /// Time-domain HRV: standard deviation of successive differences (ms).
    pub sdsd: Option<f64>,
    /// Low-frequency power (0.04-0.15 Hz) of the interpolated RR series.
    pub lf: Option<f64>,
    /// High-frequency power (0.15-0.4 Hz) of the interpolated RR series.
    pub hf: Option<f64>,
    /// LF/HF ratio.
    pub lf_hf_ratio: Option<f64>,
}

/// Accelerometer-derived activity classification (§4.3, §8 boundary values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    /// Magnitude < 1.1 g.
    Stationary,
    /// 1.1 ≤ magnitude < 1.5 g.
    Light,
    /// 1.5 ≤ magnitude < 2.0 g.
    Moderate,
    /// magnitude ≥ 2.0 g.
    Vigorous,
}

/// A windowed, processed accelerometer frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccProcessed {
    /// Timestamp of the window's end.
    pub t_host: u64,
    /// Average magnitude over the window.
    pub avg_movement: f64,
    /// Standard deviation of magnitude over the window.
    pub std_movement: f64,
    /// Maximum magnitude observed in the window.
    pub max_movement: f64,
    /// Classified activity level.
    pub activity_state: ActivityState,
}

/// A processed frame tagged by sensor kind, as published on `processed.<kind>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor_kind")]
pub enum ProcessedFrame {
    /// EEG indices and spectra.
    Eeg(EegProcessed),
    /// PPG HRV metrics.
    Ppg(PpgProcessed),
    /// Accelerometer activity classification.
    Acc(AccProcessed),
}

impl ProcessedFrame {
    /// The sensor kind this processed frame belongs to.
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Eeg(_) => SensorKind::Eeg,
            Self::Ppg(_) => SensorKind::Ppg,
            Self::Acc(_) => SensorKind::Acc,
        }
    }

    /// The window-end host timestamp.
    pub fn t_host(&self) -> u64 {
        match self {
            Self::Eeg(f) => f.t_host,
            Self::Ppg(f) => f.t_host,
            Self::Acc(f) => f.t_host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_kind_nominal_rates() {
        assert_eq!(SensorKind::Eeg.nominal_rate_hz(), 250.0);
        assert_eq!(SensorKind::Ppg.nominal_rate_hz(), 50.0);
        assert_eq!(SensorKind::Acc.nominal_rate_hz(), 25.0);
    }

    #[test]
    fn raw_sample_kind_and_timestamp() {
        let sample = RawSample::Eeg(EegSample {
            t_device: 0,
            t_host: 42,
            ch1_raw: 1.0,
            ch2_raw: 2.0,
            leadoff_ch1: false,
            leadoff_ch2: false,
        });
        assert_eq!(sample.kind(), SensorKind::Eeg);
        assert_eq!(sample.t_host(), 42);
    }

    #[test]
    fn sensor_kind_wire_names() {
        assert_eq!(SensorKind::Eeg.as_str(), "eeg");
        assert_eq!(SensorKind::Bat.as_str(), "bat");
    }

    #[test]
    fn processed_frame_roundtrip() {
        let frame = ProcessedFrame::Acc(AccProcessed {
            t_host: 100,
            avg_movement: 1.0,
            std_movement: 0.1,
            max_movement: 1.2,
            activity_state: ActivityState::Light,
        });
        let json = serde_json::to_string(&frame).unwrap();
        let back: ProcessedFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }
}
