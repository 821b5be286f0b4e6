//! BLE notification frame parsing (§4.1).
//!
//! A notification packet carries N samples plus a device timestamp and, for
//! EEG, a lead-off bit field. Parsing never panics on malformed input; it
//! reports [`FrameError`] so the caller can drop the packet and bump
//! `error.frame_malformed` without tearing down the link.
//!
//! Wire layout (little-endian), chosen since the upstream protocol document
//! was not part of this distillation:
//! - EEG:  `u32 t_device_ms | u8 leadoff_bits | N * (i16 ch1_raw, i16 ch2_raw)`
//! - PPG:  `u32 t_device_ms | N * (u16 red, u16 ir)`
//! - ACC:  `u32 t_device_ms | N * (i16 x_mg, i16 y_mg, i16 z_mg)` (milli-g)
//! - Battery: `u8 level_percent`

use thiserror::Error;

use crate::domain::sample::{AccSample, BatterySample, EegSample, PpgSample, RawSample};
use crate::ports::ble_adapter::{Characteristic, RawNotification};

/// A malformed BLE packet, per §4.1 step 1.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The payload length doesn't divide evenly into whole samples.
    #[error("declared packet length {len} does not match sample stride {stride}")]
    LengthMismatch { len: usize, stride: usize },
    /// The payload is shorter than the fixed header.
    #[error("packet too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },
}

const EEG_HEADER_LEN: usize = 5; // u32 + u8
const EEG_SAMPLE_LEN: usize = 4; // i16 + i16
const PPG_HEADER_LEN: usize = 4;
const PPG_SAMPLE_LEN: usize = 4; // u16 + u16
const ACC_HEADER_LEN: usize = 4;
const ACC_SAMPLE_LEN: usize = 6; // i16 * 3

/// Parse an EEG notification packet into one `RawSample::Eeg` per sample.
pub fn parse_eeg_packet(payload: &[u8], t_host_ms: u64) -> Result<Vec<RawSample>, FrameError> {
    if payload.len() < EEG_HEADER_LEN {
        return Err(FrameError::TooShort {
            len: payload.len(),
            min: EEG_HEADER_LEN,
        });
    }
    let body_len = payload.len() - EEG_HEADER_LEN;
    if body_len % EEG_SAMPLE_LEN != 0 {
        return Err(FrameError::LengthMismatch {
            len: payload.len(),
            stride: EEG_SAMPLE_LEN,
        });
    }

    let t_device = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as u64;
    let leadoff_bits = payload[4];
    let leadoff_ch1 = leadoff_bits & 0b01 != 0;
    let leadoff_ch2 = leadoff_bits & 0b10 != 0;

    let mut samples = Vec::with_capacity(body_len / EEG_SAMPLE_LEN);
    for chunk in payload[EEG_HEADER_LEN..].chunks_exact(EEG_SAMPLE_LEN) {
        let ch1_raw = i16::from_le_bytes(chunk[0..2].try_into().unwrap()) as f32;
        let ch2_raw = i16::from_le_bytes(chunk[2..4].try_into().unwrap()) as f32;
        samples.push(RawSample::Eeg(EegSample {
            t_device,
            t_host: t_host_ms,
            ch1_raw,
            ch2_raw,
            leadoff_ch1,
            leadoff_ch2,
        }));
    }
    Ok(samples)
}

/// Parse a PPG notification packet into one `RawSample::Ppg` per sample.
pub fn parse_ppg_packet(payload: &[u8], t_host_ms: u64) -> Result<Vec<RawSample>, FrameError> {
    if payload.len() < PPG_HEADER_LEN {
        return Err(FrameError::TooShort {
            len: payload.len(),
            min: PPG_HEADER_LEN,
        });
    }
    let body_len = payload.len() - PPG_HEADER_LEN;
    if body_len % PPG_SAMPLE_LEN != 0 {
        return Err(FrameError::LengthMismatch {
            len: payload.len(),
            stride: PPG_SAMPLE_LEN,
        });
    }

    let t_device = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as u64;

    let mut samples = Vec::with_capacity(body_len / PPG_SAMPLE_LEN);
    for chunk in payload[PPG_HEADER_LEN..].chunks_exact(PPG_SAMPLE_LEN) {
        let red = u16::from_le_bytes(chunk[0..2].try_into().unwrap()) as f32;
        let ir = u16::from_le_bytes(chunk[2..4].try_into().unwrap()) as f32;
        samples.push(RawSample::Ppg(PpgSample {
            t_device,
            t_host: t_host_ms,
            red,
            ir,
        }));
    }
    Ok(samples)
}

/// Parse an accelerometer notification packet into one `RawSample::Acc` per sample.
pub fn parse_acc_packet(payload: &[u8], t_host_ms: u64) -> Result<Vec<RawSample>, FrameError> {
    if payload.len() < ACC_HEADER_LEN {
        return Err(FrameError::TooShort {
            len: payload.len(),
            min: ACC_HEADER_LEN,
        });
    }
    let body_len = payload.len() - ACC_HEADER_LEN;
    if body_len % ACC_SAMPLE_LEN != 0 {
        return Err(FrameError::LengthMismatch {
            len: payload.len(),
            stride: ACC_SAMPLE_LEN,
        });
    }

    let t_device = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as u64;

    let mut samples = Vec::with_capacity(body_len / ACC_SAMPLE_LEN);
    for chunk in payload[ACC_HEADER_LEN..].chunks_exact(ACC_SAMPLE_LEN) {
        let x = i16::from_le_bytes(chunk[0..2].try_into().unwrap()) as f32 / 1000.0;
        let y = i16::from_le_bytes(chunk[2..4].try_into().unwrap()) as f32 / 1000.0;
        let z = i16::from_le_bytes(chunk[4..6].try_into().unwrap()) as f32 / 1000.0;
        samples.push(RawSample::Acc(AccSample {
            t_device,
            t_host: t_host_ms,
            x,
            y,
            z,
        }));
    }
    Ok(samples)
}

/// Parse a battery-level notification (always a single sample).
pub fn parse_battery_packet(payload: &[u8], t_host_ms: u64) -> Result<RawSample, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::TooShort { len: 0, min: 1 });
    }
    Ok(RawSample::Bat(BatterySample {
        t_host: t_host_ms,
        level_percent: payload[0].min(100),
        voltage: None,
        charging: None,
    }))
}

/// Decode a tagged raw notification into its samples (§4.1 step 2-3), routing
/// to the parser for its characteristic. Battery notifications yield exactly
/// one sample.
pub fn parse_notification(
    notification: &RawNotification,
    t_host_ms: u64,
) -> Result<Vec<RawSample>, FrameError> {
    match notification.characteristic {
        Characteristic::Eeg => parse_eeg_packet(&notification.payload, t_host_ms),
        Characteristic::Ppg => parse_ppg_packet(&notification.payload, t_host_ms),
        Characteristic::Acc => parse_acc_packet(&notification.payload, t_host_ms),
        Characteristic::Battery => parse_battery_packet(&notification.payload, t_host_ms).map(|s| vec![s]),
    }
}
