//! Line formatting for recorded session files.
//!
//! Each function renders one sample or frame as either a newline-delimited
//! JSON record or a fixed-width CSV row, matching the headers pinned in §6.
//! Pure string building, no I/O — the recorder owns file handles.

use crate::domain::sample::{AccProcessed, AccSample, BatterySample, EegProcessed, EegSample, PpgProcessed, PpgSample};

/// CSV header for `*_eeg_raw.csv`.
pub const EEG_RAW_CSV_HEADER: &str = "timestamp,ch1,ch2,leadoff_ch1,leadoff_ch2";
/// CSV header for `*_ppg_raw.csv`.
pub const PPG_RAW_CSV_HEADER: &str = "timestamp,red,ir";
/// CSV header for `*_acc_raw.csv`.
pub const ACC_RAW_CSV_HEADER: &str = "timestamp,x,y,z";
/// CSV header for `*_bat.csv`.
pub const BAT_CSV_HEADER: &str = "timestamp,level";
/// CSV header for `*_eeg_processed.csv`.
pub const EEG_PROCESSED_CSV_HEADER: &str =
    "timestamp,ch1_sqi,ch2_sqi,focus_index,relaxation_index,stress_index,cognitive_load,emotional_stability,hemispheric_balance,total_power";
/// CSV header for `*_ppg_processed.csv`.
pub const PPG_PROCESSED_CSV_HEADER: &str = "timestamp,bpm,sdnn,rmssd,pnn50,sdsd,lf,hf,lf_hf_ratio";
/// CSV header for `*_acc_processed.csv`.
pub const ACC_PROCESSED_CSV_HEADER: &str = "timestamp,avg_movement,std_movement,max_movement,activity_state";

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render an EEG raw sample as a CSV row.
pub fn eeg_raw_csv_row(sample: &EegSample) -> String {
    format!(
        "{},{},{},{},{}",
        sample.t_host, sample.ch1_raw, sample.ch2_raw, sample.leadoff_ch1, sample.leadoff_ch2
    )
}

/// Render a PPG raw sample as a CSV row.
pub fn ppg_raw_csv_row(sample: &PpgSample) -> String {
    format!("{},{},{}", sample.t_host, sample.red, sample.ir)
}

/// Render an accelerometer raw sample as a CSV row.
pub fn acc_raw_csv_row(sample: &AccSample) -> String {
    format!("{},{},{},{}", sample.t_host, sample.x, sample.y, sample.z)
}

/// Render a battery sample as a CSV row.
pub fn bat_csv_row(sample: &BatterySample) -> String {
    format!("{},{}", sample.t_host, sample.level_percent)
}

/// Render a processed EEG frame as a CSV row.
pub fn eeg_processed_csv_row(frame: &EegProcessed) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        frame.t_host,
        opt(frame.ch1_sqi),
        opt(frame.ch2_sqi),
        opt(frame.focus_index),
        opt(frame.relaxation_index),
        opt(frame.stress_index),
        opt(frame.cognitive_load),
        opt(frame.emotional_stability),
        opt(frame.hemispheric_balance),
        opt(frame.total_power),
    )
}

/// Render a processed PPG frame as a CSV row.
pub fn ppg_processed_csv_row(frame: &PpgProcessed) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        frame.t_host,
        opt(frame.bpm),
        opt(frame.sdnn),
        opt(frame.rmssd),
        opt(frame.pnn50),
        opt(frame.sdsd),
        opt(frame.lf),
        opt(frame.hf),
        opt(frame.lf_hf_ratio),
    )
}

/// Render a processed accelerometer frame as a CSV row.
pub fn acc_processed_csv_row(frame: &AccProcessed) -> String {
    format!(
        "{},{},{},{},{:?}",
        frame.t_host, frame.avg_movement, frame.std_movement, frame.max_movement, frame.activity_state
    )
}

/// Render any serializable record as a single newline-delimited JSON line.
pub fn json_line<T: serde::Serialize>(record: &T) -> serde_json::Result<String> {
    serde_json::to_string(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eeg_raw_csv_row_matches_header_column_count() {
        let sample = EegSample {
            t_device: 0,
            t_host: 1000,
            ch1_raw: 1.5,
            ch2_raw: -2.0,
            leadoff_ch1: false,
            leadoff_ch2: true,
        };
        let row = eeg_raw_csv_row(&sample);
        assert_eq!(row.split(',').count(), EEG_RAW_CSV_HEADER.split(',').count());
    }

    #[test]
    fn opt_none_renders_empty_field() {
        assert_eq!(opt(None), "");
    }

    #[test]
    fn json_line_round_trips() {
        let sample = BatterySample {
            t_host: 1,
            level_percent: 80,
            voltage: None,
            charging: Some(false),
        };
        let line = json_line(&sample).unwrap();
        let back: BatterySample = serde_json::from_str(&line).unwrap();
        assert_eq!(sample, back);
    }
}
