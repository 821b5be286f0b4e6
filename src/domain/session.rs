//! Recording session metadata.
//!
//! `Session` is the durable record written atomically to `session.json` on
//! stop (§4.6); `FileIndexEntry` tracks each file the recorder produced.

use serde::{Deserialize, Serialize};

/// On-disk or in-transit data encoding for a recorded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Newline-delimited JSON records.
    Json,
    /// Fixed-header CSV.
    Csv,
}

/// Terminal or in-progress status of a session, persisted in `session.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Recording is still in progress (only observed in memory, never persisted).
    Recording,
    /// Stopped cleanly via `stop-recording`.
    Completed,
    /// Closed early due to a recording I/O failure or device disconnect.
    Aborted,
}

/// One file produced under a session's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    /// Which sensor this file holds data for (absent for `session.json` itself).
    pub sensor_kind: String,
    /// `raw` or `processed`.
    pub kind: String,
    /// Path relative to the session's root directory.
    pub path: String,
    /// File size in bytes at last flush.
    pub byte_size: u64,
    /// Number of records (samples or frames) written.
    pub sample_count: u64,
}

/// Durable session metadata, per §3's `Session` data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable session identifier (UUID v4).
    pub id: String,
    /// Operator-chosen or auto-generated session name; also the directory name.
    pub name: String,
    /// Wall-clock start time, RFC 3339.
    pub started_at: String,
    /// Wall-clock end time, RFC 3339. `None` while recording.
    pub ended_at: Option<String>,
    /// Encoding used for every file in this session.
    pub data_format: DataFormat,
    /// Absolute path to the session's directory.
    pub root_path: String,
    /// Every file written under `root_path`, including `session.json`.
    pub file_index: Vec<FileIndexEntry>,
    /// Final disposition of the session.
    pub status: SessionStatus,
}

impl Session {
    /// Total bytes across every indexed file.
    pub fn total_bytes(&self) -> u64 {
        self.file_index.iter().map(|f| f.byte_size).sum()
    }

    /// True once every recorded file in `file_index` is non-empty, the
    /// condition §8 requires before `stop-recording` may return 2xx.
    pub fn all_files_non_empty(&self) -> bool {
        self.file_index
            .iter()
            .filter(|f| f.path != "session.json")
            .all(|f| f.byte_size > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session(status: SessionStatus) -> Session {
        Session {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            name: "s1".to_string(),
            started_at: "2026-07-28T00:00:00Z".to_string(),
            ended_at: Some("2026-07-28T00:05:00Z".to_string()),
            data_format: DataFormat::Json,
            root_path: "/exports/s1".to_string(),
            file_index: vec![FileIndexEntry {
                sensor_kind: "eeg".to_string(),
                kind: "raw".to_string(),
                path: "s1_eeg_raw.json".to_string(),
                byte_size: 1024,
                sample_count: 250,
            }],
            status,
        }
    }

    #[test]
    fn all_files_non_empty_ignores_session_json() {
        let mut session = sample_session(SessionStatus::Completed);
        session.file_index.push(FileIndexEntry {
            sensor_kind: String::new(),
            kind: "metadata".to_string(),
            path: "session.json".to_string(),
            byte_size: 0,
            sample_count: 0,
        });
        assert!(session.all_files_non_empty());
    }

    #[test]
    fn all_files_non_empty_false_when_a_data_file_is_empty() {
        let mut session = sample_session(SessionStatus::Aborted);
        session.file_index[0].byte_size = 0;
        assert!(!session.all_files_non_empty());
    }

    #[test]
    fn total_bytes_sums_file_index() {
        let session = sample_session(SessionStatus::Completed);
        assert_eq!(session.total_bytes(), 1024);
    }
}
