//! Recorder (C6) state machine and its async file-writing runner.
//!
//! `RecorderState` is the pure statig transition table for §4.6's
//! `Idle → Arming → Recording → Closing → Idle` cycle. `RecorderRunner` owns
//! the actual file handles: `Arming` creates the session directory and every
//! per-sensor file before any write; `Closing` flushes, fsyncs, and hands the
//! final `Session` to a [`SessionRepository`] for its atomic rename.

#![allow(missing_docs)] // statig macro generates code that triggers missing_docs warnings

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use statig::prelude::*;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::export;
use crate::domain::sample::{ProcessedFrame, RawSample, SensorKind};
use crate::domain::session::{DataFormat, FileIndexEntry, Session, SessionStatus};
use crate::error::{AppError, AppResult};
use crate::ports::session_repository::SessionRepository;

const FSYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Events that drive the recorder's state transitions.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Operator requested a new recording session.
    Start { session_name: String },
    /// The session directory and every per-sensor file were created.
    ArmingComplete,
    /// Operator requested a clean stop.
    Stop,
    /// The underlying disk failed; the session is kept but marked aborted.
    IoFailed,
    /// Files flushed, fsynced, and `session.json` persisted.
    CloseComplete,
}

/// States of the recorder, per §4.6.
#[derive(Debug, Default, Clone)]
pub enum RecorderState {
    /// No active session.
    #[default]
    Idle,
    /// Creating the session directory and per-sensor files.
    Arming { session_name: String },
    /// Files open; samples and processed frames are being appended.
    Recording { session_name: String },
    /// Flushing and persisting `session.json`.
    Closing { session_name: String, aborted: bool },
}

#[state_machine(initial = "State::idle()", state(derive(Debug, Clone)), on_transition = "Self::on_transition")]
impl RecorderState {
    #[state]
    fn idle(event: &RecorderEvent) -> Response<State> {
        match event {
            RecorderEvent::Start { session_name } => {
                Transition(State::arming(session_name.clone()))
            }
            _ => Super,
        }
    }

    #[state]
    #[allow(clippy::ptr_arg)]
    fn arming(session_name: &String, event: &RecorderEvent) -> Response<State> {
        match event {
            RecorderEvent::ArmingComplete => Transition(State::recording(session_name.clone())),
            RecorderEvent::IoFailed => Transition(State::closing(session_name.clone(), true)),
            _ => Super,
        }
    }

    #[state]
    #[allow(clippy::ptr_arg)]
    fn recording(session_name: &String, event: &RecorderEvent) -> Response<State> {
        match event {
            RecorderEvent::Stop => Transition(State::closing(session_name.clone(), false)),
            RecorderEvent::IoFailed => Transition(State::closing(session_name.clone(), true)),
            _ => Super,
        }
    }

    #[state]
    fn closing(session_name: &String, aborted: &bool, event: &RecorderEvent) -> Response<State> {
        let _ = (session_name, aborted);
        match event {
            RecorderEvent::CloseComplete => Transition(State::idle()),
            _ => Super,
        }
    }

    fn on_transition(&mut self, source: &State, target: &State) {
        tracing::info!(?source, ?target, "recorder transition");
    }
}

/// Which half of a sensor's pair of files a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FileKind {
    Raw(SensorKind),
    Processed(SensorKind),
}

impl FileKind {
    fn file_label(self) -> &'static str {
        match self {
            Self::Raw(_) => "raw",
            Self::Processed(_) => "processed",
        }
    }

    fn sensor_kind(self) -> SensorKind {
        match self {
            Self::Raw(k) | Self::Processed(k) => k,
        }
    }

    fn file_name(self, session_name: &str, format: DataFormat) -> String {
        let ext = match format {
            DataFormat::Json => "json",
            DataFormat::Csv => "csv",
        };
        format!(
            "{session_name}_{}_{}.{ext}",
            self.sensor_kind().as_str(),
            self.file_label()
        )
    }

    fn csv_header(self) -> &'static str {
        match self {
            Self::Raw(SensorKind::Eeg) => export::EEG_RAW_CSV_HEADER,
            Self::Raw(SensorKind::Ppg) => export::PPG_RAW_CSV_HEADER,
            Self::Raw(SensorKind::Acc) => export::ACC_RAW_CSV_HEADER,
            Self::Raw(SensorKind::Bat) => export::BAT_CSV_HEADER,
            Self::Processed(SensorKind::Eeg) => export::EEG_PROCESSED_CSV_HEADER,
            Self::Processed(SensorKind::Ppg) => export::PPG_PROCESSED_CSV_HEADER,
            Self::Processed(SensorKind::Acc) => export::ACC_PROCESSED_CSV_HEADER,
            Self::Processed(SensorKind::Bat) => "",
        }
    }
}

struct OpenFile {
    handle: File,
    entry: FileIndexEntry,
}

struct OpenSession {
    id: String,
    name: String,
    started_at: String,
    data_format: DataFormat,
    root_path: PathBuf,
    files: HashMap<FileKind, OpenFile>,
    last_fsync: Instant,
    aborted: bool,
}

/// Drives the recorder: owns open file handles, appends records, and
/// persists the final `Session` through a [`SessionRepository`].
pub struct RecorderRunner {
    export_root: PathBuf,
    session_repo: Arc<dyn SessionRepository>,
    machine: Mutex<statig::blocking::InitializedStateMachine<RecorderState>>,
    open: Mutex<Option<OpenSession>>,
    last_session: Mutex<Option<Session>>,
}

impl RecorderRunner {
    pub fn new(export_root: PathBuf, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            export_root,
            session_repo,
            machine: Mutex::new(RecorderState::default().uninitialized_state_machine().init()),
            open: Mutex::new(None),
            last_session: Mutex::new(None),
        }
    }

    /// `Idle → Arming → Recording`: create the session directory and every
    /// per-sensor file, then return the in-progress `Session`.
    pub async fn start_recording(
        &self,
        session_name: String,
        data_format: DataFormat,
    ) -> AppResult<Session> {
        {
            let machine = self.machine.lock().await;
            if !matches!(machine.state(), State::Idle {}) {
                return Err(AppError::RecordingAlreadyActive);
            }
        }

        self.machine.lock().await.handle(&RecorderEvent::Start {
            session_name: session_name.clone(),
        });

        let root_path = self.export_root.join(&session_name);
        let result = self.arm(&session_name, &root_path, data_format).await;

        let mut machine = self.machine.lock().await;
        match result {
            Ok(open_session) => {
                machine.handle(&RecorderEvent::ArmingComplete);
                let session = Self::snapshot(&open_session, SessionStatus::Recording);
                *self.open.lock().await = Some(open_session);
                Ok(session)
            }
            Err(e) => {
                machine.handle(&RecorderEvent::IoFailed);
                machine.handle(&RecorderEvent::CloseComplete);
                Err(AppError::RecordingIo(e.to_string()))
            }
        }
    }

    async fn arm(
        &self,
        session_name: &str,
        root_path: &PathBuf,
        data_format: DataFormat,
    ) -> anyhow::Result<OpenSession> {
        tokio::fs::create_dir_all(root_path).await?;

        let mut files = HashMap::new();
        for kind in [
            FileKind::Raw(SensorKind::Eeg),
            FileKind::Raw(SensorKind::Ppg),
            FileKind::Raw(SensorKind::Acc),
            FileKind::Raw(SensorKind::Bat),
            FileKind::Processed(SensorKind::Eeg),
            FileKind::Processed(SensorKind::Ppg),
            FileKind::Processed(SensorKind::Acc),
        ] {
            let file_name = kind.file_name(session_name, data_format);
            let path = root_path.join(&file_name);
            let mut handle = File::create(&path).await?;
            let mut byte_size = 0u64;
            if data_format == DataFormat::Csv {
                let header = format!("{}\n", kind.csv_header());
                handle.write_all(header.as_bytes()).await?;
                byte_size = header.len() as u64;
            }
            files.insert(
                kind,
                OpenFile {
                    handle,
                    entry: FileIndexEntry {
                        sensor_kind: kind.sensor_kind().as_str().to_string(),
                        kind: kind.file_label().to_string(),
                        path: file_name,
                        byte_size,
                        sample_count: 0,
                    },
                },
            );
        }

        Ok(OpenSession {
            id: uuid::Uuid::new_v4().to_string(),
            name: session_name.to_string(),
            started_at: Utc::now().to_rfc3339(),
            data_format,
            root_path: root_path.clone(),
            files,
            last_fsync: Instant::now(),
            aborted: false,
        })
    }

    async fn append(&self, kind: FileKind, line: String) -> AppResult<()> {
        let mut guard = self.open.lock().await;
        let open = match guard.as_mut() {
            Some(open) => open,
            None => return Err(AppError::RecordingNotActive),
        };

        let Some(file) = open.files.get_mut(&kind) else {
            return Ok(());
        };

        let bytes = format!("{line}\n");
        if let Err(e) = file.handle.write_all(bytes.as_bytes()).await {
            open.aborted = true;
            return Err(AppError::RecordingIo(e.to_string()));
        }
        file.entry.byte_size += bytes.len() as u64;
        file.entry.sample_count += 1;

        if open.last_fsync.elapsed() >= FSYNC_INTERVAL {
            for f in open.files.values_mut() {
                let _ = f.handle.flush().await;
            }
            open.last_fsync = Instant::now();
        }

        Ok(())
    }

    /// Append a raw sample to its sensor's raw file, per the active session's
    /// `data_format`.
    pub async fn write_raw(&self, sample: &RawSample) -> AppResult<()> {
        let format = match self.open.lock().await.as_ref() {
            Some(open) => open.data_format,
            None => return Err(AppError::RecordingNotActive),
        };
        let (kind, line) = match sample {
            RawSample::Eeg(s) => (
                FileKind::Raw(SensorKind::Eeg),
                render(format, s, export::eeg_raw_csv_row),
            ),
            RawSample::Ppg(s) => (
                FileKind::Raw(SensorKind::Ppg),
                render(format, s, export::ppg_raw_csv_row),
            ),
            RawSample::Acc(s) => (
                FileKind::Raw(SensorKind::Acc),
                render(format, s, export::acc_raw_csv_row),
            ),
            RawSample::Bat(s) => (
                FileKind::Raw(SensorKind::Bat),
                render(format, s, export::bat_csv_row),
            ),
        };
        self.append(kind, line?).await
    }

    /// Append a processed frame to its sensor's processed file.
    pub async fn write_processed(&self, frame: &ProcessedFrame) -> AppResult<()> {
        let format = match self.open.lock().await.as_ref() {
            Some(open) => open.data_format,
            None => return Err(AppError::RecordingNotActive),
        };
        let (kind, line) = match frame {
            ProcessedFrame::Eeg(f) => (
                FileKind::Processed(SensorKind::Eeg),
                render(format, f, export::eeg_processed_csv_row),
            ),
            ProcessedFrame::Ppg(f) => (
                FileKind::Processed(SensorKind::Ppg),
                render(format, f, export::ppg_processed_csv_row),
            ),
            ProcessedFrame::Acc(f) => (
                FileKind::Processed(SensorKind::Acc),
                render(format, f, export::acc_processed_csv_row),
            ),
        };
        self.append(kind, line?).await
    }

    /// `Recording → Closing → Idle`: flush, fsync, and persist `session.json`
    /// atomically. Returns the final `Session` record.
    ///
    /// Idempotent once `Idle`: a repeated call returns the last completed
    /// session's summary instead of `recording.not_active` (§8 scenario 6).
    pub async fn stop_recording(&self) -> AppResult<Session> {
        {
            let machine = self.machine.lock().await;
            if matches!(machine.state(), State::Idle {}) {
                return self
                    .last_session
                    .lock()
                    .await
                    .clone()
                    .ok_or(AppError::RecordingNotActive);
            }
        }
        self.machine.lock().await.handle(&RecorderEvent::Stop);
        self.finish(SessionStatus::Completed).await
    }

    /// Force a close after an I/O failure, marking the session `aborted`
    /// while keeping every byte already written (§4.6).
    pub async fn abort_recording(&self) -> AppResult<Session> {
        self.machine.lock().await.handle(&RecorderEvent::IoFailed);
        self.finish(SessionStatus::Aborted).await
    }

    async fn finish(&self, requested_status: SessionStatus) -> AppResult<Session> {
        let mut guard = self.open.lock().await;
        let mut open = guard.take().ok_or(AppError::RecordingNotActive)?;

        for file in open.files.values_mut() {
            let _ = file.handle.flush().await;
            let _ = file.handle.sync_all().await;
        }

        let status = if open.aborted {
            SessionStatus::Aborted
        } else {
            requested_status
        };

        let mut session = Self::snapshot(&open, status);
        session.ended_at = Some(Utc::now().to_rfc3339());
        session.file_index.push(FileIndexEntry {
            sensor_kind: String::new(),
            kind: "metadata".to_string(),
            path: "session.json".to_string(),
            byte_size: 0,
            sample_count: 0,
        });

        self.session_repo
            .save(&session)
            .await
            .map_err(|e| AppError::RecordingIo(e.to_string()))?;

        self.machine.lock().await.handle(&RecorderEvent::CloseComplete);
        *self.last_session.lock().await = Some(session.clone());
        Ok(session)
    }

    /// The most recently completed or aborted session, if any, for
    /// `/data/recording-status` and idempotent `stop-recording` replies.
    pub async fn last_session(&self) -> Option<Session> {
        self.last_session.lock().await.clone()
    }

    fn snapshot(open: &OpenSession, status: SessionStatus) -> Session {
        Session {
            id: open.id.clone(),
            name: open.name.clone(),
            started_at: open.started_at.clone(),
            ended_at: None,
            data_format: open.data_format,
            root_path: open.root_path.to_string_lossy().into_owned(),
            file_index: open.files.values().map(|f| f.entry.clone()).collect(),
            status,
        }
    }

    /// Current recorder state as a plain label for `/data/recording-status`.
    pub async fn status_label(&self) -> &'static str {
        match self.machine.lock().await.state() {
            State::Idle {} => "idle",
            State::Arming { .. } => "arming",
            State::Recording { .. } => "recording",
            State::Closing { .. } => "closing",
        }
    }
}

fn render<T, F>(format: DataFormat, value: &T, csv: F) -> AppResult<String>
where
    T: serde::Serialize,
    F: Fn(&T) -> String,
{
    match format {
        DataFormat::Csv => Ok(csv(value)),
        DataFormat::Json => export::json_line(value).map_err(AppError::Json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FileSessionRepository;
    use crate::domain::sample::{AccSample, EegSample};

    async fn test_runner() -> (RecorderRunner, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let repo = Arc::new(
            FileSessionRepository::new(temp.path().to_path_buf())
                .await
                .unwrap(),
        );
        let runner = RecorderRunner::new(temp.path().to_path_buf(), repo);
        (runner, temp)
    }

    #[tokio::test]
    async fn start_creates_every_sensor_file() {
        let (runner, temp) = test_runner().await;
        let session = runner
            .start_recording("s1".to_string(), DataFormat::Json)
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Recording);
        assert_eq!(session.file_index.len(), 7);
        assert!(temp.path().join("s1").join("s1_eeg_raw.json").exists());
    }

    #[tokio::test]
    async fn second_start_fails_while_recording() {
        let (runner, _temp) = test_runner().await;
        runner
            .start_recording("s1".to_string(), DataFormat::Json)
            .await
            .unwrap();

        let err = runner
            .start_recording("s2".to_string(), DataFormat::Json)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RecordingAlreadyActive));
    }

    #[tokio::test]
    async fn write_raw_then_stop_produces_non_empty_files() {
        let (runner, temp) = test_runner().await;
        runner
            .start_recording("s1".to_string(), DataFormat::Json)
            .await
            .unwrap();

        runner
            .write_raw(&RawSample::Eeg(EegSample {
                t_device: 0,
                t_host: 1,
                ch1_raw: 1.0,
                ch2_raw: 2.0,
                leadoff_ch1: false,
                leadoff_ch2: false,
            }))
            .await
            .unwrap();
        runner
            .write_raw(&RawSample::Acc(AccSample {
                t_device: 0,
                t_host: 1,
                x: 0.0,
                y: 0.0,
                z: 1.0,
            }))
            .await
            .unwrap();

        let session = runner.stop_recording().await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        // ppg/bat raw and every processed file never received a write.
        assert!(!session.all_files_non_empty());

        let eeg_path = temp.path().join("s1").join("s1_eeg_raw.json");
        let contents = tokio::fs::read_to_string(eeg_path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn stop_without_active_session_fails() {
        let (runner, _temp) = test_runner().await;
        let err = runner.stop_recording().await.unwrap_err();
        assert!(matches!(err, AppError::RecordingNotActive));
    }

    #[tokio::test]
    async fn csv_format_writes_header_first() {
        let (runner, temp) = test_runner().await;
        runner
            .start_recording("s1".to_string(), DataFormat::Csv)
            .await
            .unwrap();
        runner.stop_recording().await.unwrap();

        let path = temp.path().join("s1").join("s1_eeg_raw.csv");
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(contents.trim_end(), export::EEG_RAW_CSV_HEADER);
    }
}
