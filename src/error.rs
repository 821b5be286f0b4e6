//! Typed error model for the server core.
//!
//! Every fallible operation in the streaming engine returns [`AppError`],
//! which carries a stable `error_code` string (§7 of the design). The same
//! value is used to build both the HTTP error body and the `event.error`
//! bus envelope, so the two surfaces can never report different codes for
//! the same failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Broad error category, matching the `device.*` / `frame.*` / ... prefixes
/// used throughout the design document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Scan/connect/link failures, recovered by retry with backoff.
    Device,
    /// Malformed BLE packets, dropped and counted locally.
    Frame,
    /// Slow or failed pipeline window, skipped and counted.
    Processing,
    /// Recording IO failure; the active session is closed `aborted`.
    Recording,
    /// Slow WebSocket consumer; its subscription is closed.
    Client,
    /// Unrecoverable startup/runtime failure; the process exits non-zero.
    Fatal,
}

impl ErrorCategory {
    /// The category's prefix as used in `error_code` strings, e.g. `"device"`.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Frame => "frame",
            Self::Processing => "processing",
            Self::Recording => "recording",
            Self::Client => "client",
            Self::Fatal => "fatal",
        }
    }
}

/// The server's single error type.
///
/// Each variant names a stable `error_code` (via [`AppError::error_code`])
/// used both in HTTP error bodies and in `event.error` bus envelopes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// `device.scan_failed` — BLE scan could not be started or aborted early.
    #[error("device scan failed: {0}")]
    DeviceScanFailed(String),

    /// `device.timeout` — connect attempt exceeded its 10 s deadline.
    #[error("device connect timed out")]
    DeviceTimeout,

    /// `device.not_found` — operation referenced an unregistered/unknown device.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// `device.not_connected` — operation requires a connected device.
    #[error("no device is connected")]
    DeviceNotConnected,

    /// `frame.malformed` — a BLE notification failed packet-length validation.
    #[error("malformed frame: {0}")]
    FrameMalformed(String),

    /// `processing.slow` — a pipeline window missed its 1 s budget.
    #[error("processing window missed its budget: {0}")]
    ProcessingSlow(String),

    /// `recording.already_active` — a second start-recording while armed/recording.
    #[error("a recording session is already active")]
    RecordingAlreadyActive,

    /// `recording.not_active` — stop-recording or file listing with no session.
    #[error("no recording session is active")]
    RecordingNotActive,

    /// `recording.io` — the recorder's underlying disk I/O failed.
    #[error("recording I/O failure: {0}")]
    RecordingIo(String),

    /// `recording.session_not_found` — a named session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// `client.slow_consumer` — a WebSocket subscriber sustained drops for 3 s.
    #[error("client {0} is a slow consumer")]
    SlowClient(String),

    /// `fatal.bind` — the HTTP/WS listener could not bind its port.
    #[error("failed to bind listener: {0}")]
    BindFailed(String),

    /// `fatal.storage` — the device catalogue or session index is corrupt or unreachable.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Catch-all for I/O errors surfaced from `std`/`tokio`.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for (de)serialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// The broad category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DeviceScanFailed(_)
            | Self::DeviceTimeout
            | Self::DeviceNotFound(_)
            | Self::DeviceNotConnected => ErrorCategory::Device,
            Self::FrameMalformed(_) => ErrorCategory::Frame,
            Self::ProcessingSlow(_) => ErrorCategory::Processing,
            Self::RecordingAlreadyActive
            | Self::RecordingNotActive
            | Self::RecordingIo(_)
            | Self::SessionNotFound(_) => ErrorCategory::Recording,
            Self::SlowClient(_) => ErrorCategory::Client,
            Self::BindFailed(_) | Self::StorageFailure(_) => ErrorCategory::Fatal,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Fatal,
        }
    }

    /// The stable `error_code` string published alongside this error, e.g.
    /// `"device.timeout"` or `"recording.already_active"`.
    pub fn error_code(&self) -> String {
        let suffix = match self {
            Self::DeviceScanFailed(_) => "scan_failed",
            Self::DeviceTimeout => "timeout",
            Self::DeviceNotFound(_) => "not_found",
            Self::DeviceNotConnected => "not_connected",
            Self::FrameMalformed(_) => "malformed",
            Self::ProcessingSlow(_) => "slow",
            Self::RecordingAlreadyActive => "already_active",
            Self::RecordingNotActive => "not_active",
            Self::RecordingIo(_) => "io",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SlowClient(_) => "slow_consumer",
            Self::BindFailed(_) => "bind",
            Self::StorageFailure(_) => "storage",
            Self::Io(_) => "io",
            Self::Json(_) => "serialization",
        };
        format!("{}.{}", self.category().prefix(), suffix)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceNotFound(_) | Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::DeviceNotConnected | Self::RecordingNotActive => StatusCode::BAD_REQUEST,
            Self::RecordingAlreadyActive => StatusCode::CONFLICT,
            Self::DeviceTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::DeviceScanFailed(_) | Self::FrameMalformed(_) | Self::ProcessingSlow(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RecordingIo(_) | Self::BindFailed(_) | Self::StorageFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::SlowClient(_) => StatusCode::BAD_REQUEST,
            Self::Io(_) | Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body shape for HTTP error responses: `{success: false, message, error_code}`.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            error_code: self.error_code(),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Convenience alias used throughout the core.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_matches_category_prefix() {
        assert_eq!(AppError::DeviceTimeout.error_code(), "device.timeout");
        assert_eq!(
            AppError::RecordingAlreadyActive.error_code(),
            "recording.already_active"
        );
        assert_eq!(
            AppError::SlowClient("abc".into()).error_code(),
            "client.slow_consumer"
        );
    }

    #[test]
    fn category_prefix_is_stable() {
        assert_eq!(ErrorCategory::Device.prefix(), "device");
        assert_eq!(ErrorCategory::Fatal.prefix(), "fatal");
    }

    #[test]
    fn status_codes_reflect_semantics() {
        assert_eq!(
            AppError::DeviceNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::RecordingAlreadyActive.status_code(),
            StatusCode::CONFLICT
        );
    }
}
