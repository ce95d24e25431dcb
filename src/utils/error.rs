//! Error types and handling
//!
//! Common error types used across the recording pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to the caller of the recording facade
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("capture service failed to start: {0}")]
    CaptureStart(String),

    #[error("writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("invalid recording request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container writer failures
///
/// Variants carry formatted strings rather than sources so the latched
/// last-error slot and the stop-time completion event can both own a copy.
#[derive(Error, Debug, Clone)]
pub enum WriterError {
    #[error("failed to open container output: {0}")]
    OutputOpen(String),

    #[error("track input rejected data: {0}")]
    Sink(String),

    #[error("container finalize failed: {0}")]
    Finalize(String),
}

/// Platform capture service failures
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("capture failed to start: {0}")]
    StartFailed(String),

    #[error("capture failed to stop: {0}")]
    StopFailed(String),
}

impl From<CaptureError> for RecorderError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::PermissionDenied => RecorderError::PermissionDenied,
            other => RecorderError::CaptureStart(other.to_string()),
        }
    }
}

/// Audio session activation failures (non-fatal by policy)
#[derive(Error, Debug)]
pub enum AudioConfigError {
    #[error("no audio input device available")]
    NoInputDevice,

    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("unsupported audio configuration: {0}")]
    Unsupported(String),
}

/// Media library save failures (logged only, never surfaced to the caller)
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid media path: {0}")]
    InvalidPath(String),
}

/// Error response for the method-call bridge
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        let code = match &error {
            RecorderError::AlreadyRecording => "ALREADY_RECORDING",
            RecorderError::PermissionDenied => "PERMISSION_DENIED",
            RecorderError::CaptureStart(_) => "CAPTURE_START_ERROR",
            RecorderError::Writer(WriterError::OutputOpen(_)) => "OUTPUT_OPEN_ERROR",
            RecorderError::Writer(_) => "WRITER_FAILURE",
            RecorderError::InvalidRequest(_) => "INVALID_REQUEST",
            RecorderError::Io(_) => "IO_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
