//! Recording state and request types
//!
//! Defines the controller phase machine and the caller-facing request and
//! receipt types exchanged with the method-call bridge.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::utils::error::{RecorderError, WriterError};

/// Current phase of the capture controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderPhase {
    /// No recording in progress
    Idle,
    /// Capture service running, frames flowing
    Capturing,
    /// Stop requested, teardown under way
    Stopping,
}

impl Default for RecorderPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Caller-supplied configuration for one recording
///
/// Immutable once a session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRequest {
    /// Output name; the container file becomes `<name>.mp4`
    pub name: String,

    /// Whether to capture microphone audio alongside the screen
    pub audio: bool,
}

impl RecordingRequest {
    pub fn new(name: impl Into<String>, audio: bool) -> Self {
        Self {
            name: name.into(),
            audio,
        }
    }

    /// Parse the bridge's argument map (`{"name": ..., "audio": ...}`).
    pub fn from_args(args: &serde_json::Value) -> Result<Self, RecorderError> {
        let request: RecordingRequest = serde_json::from_value(args.clone())
            .map_err(|e| RecorderError::InvalidRequest(e.to_string()))?;
        if request.name.is_empty() {
            return Err(RecorderError::InvalidRequest("empty output name".into()));
        }
        Ok(request)
    }
}

/// What `stop` hands back to the caller
///
/// The output path is available immediately; `completion` resolves once the
/// container finalize (and the media-library save attempt) has run, for
/// callers that want to await full durability. Dropping the receiver keeps
/// the default fire-and-forget contract.
#[derive(Debug)]
pub struct StopReceipt {
    /// Absolute path of the container file
    pub output_path: PathBuf,

    /// Resolves with the finalize outcome
    pub completion: oneshot::Receiver<Result<(), WriterError>>,
}
