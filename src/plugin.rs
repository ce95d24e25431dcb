//! Caller-facing recording facade
//!
//! The surface the method-call bridge invokes: `start_record_screen` is
//! fire-and-forget from the application's point of view (a failure maps to
//! its boolean-false start result), `stop_record_screen` returns the output
//! path, or an empty string when no session was active.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::capture::audio::CpalAudioSession;
use crate::capture::service::CaptureService;
use crate::recorder::controller::RecorderController;
use crate::recorder::state::{RecorderPhase, RecordingRequest, StopReceipt};
use crate::storage::library::FolderLibrary;
use crate::utils::error::RecorderError;
use crate::writer::ffmpeg::FfmpegBackend;

/// Shared handle over the recording controller
pub struct ScreenRecordPlugin {
    controller: Arc<Mutex<RecorderController>>,
}

impl ScreenRecordPlugin {
    /// Wrap an already wired controller (tests inject fakes this way).
    pub fn new(controller: RecorderController) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
        }
    }

    /// Production wiring: FFmpeg writer, cpal audio session, folder library.
    ///
    /// `output_root` is the per-app document storage; `library_root` is the
    /// shared media library location.
    pub fn with_defaults(
        capture: Arc<dyn CaptureService>,
        output_root: PathBuf,
        library_root: PathBuf,
    ) -> Self {
        Self::new(RecorderController::new(
            capture,
            Arc::new(CpalAudioSession),
            Arc::new(FolderLibrary::new(library_root)),
            Arc::new(FfmpegBackend::new()),
            output_root,
        ))
    }

    /// Start a recording named `name`, with or without microphone audio.
    pub async fn start_record_screen(
        &self,
        name: impl Into<String>,
        audio: bool,
    ) -> Result<(), RecorderError> {
        let request = RecordingRequest::new(name, audio);
        self.controller.lock().await.start(request).await
    }

    /// Start from the bridge's JSON argument map.
    pub async fn start_from_args(&self, args: &serde_json::Value) -> Result<(), RecorderError> {
        let request = RecordingRequest::from_args(args)?;
        self.controller.lock().await.start(request).await
    }

    /// Stop the active recording.
    ///
    /// Returns the absolute output path, or an empty string when no session
    /// was active. The path is returned before finalize completes; use
    /// [`ScreenRecordPlugin::stop`] to observe durability.
    pub async fn stop_record_screen(&self) -> String {
        match self.stop().await {
            Some(receipt) => receipt.output_path.display().to_string(),
            None => String::new(),
        }
    }

    /// Stop and keep the receipt, for callers that await the completion
    /// event.
    pub async fn stop(&self) -> Option<StopReceipt> {
        self.controller.lock().await.stop().await
    }

    /// Current controller phase.
    pub async fn phase(&self) -> RecorderPhase {
        self.controller.lock().await.phase()
    }
}

impl Clone for ScreenRecordPlugin {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
        }
    }
}
