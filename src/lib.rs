//! screenrec - native screen and microphone recording core.
//!
//! Bridges a host application to device screen capture: frames stream from
//! an injected capture service into a real-time container writer, and the
//! finalized file is handed off to the device media library.

pub mod capture;
pub mod plugin;
pub mod recorder;
pub mod storage;
pub mod utils;
pub mod writer;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use capture::{AudioSession, BufferKind, CaptureFrame, CaptureService, FrameSink};
pub use plugin::ScreenRecordPlugin;
pub use recorder::{RecorderController, RecorderPhase, RecordingRequest, StopReceipt};
pub use storage::{FolderLibrary, MediaLibrary};
pub use utils::error::{RecorderError, RecorderResult, WriterError};
pub use writer::{FfmpegBackend, WriterBackend, WriterSession, WriterStatus};

/// Initialize tracing/logging for hosts that have no subscriber of their own.
///
/// Call once at startup.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenrec=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("screenrec v{} initialized", env!("CARGO_PKG_VERSION"));
}
