//! Capture service boundary
//!
//! The platform facility that produces a live stream of screen (and
//! optionally microphone) frames. The controller owns an injected
//! implementation rather than reaching for a process-wide singleton, so
//! tests can substitute a scripted service.

use async_trait::async_trait;

use crate::capture::frame::FrameSink;
use crate::utils::error::CaptureError;

/// Platform screen/microphone capture service
#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Begin capture, delivering every frame through `sink`.
    ///
    /// `microphone` toggles microphone capture on the service. Returns an
    /// error when the platform refuses to start (permission denied being the
    /// common case); no frames are delivered after a failed start.
    async fn start_capture(&self, sink: FrameSink, microphone: bool) -> Result<(), CaptureError>;

    /// Request that capture halt.
    ///
    /// The platform acknowledges asynchronously; callers log the result and
    /// do not block finalization on it.
    async fn stop_capture(&self) -> Result<(), CaptureError>;

    /// Full-device frame dimensions, used to size the video track.
    fn screen_size(&self) -> (u32, u32);
}
