//! Capture session controller
//!
//! Owns the lifecycle of the platform capture service and the writer
//! session: start, per-frame delivery, stop. Frames arrive from the capture
//! adapter on a bounded queue whose single consumer (the frame pump) is the
//! only context that touches the [`WriterSession`].

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::capture::audio::AudioSession;
use crate::capture::frame::{CaptureFrame, FrameSink};
use crate::capture::service::CaptureService;
use crate::recorder::state::{RecorderPhase, RecordingRequest, StopReceipt};
use crate::storage::library::MediaLibrary;
use crate::utils::error::{RecorderError, WriterError};
use crate::writer::backend::{AudioFormat, OutputSpec, VideoFormat, WriterBackend};
use crate::writer::session::WriterSession;

/// Depth of the capture-to-pump frame queue
const FRAME_QUEUE_DEPTH: usize = 256;

/// Nominal frame rate the video track is paced at
const VIDEO_FPS: u32 = 30;

/// Control messages for the frame pump
enum PumpControl {
    /// Finish tracks, finalize, and report through `done`
    Finish {
        done: oneshot::Sender<Result<(), WriterError>>,
    },
    /// Tear the session down without finalizing
    Abort,
}

/// Drives one recording at a time against the injected capture service
pub struct RecorderController {
    capture: Arc<dyn CaptureService>,
    audio_session: Arc<dyn AudioSession>,
    library: Arc<dyn MediaLibrary>,
    backend: Arc<dyn WriterBackend>,
    output_root: PathBuf,
    phase: Arc<RwLock<RecorderPhase>>,
    active: Option<ActiveRecording>,
}

struct ActiveRecording {
    id: Uuid,
    output_path: PathBuf,
    control_tx: mpsc::Sender<PumpControl>,
    started_at: DateTime<Utc>,
}

impl RecorderController {
    pub fn new(
        capture: Arc<dyn CaptureService>,
        audio_session: Arc<dyn AudioSession>,
        library: Arc<dyn MediaLibrary>,
        backend: Arc<dyn WriterBackend>,
        output_root: PathBuf,
    ) -> Self {
        Self {
            capture,
            audio_session,
            library,
            backend,
            output_root,
            phase: Arc::new(RwLock::new(RecorderPhase::Idle)),
            active: None,
        }
    }

    /// Current controller phase
    pub fn phase(&self) -> RecorderPhase {
        *self.phase.read()
    }

    /// Start a recording session.
    ///
    /// Rejected while a session is active. Audio-session activation is
    /// best-effort; a failure to open the container or to start capture is
    /// returned to the caller and leaves no session active.
    pub async fn start(&mut self, request: RecordingRequest) -> Result<(), RecorderError> {
        if self.phase() != RecorderPhase::Idle {
            return Err(RecorderError::AlreadyRecording);
        }

        let id = Uuid::new_v4();
        tracing::info!(
            session = %id,
            name = %request.name,
            audio = request.audio,
            "Starting screen recording"
        );

        if request.audio {
            if let Err(error) = self.audio_session.activate_duplex() {
                tracing::warn!(
                    session = %id,
                    %error,
                    "Audio session activation failed; recording continues without audio guarantees"
                );
            }
        }

        let output_path = self.output_root.join(format!("{}.mp4", request.name));
        match std::fs::remove_file(&output_path) {
            Ok(()) => tracing::debug!(path = %output_path.display(), "Removed stale output file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %output_path.display(), error = %e, "Could not remove stale output file");
            }
        }

        let (width, height) = self.capture.screen_size();
        let spec = OutputSpec {
            path: output_path.clone(),
            video: VideoFormat {
                width,
                height,
                fps: VIDEO_FPS,
            },
            audio: request.audio.then(AudioFormat::default),
        };
        let session = WriterSession::configure(self.backend.as_ref(), spec)?;

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (control_tx, control_rx) = mpsc::channel(4);
        let pump = tokio::spawn(pump_frames(
            id,
            session,
            frame_rx,
            control_rx,
            Arc::clone(&self.library),
        ));

        if let Err(error) = self
            .capture
            .start_capture(FrameSink::new(frame_tx), request.audio)
            .await
        {
            tracing::error!(session = %id, %error, "Capture service failed to start");
            let _ = control_tx.send(PumpControl::Abort).await;
            let _ = pump.await;
            return Err(error.into());
        }

        *self.phase.write() = RecorderPhase::Capturing;
        self.active = Some(ActiveRecording {
            id,
            output_path,
            control_tx,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// Stop the active recording session.
    ///
    /// Returns `None` (performing no file operations) when idle. Otherwise
    /// the capture service is told to halt (ack logged, not awaited), the
    /// writer finishes and finalizes asynchronously, and the receipt with
    /// the output path is returned immediately.
    pub async fn stop(&mut self) -> Option<StopReceipt> {
        let active = match self.active.take() {
            Some(active) => active,
            None => {
                tracing::info!("Stop requested with no active recording session");
                return None;
            }
        };
        *self.phase.write() = RecorderPhase::Stopping;

        // Fire and forget: the platform acknowledges on its own time
        let capture = Arc::clone(&self.capture);
        let session_id = active.id;
        tokio::spawn(async move {
            match capture.stop_capture().await {
                Ok(()) => tracing::debug!(session = %session_id, "Capture service acknowledged stop"),
                Err(error) => {
                    tracing::warn!(session = %session_id, %error, "Capture service stop reported an error")
                }
            }
        });

        let (done_tx, done_rx) = oneshot::channel();
        if active
            .control_tx
            .send(PumpControl::Finish { done: done_tx })
            .await
            .is_err()
        {
            tracing::warn!(session = %active.id, "Frame pump already gone at stop");
        }

        let elapsed_ms = Utc::now()
            .signed_duration_since(active.started_at)
            .num_milliseconds();
        tracing::info!(
            session = %active.id,
            duration_ms = elapsed_ms,
            path = %active.output_path.display(),
            "Recording stopped"
        );

        *self.phase.write() = RecorderPhase::Idle;
        Some(StopReceipt {
            output_path: active.output_path,
            completion: done_rx,
        })
    }
}

/// Single consumer for all writer mutation.
///
/// Control messages outrank queued frames, so a stop marks the tracks
/// finished before any backlog is replayed into them.
async fn pump_frames(
    id: Uuid,
    mut session: WriterSession,
    mut frames: mpsc::Receiver<CaptureFrame>,
    mut control: mpsc::Receiver<PumpControl>,
    library: Arc<dyn MediaLibrary>,
) {
    let mut frames_open = true;
    loop {
        tokio::select! {
            biased;

            message = control.recv() => match message {
                Some(PumpControl::Finish { done }) => {
                    finish_session(id, session, done, library).await;
                    return;
                }
                Some(PumpControl::Abort) | None => {
                    if let Err(e) = tokio::task::spawn_blocking(move || session.discard()).await {
                        tracing::warn!(session = %id, error = %e, "Writer discard task failed");
                    }
                    return;
                }
            },

            frame = frames.recv(), if frames_open => match frame {
                Some(frame) => {
                    if !frame.data_ready {
                        tracing::trace!(session = %id, "Skipping capture buffer that is not ready");
                        continue;
                    }
                    session.append(frame);
                }
                None => frames_open = false,
            },
        }
    }
}

async fn finish_session(
    id: Uuid,
    mut session: WriterSession,
    done: oneshot::Sender<Result<(), WriterError>>,
    library: Arc<dyn MediaLibrary>,
) {
    let output_path = session.output_path().to_path_buf();
    let latched = session.last_error().cloned();

    let result = match session.finish() {
        Some(handle) => match handle.await {
            Ok(Ok(())) => match latched {
                // A mid-stream failure outranks a clean-looking finalize
                Some(error) => Err(error),
                None => Ok(()),
            },
            Ok(Err(error)) => Err(error),
            Err(join_error) => Err(WriterError::Finalize(format!(
                "finalize task panicked: {join_error}"
            ))),
        },
        None => latched.map_or(Ok(()), Err),
    };

    match &result {
        Ok(()) => {
            tracing::info!(session = %id, path = %output_path.display(), "Recording finalized");
            match library.save_video(&output_path).await {
                Ok(()) => tracing::info!(session = %id, "Recording saved to media library"),
                Err(error) => {
                    tracing::error!(session = %id, %error, "Saving recording to media library failed")
                }
            }
        }
        Err(error) => tracing::error!(session = %id, %error, "Recording finalize failed"),
    }

    // The caller may have dropped the receipt; fire-and-forget is fine
    let _ = done.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::capture::frame::BufferKind;
    use crate::utils::error::{CaptureError, LibraryError};
    use crate::writer::backend::{ContainerControl, OpenedContainer, TrackSink};

    struct FakeCapture {
        fail_start: bool,
        sink: Mutex<Option<FrameSink>>,
        microphone: AtomicBool,
        stops: AtomicUsize,
    }

    impl FakeCapture {
        fn new(fail_start: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_start,
                sink: Mutex::new(None),
                microphone: AtomicBool::new(false),
                stops: AtomicUsize::new(0),
            })
        }

        fn deliver(&self, frame: CaptureFrame) -> bool {
            self.sink
                .lock()
                .as_ref()
                .expect("capture not started")
                .deliver(frame)
        }
    }

    #[async_trait]
    impl CaptureService for FakeCapture {
        async fn start_capture(
            &self,
            sink: FrameSink,
            microphone: bool,
        ) -> Result<(), CaptureError> {
            if self.fail_start {
                return Err(CaptureError::PermissionDenied);
            }
            self.microphone.store(microphone, Ordering::SeqCst);
            *self.sink.lock() = Some(sink);
            Ok(())
        }

        async fn stop_capture(&self) -> Result<(), CaptureError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn screen_size(&self) -> (u32, u32) {
            (1280, 720)
        }
    }

    struct FakeAudio {
        fail: bool,
        activations: AtomicUsize,
    }

    impl AudioSession for FakeAudio {
        fn activate_duplex(&self) -> Result<(), crate::utils::error::AudioConfigError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::utils::error::AudioConfigError::NoInputDevice)
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct FakeLibrary {
        saved: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl MediaLibrary for FakeLibrary {
        async fn save_video(&self, path: &Path) -> Result<(), LibraryError> {
            self.saved.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct BackendProbe {
        video_frames: AtomicUsize,
        audio_frames: AtomicUsize,
        finalized: AtomicUsize,
        discarded: AtomicBool,
    }

    struct CountingSink {
        kind: BufferKind,
        probe: Arc<BackendProbe>,
    }

    impl TrackSink for CountingSink {
        fn is_ready(&self) -> bool {
            true
        }

        fn append(&mut self, _payload: Vec<u8>, _pts: Duration) -> Result<(), WriterError> {
            let counter = match self.kind {
                BufferKind::Video => &self.probe.video_frames,
                _ => &self.probe.audio_frames,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn mark_finished(&mut self) {}
    }

    struct ProbeControl(Arc<BackendProbe>);

    impl ContainerControl for ProbeControl {
        fn finalize(self: Box<Self>) -> Result<(), WriterError> {
            self.0.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn discard(self: Box<Self>) {
            self.0.discarded.store(true, Ordering::SeqCst);
        }
    }

    struct TestBackend {
        probe: Arc<BackendProbe>,
        reject_name: Option<&'static str>,
    }

    impl WriterBackend for TestBackend {
        fn open(&self, spec: &OutputSpec) -> Result<OpenedContainer, WriterError> {
            if let Some(reject) = self.reject_name {
                if spec.path.file_name().and_then(|n| n.to_str()) == Some(reject) {
                    return Err(WriterError::OutputOpen(format!(
                        "{}: permission denied",
                        spec.path.display()
                    )));
                }
            }
            Ok(OpenedContainer {
                video: Box::new(CountingSink {
                    kind: BufferKind::Video,
                    probe: Arc::clone(&self.probe),
                }),
                audio: spec.audio.map(|_| {
                    Box::new(CountingSink {
                        kind: BufferKind::Microphone,
                        probe: Arc::clone(&self.probe),
                    }) as Box<dyn TrackSink>
                }),
                control: Box::new(ProbeControl(Arc::clone(&self.probe))),
            })
        }
    }

    struct Harness {
        capture: Arc<FakeCapture>,
        audio: Arc<FakeAudio>,
        library: Arc<FakeLibrary>,
        probe: Arc<BackendProbe>,
        root: tempfile::TempDir,
        controller: RecorderController,
    }

    fn harness(fail_capture: bool, fail_audio: bool, reject_name: Option<&'static str>) -> Harness {
        let capture = FakeCapture::new(fail_capture);
        let audio = Arc::new(FakeAudio {
            fail: fail_audio,
            activations: AtomicUsize::new(0),
        });
        let library = Arc::new(FakeLibrary::default());
        let probe = Arc::new(BackendProbe::default());
        let backend = Arc::new(TestBackend {
            probe: Arc::clone(&probe),
            reject_name,
        });
        let root = tempfile::tempdir().unwrap();
        let controller = RecorderController::new(
            capture.clone(),
            audio.clone(),
            library.clone(),
            backend,
            root.path().to_path_buf(),
        );
        Harness {
            capture,
            audio,
            library,
            probe,
            root,
            controller,
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn records_video_frames_end_to_end() {
        let mut h = harness(false, false, None);
        h.controller
            .start(RecordingRequest::new("clip1", false))
            .await
            .unwrap();
        assert_eq!(h.controller.phase(), RecorderPhase::Capturing);

        for i in 0..10u64 {
            assert!(h
                .capture
                .deliver(CaptureFrame::video(Duration::from_millis(i * 33), vec![0; 16])));
        }
        let probe = Arc::clone(&h.probe);
        wait_for(move || probe.video_frames.load(Ordering::SeqCst) == 10).await;

        let receipt = h.controller.stop().await.expect("session was active");
        assert!(receipt.output_path.ends_with("clip1.mp4"));
        assert_eq!(h.controller.phase(), RecorderPhase::Idle);

        receipt.completion.await.unwrap().unwrap();
        assert_eq!(h.probe.finalized.load(Ordering::SeqCst), 1);
        assert_eq!(h.library.saved.lock().as_slice(), &[receipt.output_path]);

        let capture = Arc::clone(&h.capture);
        wait_for(move || capture.stops.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn audio_activation_failure_is_non_fatal() {
        let mut h = harness(false, true, None);
        h.controller
            .start(RecordingRequest::new("clip2", true))
            .await
            .unwrap();
        assert_eq!(h.audio.activations.load(Ordering::SeqCst), 1);
        assert!(h.capture.microphone.load(Ordering::SeqCst));

        h.capture
            .deliver(CaptureFrame::video(Duration::from_millis(5), vec![0; 16]));
        h.capture
            .deliver(CaptureFrame::microphone(Duration::from_millis(6), vec![0; 4]));
        let probe = Arc::clone(&h.probe);
        wait_for(move || probe.video_frames.load(Ordering::SeqCst) == 1).await;

        let receipt = h.controller.stop().await.expect("session was active");
        assert!(receipt.output_path.ends_with("clip2.mp4"));
        receipt.completion.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn start_is_rejected_while_a_session_is_active() {
        let mut h = harness(false, false, None);
        h.controller
            .start(RecordingRequest::new("first", false))
            .await
            .unwrap();

        let err = h
            .controller
            .start(RecordingRequest::new("second", false))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::AlreadyRecording));

        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_when_idle_is_an_empty_no_op() {
        let mut h = harness(false, false, None);
        assert!(h.controller.stop().await.is_none());
        assert_eq!(h.controller.phase(), RecorderPhase::Idle);
        assert!(h.library.saved.lock().is_empty());
        assert_eq!(std::fs::read_dir(h.root.path()).unwrap().count(), 0);
        assert_eq!(h.capture.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_container_open_leaves_no_session_and_allows_retry() {
        let mut h = harness(false, false, Some("bad.mp4"));
        let err = h
            .controller
            .start(RecordingRequest::new("bad", false))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecorderError::Writer(WriterError::OutputOpen(_))
        ));
        assert_eq!(h.controller.phase(), RecorderPhase::Idle);

        h.controller
            .start(RecordingRequest::new("good", false))
            .await
            .unwrap();
        assert_eq!(h.controller.phase(), RecorderPhase::Capturing);
        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn capture_start_failure_discards_the_writer() {
        let mut h = harness(true, false, None);
        let err = h
            .controller
            .start(RecordingRequest::new("denied", false))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::PermissionDenied));
        assert_eq!(h.controller.phase(), RecorderPhase::Idle);
        assert!(h.probe.discarded.load(Ordering::SeqCst));
        assert_eq!(h.probe.finalized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_output_file_is_removed_at_start() {
        let h = harness(false, false, None);
        let stale = h.root.path().join("clip1.mp4");
        std::fs::write(&stale, b"previous recording").unwrap();

        let mut controller = h.controller;
        controller
            .start(RecordingRequest::new("clip1", false))
            .await
            .unwrap();
        assert!(!stale.exists());
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn buffers_that_are_not_ready_are_skipped() {
        let mut h = harness(false, false, None);
        h.controller
            .start(RecordingRequest::new("clip", false))
            .await
            .unwrap();

        h.capture
            .deliver(CaptureFrame::video(Duration::ZERO, vec![0; 16]).unready());
        h.capture
            .deliver(CaptureFrame::video(Duration::from_millis(33), vec![0; 16]));
        let probe = Arc::clone(&h.probe);
        wait_for(move || probe.video_frames.load(Ordering::SeqCst) == 1).await;

        let receipt = h.controller.stop().await.unwrap();
        receipt.completion.await.unwrap().unwrap();
        assert_eq!(h.probe.video_frames.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn frames_delivered_after_stop_are_not_accepted() {
        let mut h = harness(false, false, None);
        h.controller
            .start(RecordingRequest::new("clip", false))
            .await
            .unwrap();
        h.capture
            .deliver(CaptureFrame::video(Duration::ZERO, vec![0; 16]));
        let probe = Arc::clone(&h.probe);
        wait_for(move || probe.video_frames.load(Ordering::SeqCst) == 1).await;

        let receipt = h.controller.stop().await.unwrap();
        receipt.completion.await.unwrap().unwrap();

        // Once the pump exits, delivery fails; nothing reaches the track
        // either way because the tracks are already finished
        let capture = Arc::clone(&h.capture);
        wait_for(move || {
            !capture.deliver(CaptureFrame::video(Duration::from_secs(1), vec![0; 16]))
        })
        .await;
        assert_eq!(h.probe.video_frames.load(Ordering::SeqCst), 1);
    }
}
