//! Captured media frames and the producer-side delivery handle
//!
//! The platform capture adapter produces [`CaptureFrame`]s on its own
//! thread(s) and hands them to a [`FrameSink`]. The sink marshals every frame
//! onto a single bounded queue whose consumer (the frame pump) is the only
//! context that ever touches writer state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Which stream a captured buffer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Screen video
    Video,
    /// Microphone audio
    Microphone,
    /// Application audio (not recorded, delivered by some platforms anyway)
    AppAudio,
}

/// A single buffer of media data from the capture service
///
/// Produced by the platform capture subsystem and consumed exactly once:
/// either moved into a track input or dropped.
#[derive(Debug)]
pub struct CaptureFrame {
    /// Track kind this buffer belongs to
    pub kind: BufferKind,

    /// Presentation timestamp on the source clock (monotonic)
    pub pts: Duration,

    /// Raw media payload (BGRA pixels for video, 16-bit LE PCM for audio)
    pub payload: Vec<u8>,

    /// Whether the platform reported the buffer data as ready for use
    pub data_ready: bool,
}

impl CaptureFrame {
    /// A ready video frame
    pub fn video(pts: Duration, payload: Vec<u8>) -> Self {
        Self {
            kind: BufferKind::Video,
            pts,
            payload,
            data_ready: true,
        }
    }

    /// A ready microphone frame
    pub fn microphone(pts: Duration, payload: Vec<u8>) -> Self {
        Self {
            kind: BufferKind::Microphone,
            pts,
            payload,
            data_ready: true,
        }
    }

    /// Mark the buffer as not yet ready (skipped by the pump)
    pub fn unready(mut self) -> Self {
        self.data_ready = false;
        self
    }
}

/// Non-blocking producer handle onto the frame queue
///
/// `deliver` never blocks the capture thread: when the queue is full the
/// frame is shed and counted, matching the best-effort capture policy.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<CaptureFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSink {
    pub(crate) fn new(tx: mpsc::Sender<CaptureFrame>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a frame to the consumer. Returns whether it was enqueued.
    pub fn deliver(&self, frame: CaptureFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // Log occasionally to avoid spam
                if dropped % 30 == 1 {
                    tracing::warn!(dropped, "Frame queue full; shedding capture frames");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Frame queue closed; capture frame discarded");
                false
            }
        }
    }

    /// Total frames shed because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_sheds_when_queue_is_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = FrameSink::new(tx);

        assert!(sink.deliver(CaptureFrame::video(Duration::ZERO, vec![0u8; 4])));
        assert!(!sink.deliver(CaptureFrame::video(Duration::from_millis(33), vec![0u8; 4])));
        assert_eq!(sink.dropped(), 1);

        // Draining makes room again
        assert!(rx.try_recv().is_ok());
        assert!(sink.deliver(CaptureFrame::video(Duration::from_millis(66), vec![0u8; 4])));
    }

    #[test]
    fn deliver_reports_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = FrameSink::new(tx);
        assert!(!sink.deliver(CaptureFrame::microphone(Duration::ZERO, vec![])));
        assert_eq!(sink.dropped(), 0);
    }
}
