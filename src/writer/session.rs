//! Writer session state machine
//!
//! One [`WriterSession`] exists per recording. It owns the opened container
//! (one video input, at most one audio input) and drives the status machine
//! `unstarted → writing → finished | failed`. Every operation matches on a
//! tagged state, so the fields valid in each phase are encoded statically.
//!
//! All mutation happens on the single frame-pump task; no locking is needed
//! beyond that discipline.

use std::mem;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::capture::frame::{BufferKind, CaptureFrame};
use crate::utils::error::WriterError;
use crate::writer::backend::{ContainerControl, OpenedContainer, OutputSpec, TrackSink, WriterBackend};

/// Writer status exposed for guards and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    /// Container open, waiting for the first video frame
    Unstarted,
    /// Session clock anchored, frames being appended
    Writing,
    /// Tracks finished, finalize under way or done
    Finished,
    /// Terminal failure; frames are dropped
    Failed,
}

/// Result of a background container finalize
pub type FinalizeHandle = tokio::task::JoinHandle<Result<(), WriterError>>;

struct Tracks {
    video: Box<dyn TrackSink>,
    audio: Option<Box<dyn TrackSink>>,
    control: Box<dyn ContainerControl>,
}

enum State {
    Unstarted(Tracks),
    Writing { tracks: Tracks, anchor: Duration },
    /// Tracks retained until finish/discard releases the container
    Failed(Option<Tracks>),
    Finished,
}

/// The mutable core entity of a recording
pub struct WriterSession {
    id: Uuid,
    output_path: PathBuf,
    state: State,
    last_error: Option<WriterError>,
    accepted: u64,
    dropped: u64,
}

impl WriterSession {
    /// Open the container described by `spec` through `backend`.
    pub fn configure(backend: &dyn WriterBackend, spec: OutputSpec) -> Result<Self, WriterError> {
        let OpenedContainer {
            video,
            audio,
            control,
        } = backend.open(&spec)?;

        let id = Uuid::new_v4();
        tracing::info!(
            session = %id,
            path = %spec.path.display(),
            width = spec.video.width,
            height = spec.video.height,
            audio = spec.audio.is_some(),
            "Container writer opened"
        );

        Ok(Self {
            id,
            output_path: spec.path,
            state: State::Unstarted(Tracks {
                video,
                audio,
                control,
            }),
            last_error: None,
            accepted: 0,
            dropped: 0,
        })
    }

    pub fn status(&self) -> WriterStatus {
        match &self.state {
            State::Unstarted(_) => WriterStatus::Unstarted,
            State::Writing { .. } => WriterStatus::Writing,
            State::Finished => WriterStatus::Finished,
            State::Failed(_) => WriterStatus::Failed,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// The latched mid-stream failure, if any
    pub fn last_error(&self) -> Option<&WriterError> {
        self.last_error.as_ref()
    }

    /// Append a frame to its track. Returns whether the frame was accepted.
    ///
    /// The first video frame observed while unstarted anchors the session
    /// clock and transitions the status to writing. Frames hitting a
    /// not-ready track are shed, not queued.
    pub fn append(&mut self, frame: CaptureFrame) -> bool {
        if matches!(self.state, State::Unstarted(_)) {
            if frame.kind != BufferKind::Video {
                tracing::debug!(session = %self.id, kind = ?frame.kind, "Dropping pre-anchor frame");
                self.dropped += 1;
                return false;
            }
            tracing::info!(
                session = %self.id,
                anchor_ms = frame.pts.as_millis() as u64,
                "First video frame anchors the session clock"
            );
            self.promote_to_writing(frame.pts);
        }

        let mut failure = None;
        let accepted = match &mut self.state {
            State::Writing { tracks, anchor } => {
                let relative = frame.pts.saturating_sub(*anchor);
                let sink = match frame.kind {
                    BufferKind::Video => Some(&mut tracks.video),
                    BufferKind::Microphone => tracks.audio.as_mut(),
                    BufferKind::AppAudio => None,
                };
                match sink {
                    Some(sink) if sink.is_ready() => match sink.append(frame.payload, relative) {
                        Ok(()) => true,
                        Err(error) => {
                            failure = Some(error);
                            false
                        }
                    },
                    Some(_) => {
                        tracing::debug!(
                            session = %self.id,
                            kind = ?frame.kind,
                            "Track not ready; frame shed"
                        );
                        false
                    }
                    None => {
                        tracing::trace!(session = %self.id, kind = ?frame.kind, "Ignoring frame kind");
                        false
                    }
                }
            }
            // Promotion above means this arm is only reachable for
            // finished/failed sessions (and the impossible unstarted case).
            _ => false,
        };

        if let Some(error) = failure {
            tracing::error!(session = %self.id, %error, "Append failed; writer enters failed state");
            self.fail(error);
        }

        if accepted {
            self.accepted += 1;
        } else {
            self.dropped += 1;
        }
        accepted
    }

    /// Mark every active track finished and finalize the container on a
    /// blocking task.
    ///
    /// Idempotent: a second call, or a call when no container is open,
    /// returns `None` and performs no mutation.
    pub fn finish(&mut self) -> Option<FinalizeHandle> {
        let (tracks, next) = match mem::replace(&mut self.state, State::Finished) {
            State::Unstarted(tracks) => (Some(tracks), State::Finished),
            State::Writing { tracks, .. } => (Some(tracks), State::Finished),
            State::Failed(tracks) => (tracks, State::Failed(None)),
            State::Finished => (None, State::Finished),
        };
        self.state = next;

        let mut tracks = tracks?;
        tracks.video.mark_finished();
        if let Some(audio) = tracks.audio.as_mut() {
            audio.mark_finished();
        }
        tracing::info!(
            session = %self.id,
            accepted = self.accepted,
            dropped = self.dropped,
            "Track inputs finished; finalizing container"
        );

        let control = tracks.control;
        Some(tokio::task::spawn_blocking(move || control.finalize()))
    }

    /// Tear down an unfinished session, removing partial output.
    ///
    /// Used when capture failed to start after the container was opened.
    pub fn discard(self) {
        match self.state {
            State::Unstarted(tracks)
            | State::Writing { tracks, .. }
            | State::Failed(Some(tracks)) => {
                let Tracks {
                    video,
                    audio,
                    control,
                } = tracks;
                // Close the track queues so backend feeders exit
                drop(video);
                drop(audio);
                tracing::info!(session = %self.id, "Discarding writer session");
                control.discard();
            }
            State::Failed(None) | State::Finished => {}
        }
    }

    fn promote_to_writing(&mut self, anchor: Duration) {
        if let State::Unstarted(tracks) = mem::replace(&mut self.state, State::Finished) {
            self.state = State::Writing { tracks, anchor };
        }
    }

    fn fail(&mut self, error: WriterError) {
        self.last_error = Some(error);
        if let State::Writing { tracks, .. } | State::Unstarted(tracks) =
            mem::replace(&mut self.state, State::Failed(None))
        {
            self.state = State::Failed(Some(tracks));
        }
    }
}
