//! Container writer seam
//!
//! Types and traits between the writer session and the process that
//! actually muxes media. The production backend lives in
//! [`crate::writer::ffmpeg`]; tests substitute in-memory fakes.

use std::path::PathBuf;
use std::time::Duration;

use crate::utils::error::WriterError;

/// Bounded video bitrate used when an audio track is muxed alongside
pub const VIDEO_BITRATE: u32 = 6_000_000;

/// Consumer audio sample rate for the compressed track
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Stereo audio
pub const AUDIO_CHANNELS: u16 = 2;

/// Video track format, sized to the device screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate the container input is paced at
    pub fps: u32,
}

/// Audio track format (16-bit interleaved PCM in, AAC out)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            channels: AUDIO_CHANNELS,
            sample_rate: AUDIO_SAMPLE_RATE,
        }
    }
}

/// Everything a backend needs to open a container for writing
#[derive(Debug, Clone)]
pub struct OutputSpec {
    /// Final container path
    pub path: PathBuf,

    /// Video track format (always present)
    pub video: VideoFormat,

    /// Audio track format, present iff audio was requested
    pub audio: Option<AudioFormat>,
}

impl OutputSpec {
    pub fn wants_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// A per-track sink that accepts media payloads and reports readiness
///
/// `append` must never block: the session checks `is_ready` first and sheds
/// the frame when the track cannot take more data at this instant.
pub trait TrackSink: Send {
    /// Whether the track can accept another payload right now.
    fn is_ready(&self) -> bool;

    /// Append a payload with its timestamp relative to the session anchor.
    ///
    /// An error here is terminal for the session; transient backpressure is
    /// expressed through `is_ready`, never through `Err`.
    fn append(&mut self, payload: Vec<u8>, pts: Duration) -> Result<(), WriterError>;

    /// Mark the track finished. No appends are accepted afterwards.
    fn mark_finished(&mut self);
}

/// Handle for finalizing or discarding an open container
pub trait ContainerControl: Send {
    /// Flush and close the container. Blocking; run on a blocking task.
    fn finalize(self: Box<Self>) -> Result<(), WriterError>;

    /// Abandon the container and remove partial output.
    fn discard(self: Box<Self>);
}

/// An opened container: track inputs plus the finalize/discard handle
pub struct OpenedContainer {
    pub video: Box<dyn TrackSink>,
    pub audio: Option<Box<dyn TrackSink>>,
    pub control: Box<dyn ContainerControl>,
}

/// Factory for opened containers
pub trait WriterBackend: Send + Sync {
    /// Open the container for writing at `spec.path`.
    ///
    /// Fails with [`WriterError::OutputOpen`] when the path is unwritable or
    /// the container cannot be created.
    fn open(&self, spec: &OutputSpec) -> Result<OpenedContainer, WriterError>;
}
