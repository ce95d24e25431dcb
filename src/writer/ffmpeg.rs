//! FFmpeg container backend
//!
//! Production [`WriterBackend`]: an FFmpeg child process encodes raw BGRA
//! video delivered over stdin, while microphone PCM is spooled to a WAV
//! scratch file. Finalize waits for the encoder and, when audio was
//! captured, runs a second FFmpeg pass that muxes the video stream with the
//! AAC-encoded audio into the final container.
//!
//! Appends go through bounded channels drained by feeder threads, so the
//! append path is a readiness check plus a non-blocking send.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::utils::error::WriterError;
use crate::writer::backend::{
    AudioFormat, ContainerControl, OpenedContainer, OutputSpec, TrackSink, WriterBackend,
    VIDEO_BITRATE,
};

/// Depth of each track queue, in payloads
const TRACK_QUEUE_DEPTH: usize = 120;

/// FFmpeg-based container writer factory
pub struct FfmpegBackend {
    binary: PathBuf,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Use a specific ffmpeg binary instead of resolving from PATH
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterBackend for FfmpegBackend {
    fn open(&self, spec: &OutputSpec) -> Result<OpenedContainer, WriterError> {
        // Fail fast on an unwritable target before any process is spawned
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&spec.path)
            .map_err(|e| WriterError::OutputOpen(format!("{}: {e}", spec.path.display())))?;

        let scratch = if spec.wants_audio() {
            let dir = tempfile::Builder::new()
                .prefix("screenrec-")
                .tempdir()
                .map_err(|e| WriterError::OutputOpen(format!("scratch dir: {e}")))?;
            Some(Scratch {
                video_target: dir.path().join("video.mp4"),
                wav_path: dir.path().join("mic.wav"),
                _dir: dir,
            })
        } else {
            None
        };

        let video_target = scratch
            .as_ref()
            .map(|s| s.video_target.clone())
            .unwrap_or_else(|| spec.path.clone());

        let args = record_args(spec, &video_target);
        tracing::debug!(?args, "Starting FFmpeg encoder");

        let mut child = spawn_encoder(&self.binary, &args)
            .map_err(|e| WriterError::OutputOpen(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WriterError::OutputOpen("failed to capture FFmpeg stdin".into()))?;

        let shared = Arc::new(SinkShared::default());

        // Video feeder: drain the track queue into the encoder pipe
        let (video_tx, video_rx) = bounded::<SinkItem>(TRACK_QUEUE_DEPTH);
        let video_join = spawn_video_feeder(stdin, video_rx, Arc::clone(&shared));

        // Audio feeder: drain the track queue into the PCM spool
        let first_audio_pts = Arc::new(Mutex::new(None));
        let (audio_sink, audio_join) = match (&scratch, spec.audio) {
            (Some(s), Some(format)) => {
                let (audio_tx, audio_rx) = bounded::<SinkItem>(TRACK_QUEUE_DEPTH);
                let join = spawn_audio_feeder(
                    s.wav_path.clone(),
                    format,
                    audio_rx,
                    Arc::clone(&shared),
                    Arc::clone(&first_audio_pts),
                );
                let sink: Box<dyn TrackSink> =
                    Box::new(ChannelSink::new("audio", audio_tx, Arc::clone(&shared)));
                (Some(sink), Some(join))
            }
            _ => (None, None),
        };

        let video: Box<dyn TrackSink> =
            Box::new(ChannelSink::new("video", video_tx, Arc::clone(&shared)));

        let control = Box::new(FfmpegControl {
            binary: self.binary.clone(),
            child,
            final_path: spec.path.clone(),
            audio: spec.audio,
            scratch,
            video_join: Some(video_join),
            audio_join,
            shared,
            first_audio_pts,
        });

        Ok(OpenedContainer {
            video,
            audio: audio_sink,
            control,
        })
    }
}

/// Scratch files used while an audio track is being captured
struct Scratch {
    /// Held for cleanup; the directory is removed when this drops
    _dir: tempfile::TempDir,
    video_target: PathBuf,
    wav_path: PathBuf,
}

/// One queued track payload
struct SinkItem {
    payload: Vec<u8>,
    pts: Duration,
}

/// Failure slot shared between feeders, sinks, and the control handle
#[derive(Default)]
struct SinkShared {
    failed: AtomicBool,
    error: Mutex<Option<WriterError>>,
}

impl SinkShared {
    fn record_failure(&self, error: WriterError) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            tracing::error!(%error, "Container writer entered failed state");
            *self.error.lock() = Some(error);
        }
    }

    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn latched_error(&self) -> Option<WriterError> {
        self.error.lock().clone()
    }
}

/// Track input backed by a bounded channel to a feeder thread
struct ChannelSink {
    label: &'static str,
    tx: Option<Sender<SinkItem>>,
    shared: Arc<SinkShared>,
    appended: u64,
    last_pts: Duration,
}

impl ChannelSink {
    fn new(label: &'static str, tx: Sender<SinkItem>, shared: Arc<SinkShared>) -> Self {
        Self {
            label,
            tx: Some(tx),
            shared,
            appended: 0,
            last_pts: Duration::ZERO,
        }
    }
}

impl TrackSink for ChannelSink {
    fn is_ready(&self) -> bool {
        if self.shared.is_failed() {
            return false;
        }
        match &self.tx {
            Some(tx) => !tx.is_full(),
            None => false,
        }
    }

    fn append(&mut self, payload: Vec<u8>, pts: Duration) -> Result<(), WriterError> {
        if let Some(error) = self.shared.latched_error() {
            return Err(error);
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| WriterError::Sink(format!("{} track already finished", self.label)))?;

        match tx.try_send(SinkItem { payload, pts }) {
            Ok(()) => {
                self.appended += 1;
                self.last_pts = pts;
                Ok(())
            }
            // Only the session thread sends, so a full queue should have been
            // caught by is_ready; treat a hit here as a broken invariant.
            Err(TrySendError::Full(_)) => {
                Err(WriterError::Sink(format!("{} track queue overflow", self.label)))
            }
            Err(TrySendError::Disconnected(_)) => Err(self
                .shared
                .latched_error()
                .unwrap_or_else(|| WriterError::Sink(format!("{} feeder gone", self.label)))),
        }
    }

    fn mark_finished(&mut self) {
        if self.tx.take().is_some() {
            tracing::debug!(
                track = self.label,
                payloads = self.appended,
                span_ms = self.last_pts.as_millis() as u64,
                "Track input finished"
            );
        }
    }
}

fn spawn_encoder(binary: &Path, args: &[String]) -> anyhow::Result<Child> {
    Command::new(binary)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start FFmpeg encoder ({})", binary.display()))
}

fn spawn_video_feeder(
    mut stdin: std::process::ChildStdin,
    rx: Receiver<SinkItem>,
    shared: Arc<SinkShared>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("screenrec-video-feed".into())
        .spawn(move || {
            for item in rx {
                if let Err(e) = stdin.write_all(&item.payload) {
                    shared.record_failure(WriterError::Sink(format!("video pipe: {e}")));
                    break;
                }
            }
            // Dropping stdin closes the pipe so the encoder can flush
        })
        .expect("spawn video feeder thread")
}

fn spawn_audio_feeder(
    wav_path: PathBuf,
    format: AudioFormat,
    rx: Receiver<SinkItem>,
    shared: Arc<SinkShared>,
    first_pts: Arc<Mutex<Option<Duration>>>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("screenrec-audio-feed".into())
        .spawn(move || {
            let spec = hound::WavSpec {
                channels: format.channels,
                sample_rate: format.sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = match hound::WavWriter::create(&wav_path, spec) {
                Ok(w) => w,
                Err(e) => {
                    shared.record_failure(WriterError::Sink(format!("audio spool: {e}")));
                    return;
                }
            };

            'feed: for item in rx {
                first_pts.lock().get_or_insert(item.pts);
                for sample in item.payload.chunks_exact(2) {
                    let value = i16::from_le_bytes([sample[0], sample[1]]);
                    if let Err(e) = writer.write_sample(value) {
                        shared.record_failure(WriterError::Sink(format!("audio spool: {e}")));
                        break 'feed;
                    }
                }
            }

            if let Err(e) = writer.finalize() {
                shared.record_failure(WriterError::Sink(format!("audio spool finalize: {e}")));
            }
        })
        .expect("spawn audio feeder thread")
}

/// Finalize/discard handle for an open FFmpeg container
struct FfmpegControl {
    binary: PathBuf,
    child: Child,
    final_path: PathBuf,
    audio: Option<AudioFormat>,
    scratch: Option<Scratch>,
    video_join: Option<JoinHandle<()>>,
    audio_join: Option<JoinHandle<()>>,
    shared: Arc<SinkShared>,
    first_audio_pts: Arc<Mutex<Option<Duration>>>,
}

impl ContainerControl for FfmpegControl {
    fn finalize(self: Box<Self>) -> Result<(), WriterError> {
        let this = *self;

        // Track channels are closed by mark_finished; feeders drain and exit
        if let Some(join) = this.video_join {
            let _ = join.join();
        }
        if let Some(join) = this.audio_join {
            let _ = join.join();
        }

        let output = this
            .child
            .wait_with_output()
            .map_err(|e| WriterError::Finalize(format!("waiting for encoder: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WriterError::Finalize(format!(
                "encoder exited with {}: {}",
                output.status,
                tail(&stderr)
            )));
        }

        if let (Some(scratch), Some(format)) = (&this.scratch, this.audio) {
            let offset = this.first_audio_pts.lock().unwrap_or_default();
            let args = mux_args(
                &scratch.video_target,
                &scratch.wav_path,
                offset,
                format,
                &this.final_path,
            );
            tracing::debug!(?args, "Muxing audio track into container");

            let muxed = run_muxer(&this.binary, &args)
                .map_err(|e| WriterError::Finalize(e.to_string()))?;
            if !muxed.status.success() {
                let stderr = String::from_utf8_lossy(&muxed.stderr);
                return Err(WriterError::Finalize(format!(
                    "muxer exited with {}: {}",
                    muxed.status,
                    tail(&stderr)
                )));
            }
        }

        // A pipe failure recorded by a feeder outranks a clean-looking exit
        if let Some(error) = this.shared.latched_error() {
            return Err(error);
        }

        tracing::info!(path = %this.final_path.display(), "Container finalized");
        Ok(())
    }

    fn discard(self: Box<Self>) {
        let mut this = *self;
        let _ = this.child.kill();
        if let Some(join) = this.video_join.take() {
            let _ = join.join();
        }
        if let Some(join) = this.audio_join.take() {
            let _ = join.join();
        }
        let _ = this.child.wait();
        if let Err(e) = std::fs::remove_file(&this.final_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %this.final_path.display(), error = %e, "Failed to remove partial output");
            }
        }
        tracing::debug!(path = %this.final_path.display(), "Container discarded");
        // Dropping `scratch` removes the temp dir
    }
}

fn run_muxer(binary: &Path, args: &[String]) -> anyhow::Result<std::process::Output> {
    Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("failed to run FFmpeg muxer ({})", binary.display()))
}

/// Encoder arguments for the recording pass
///
/// Raw BGRA frames arrive on stdin at the nominal track fps. With no audio
/// track the single consumer is served with cheap intraframe MJPEG; with
/// audio, H.264 at a bounded bitrate so both tracks stay demultiplexable by
/// stock players.
fn record_args(spec: &OutputSpec, video_target: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "bgra".to_string(),
        "-s".to_string(),
        format!("{}x{}", spec.video.width, spec.video.height),
        "-r".to_string(),
        spec.video.fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
    ];

    if spec.wants_audio() {
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-b:v".to_string(),
            VIDEO_BITRATE.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
    } else {
        args.extend([
            "-c:v".to_string(),
            "mjpeg".to_string(),
            "-q:v".to_string(),
            "4".to_string(),
            "-pix_fmt".to_string(),
            "yuvj420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
    }

    args.push(video_target.to_string_lossy().to_string());
    args
}

/// Muxer arguments for the audio pass
///
/// Copies the already-encoded video stream, encodes the PCM spool to AAC,
/// and offsets the audio by the first audio timestamp relative to the
/// session anchor.
fn mux_args(
    video: &Path,
    audio: &Path,
    offset: Duration,
    format: AudioFormat,
    out: &Path,
) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-itsoffset".to_string(),
        format!("{:.3}", offset.as_secs_f64()),
        "-i".to_string(),
        audio.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-ar".to_string(),
        format.sample_rate.to_string(),
        "-ac".to_string(),
        format.channels.to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.to_string_lossy().to_string(),
    ]
}

fn tail(text: &str) -> &str {
    let trimmed = text.trim_end();
    match trimmed.char_indices().rev().nth(399) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}
