//! Stream multiplexer/writer
//!
//! - `backend` — the container/track trait seam
//! - `ffmpeg` — the production FFmpeg-backed container writer
//! - `session` — the per-recording writer state machine

pub mod backend;
pub mod ffmpeg;
pub mod session;

pub use backend::{AudioFormat, OutputSpec, VideoFormat, WriterBackend};
pub use ffmpeg::FfmpegBackend;
pub use session::{WriterSession, WriterStatus};
