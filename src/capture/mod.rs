//! Capture boundary
//!
//! Frame types, the injected platform capture service, and the audio
//! session capability.

pub mod audio;
pub mod frame;
pub mod service;

pub use audio::{AudioSession, CpalAudioSession};
pub use frame::{BufferKind, CaptureFrame, FrameSink};
pub use service::CaptureService;
