//! Recording system module
//!
//! - `controller` — the capture session controller and frame pump
//! - `state` — controller phase machine, request and receipt types

pub mod controller;
pub mod state;

pub use controller::RecorderController;
pub use state::{RecorderPhase, RecordingRequest, StopReceipt};
