//! Audio session configuration
//!
//! Recording with microphone audio needs the device audio subsystem set up
//! for simultaneous playback and capture before the capture service starts.
//! Activation is best-effort: a failure is logged by the controller and the
//! recording proceeds without audio guarantees.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::utils::error::AudioConfigError;

/// Injected audio subsystem capability
pub trait AudioSession: Send + Sync {
    /// Configure the audio subsystem for simultaneous playback + capture.
    fn activate_duplex(&self) -> Result<(), AudioConfigError>;
}

/// Audio session backed by the default cpal host
///
/// Verifies that both a playback and a capture device are present and that
/// the capture device advertises a usable default configuration.
pub struct CpalAudioSession;

impl AudioSession for CpalAudioSession {
    fn activate_duplex(&self) -> Result<(), AudioConfigError> {
        let host = cpal::default_host();

        host.default_output_device()
            .ok_or(AudioConfigError::NoOutputDevice)?;

        let input = host
            .default_input_device()
            .ok_or(AudioConfigError::NoInputDevice)?;

        let config = input
            .default_input_config()
            .map_err(|e| AudioConfigError::Unsupported(e.to_string()))?;

        tracing::info!(
            device = %input.name().unwrap_or_else(|_| "<unknown>".to_string()),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            "Audio session ready for simultaneous playback and capture"
        );
        Ok(())
    }
}
