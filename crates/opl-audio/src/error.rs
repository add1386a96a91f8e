//! Audio error types.

use opl_engine::SinkError;

/// Error type for audio operations.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// No audio device available
    #[error("no audio output device available")]
    NoDevice,
    /// Failed to initialize audio device
    #[error("device init error: {0}")]
    DeviceInit(String),
    /// The device cannot play the requested layout; `device_rate` is the
    /// device's default rate when it is known.
    #[error("device does not support {channels} channels @ {sample_rate} Hz{}", rate_hint(.device_rate))]
    UnsupportedConfig {
        sample_rate: u32,
        channels: u16,
        device_rate: Option<u32>,
    },
    /// Failed to create audio stream
    #[error("stream create error: {0}")]
    StreamCreate(String),
    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),
}

fn rate_hint(device_rate: &Option<u32>) -> String {
    match device_rate {
        Some(rate) => format!(" (device default is {rate} Hz, try --rate {rate})"),
        None => String::new(),
    }
}

impl From<AudioError> for SinkError {
    fn from(err: AudioError) -> Self {
        SinkError::Device(err.to_string())
    }
}
