use std::path::PathBuf;

use opl_audio::AudioError;
use opl_engine::{EngineError, SessionError};
use opl_formats::FormatError;

/// Errors surfaced by the [`Controller`](crate::Controller).
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("no song loaded")]
    NoSong,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The playback thread exited before reporting whether the device opened.
    #[error("playback thread did not start")]
    NotStarted,

    /// The playback thread panicked; carries the panic message when it was
    /// a string.
    #[error("playback thread panicked: {0}")]
    PlaybackPanicked(String),
}
