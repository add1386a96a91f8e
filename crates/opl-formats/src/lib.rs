//! Command-stream parsers for oplplay.
//!
//! Parses IMF and DRO v2 captures into [`opl_ir::Instruction`] streams, and
//! encodes rendered PCM as WAV.

mod dro_format;
mod imf_format;
mod wav_format;

pub use dro_format::{DroHardware, DroInfo, DroReader, DRO_MAGIC, DRO_SAMPLE_RATE};
pub use imf_format::{ImfInfo, ImfReader, ImfTickRate};
pub use wav_format::{load_wav, pcm_to_wav, write_wav, WavData};

/// Error type for format parsing.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid file header")]
    InvalidHeader,
    /// Unexpected end of file inside a fixed header
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Unsupported format version (major, minor)
    #[error("unsupported version {0}.{1}")]
    UnsupportedVersion(u16, u16),
    /// The DRO code map is longer than the file
    #[error("code map declares {declared} entries but only {available} bytes remain")]
    CodeMapTruncated { declared: usize, available: usize },
    /// A DRO register code past the end of the code map
    #[error("register code {0:#04x} is not in the code map")]
    InvalidRegisterCode(u8),
    /// WAV encoding other than 8/16-bit integer PCM, mono or stereo
    #[error("unsupported WAV encoding: format {format_tag}, {bits} bits, {channels} channels")]
    UnsupportedWav { format_tag: u16, bits: u16, channels: u16 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<binrw::Error> for FormatError {
    fn from(err: binrw::Error) -> Self {
        if err.is_eof() {
            return FormatError::UnexpectedEof;
        }
        match err {
            binrw::Error::Io(e) => FormatError::Io(e),
            binrw::Error::Backtrace(bt) => (*bt.error).into(),
            _ => FormatError::InvalidHeader,
        }
    }
}
