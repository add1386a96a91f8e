//! A loaded capture and the parser that reads it.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use opl_engine::SessionOptions;
use opl_formats::{DroInfo, DroReader, FormatError, ImfInfo, ImfReader, ImfTickRate, DRO_MAGIC, DRO_SAMPLE_RATE};
use opl_ir::Instruction;
use tracing::debug;

/// Default output rate for IMF playback.
pub const IMF_SAMPLE_RATE: u32 = 44100;

/// Boxed instruction stream over an in-memory file.
pub type Instructions = Box<dyn Iterator<Item = Result<Instruction, FormatError>> + Send>;

/// Capture encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SongFormat {
    Imf,
    Dro,
}

impl SongFormat {
    /// `DBRAWOPL` magic means DRO; anything else is treated as IMF.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(DRO_MAGIC) {
            SongFormat::Dro
        } else {
            SongFormat::Imf
        }
    }

    /// Output rate used when none is configured.
    pub fn default_sample_rate(self) -> u32 {
        match self {
            SongFormat::Imf => IMF_SAMPLE_RATE,
            SongFormat::Dro => DRO_SAMPLE_RATE,
        }
    }
}

/// Header details for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SongInfo {
    Imf { info: ImfInfo, tick_rate: ImfTickRate },
    Dro(DroInfo),
}

impl SongInfo {
    pub fn format(&self) -> SongFormat {
        match self {
            SongInfo::Imf { .. } => SongFormat::Imf,
            SongInfo::Dro(_) => SongFormat::Dro,
        }
    }

    /// Length recorded in the file header, if the format has one.
    pub fn declared_duration(&self) -> Option<Duration> {
        match self {
            SongInfo::Imf { .. } => None,
            SongInfo::Dro(info) => Some(Duration::from_millis(info.length_ms as u64)),
        }
    }
}

/// File bytes plus what the header said about them.
#[derive(Clone, Debug)]
pub(crate) struct Song {
    data: Arc<[u8]>,
    info: SongInfo,
}

impl Song {
    /// Detect the format and validate the header.
    pub(crate) fn parse(data: Vec<u8>, tick_rate: ImfTickRate) -> Result<Self, FormatError> {
        let data: Arc<[u8]> = data.into();
        let info = match SongFormat::detect(&data) {
            SongFormat::Dro => SongInfo::Dro(DroReader::new(Cursor::new(data.clone()))?.info().clone()),
            SongFormat::Imf => SongInfo::Imf {
                info: ImfReader::new(Cursor::new(data.clone()))?.info(),
                tick_rate,
            },
        };
        debug!(format = ?info.format(), bytes = data.len(), "song loaded");
        Ok(Self { data, info })
    }

    pub(crate) fn info(&self) -> &SongInfo {
        &self.info
    }

    /// A fresh parser positioned at the first instruction.
    pub(crate) fn instructions(&self) -> Result<Instructions, FormatError> {
        let cursor = Cursor::new(self.data.clone());
        Ok(match self.info.format() {
            SongFormat::Dro => Box::new(DroReader::new(cursor)?),
            SongFormat::Imf => Box::new(ImfReader::new(cursor)?),
        })
    }

    /// Session settings for this song.
    pub(crate) fn session_options(&self, block_frames: usize) -> SessionOptions {
        let options = match &self.info {
            SongInfo::Imf { tick_rate, .. } => SessionOptions::imf(tick_rate.hz()),
            SongInfo::Dro(_) => SessionOptions::dro(),
        };
        SessionOptions {
            block_frames,
            ..options
        }
    }
}
