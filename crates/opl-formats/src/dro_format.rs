//! DOSBox Raw OPL (DRO) v2 capture parser.

use std::io::{ErrorKind, Read, Seek};

use binrw::BinRead;
use opl_ir::{Bank, CodeMap, Delay, Instruction};
use tracing::{debug, warn};

use crate::FormatError;

/// File signature.
pub const DRO_MAGIC: &[u8; 8] = b"DBRAWOPL";

/// Native OPL output rate; DRO captures are rendered at this rate by default.
pub const DRO_SAMPLE_RATE: u32 = 49716;

const SUPPORTED_MAJOR: u16 = 2;

#[derive(BinRead, Debug)]
#[br(little, magic = b"DBRAWOPL")]
struct Signature {
    major: u16,
    minor: u16,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct HeaderV2 {
    length_pairs: u32,
    length_ms: u32,
    hardware_type: u8,
    format: u8,
    compression: u8,
    short_delay_code: u8,
    long_delay_code: u8,
    codemap_length: u8,
}

/// Chip the capture was recorded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DroHardware {
    Opl2,
    DualOpl2,
    Opl3,
    Unknown(u8),
}

impl From<u8> for DroHardware {
    fn from(value: u8) -> Self {
        match value {
            0 => DroHardware::Opl2,
            1 => DroHardware::DualOpl2,
            2 => DroHardware::Opl3,
            other => DroHardware::Unknown(other),
        }
    }
}

/// Header fields, for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroInfo {
    pub version: (u16, u16),
    /// Declared number of (code, value) pairs.
    pub length_pairs: u32,
    /// Declared song length in milliseconds.
    pub length_ms: u32,
    pub hardware: DroHardware,
    pub format: u8,
    pub compression: u8,
    pub short_delay_code: u8,
    pub long_delay_code: u8,
}

/// Streaming DRO v2 parser.
///
/// The header and code map are read eagerly in [`DroReader::new`]; pairs are
/// decoded lazily.
pub struct DroReader<R> {
    reader: R,
    info: DroInfo,
    codes: CodeMap,
    remaining: u32,
    done: bool,
}

impl<R: Read + Seek> DroReader<R> {
    pub fn new(mut reader: R) -> Result<Self, FormatError> {
        let sig = Signature::read(&mut reader)?;
        if sig.major != SUPPORTED_MAJOR {
            return Err(FormatError::UnsupportedVersion(sig.major, sig.minor));
        }
        let header = HeaderV2::read(&mut reader)?;

        let declared = header.codemap_length as usize;
        let mut table = Vec::with_capacity(declared);
        reader.by_ref().take(declared as u64).read_to_end(&mut table)?;
        if table.len() < declared {
            return Err(FormatError::CodeMapTruncated {
                declared,
                available: table.len(),
            });
        }

        let info = DroInfo {
            version: (sig.major, sig.minor),
            length_pairs: header.length_pairs,
            length_ms: header.length_ms,
            hardware: header.hardware_type.into(),
            format: header.format,
            compression: header.compression,
            short_delay_code: header.short_delay_code,
            long_delay_code: header.long_delay_code,
        };
        debug!(
            pairs = info.length_pairs,
            ms = info.length_ms,
            hardware = ?info.hardware,
            codes = declared,
            "DRO header"
        );

        Ok(Self {
            reader,
            remaining: header.length_pairs,
            info,
            codes: CodeMap::new(&table),
            done: false,
        })
    }

    pub fn info(&self) -> &DroInfo {
        &self.info
    }

    pub fn code_map(&self) -> &CodeMap {
        &self.codes
    }

    fn decode(&self, code: u8, value: u8) -> Result<Instruction, FormatError> {
        if code == self.info.short_delay_code {
            return Ok(Instruction::Delay(Delay::millis(value as u32 + 1)));
        }
        if code == self.info.long_delay_code {
            return Ok(Instruction::Delay(Delay::millis((value as u32 + 1) << 8)));
        }
        let register = self
            .codes
            .register(code)
            .ok_or(FormatError::InvalidRegisterCode(code))?;
        Ok(Instruction::write_bank(Bank::from_code(code), register, value))
    }
}

impl<R: Read + Seek> Iterator for DroReader<R> {
    type Item = Result<Instruction, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }

        let mut pair = [0u8; 2];
        if let Err(e) = self.reader.read_exact(&mut pair) {
            self.done = true;
            if e.kind() == ErrorKind::UnexpectedEof {
                warn!(missing = self.remaining, "DRO pair data ends early");
                return None;
            }
            return Some(Err(e.into()));
        }
        self.remaining -= 1;
        Some(self.decode(pair[0], pair[1]))
    }
}
