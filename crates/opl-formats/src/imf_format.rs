//! id Software IMF music parser.
//!
//! A file is a sequence of 4-byte events `register, value, delay (u16 LE)`,
//! optionally preceded by a 2-byte little-endian data length. A zero length
//! prefix means there is no header and the file is events from offset 0.

use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use opl_ir::{Delay, Instruction};
use tracing::{debug, warn};

use crate::FormatError;

const EVENT_LEN: u64 = 4;

/// Tick rate of IMF delays, in Hz.
///
/// Nothing in the file records it; by convention it follows the extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImfTickRate(pub u32);

impl ImfTickRate {
    /// Commander Keen, Duke Nukem II and most others.
    pub const STANDARD: Self = Self(560);
    /// Wolfenstein 3-D (`.wlf`).
    pub const WOLFENSTEIN: Self = Self(700);

    /// Rate implied by a file name: `.wlf` (any case) is 700 Hz, everything
    /// else 560 Hz.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wlf") => Self::WOLFENSTEIN,
            _ => Self::STANDARD,
        }
    }

    pub fn hz(self) -> u32 {
        self.0
    }
}

impl Default for ImfTickRate {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// What the length prefix said about the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImfInfo {
    /// Type 1 (length-prefixed) file.
    pub headered: bool,
    /// Declared event data length in bytes; 0 for header-less files.
    pub data_length: u16,
}

/// Streaming IMF parser.
pub struct ImfReader<R> {
    reader: R,
    info: ImfInfo,
    consumed: u64,
    pending: Option<Instruction>,
    done: bool,
}

impl<R: Read + Seek> ImfReader<R> {
    pub fn new(mut reader: R) -> Result<Self, FormatError> {
        let mut prefix = [0u8; 2];
        let read = read_up_to(&mut reader, &mut prefix)?;
        if read < prefix.len() {
            debug!(bytes = read, "IMF source shorter than its length prefix");
            return Ok(Self::with_info(reader, ImfInfo::default(), true));
        }

        let length = u16::from_le_bytes(prefix);
        let info = if length == 0 {
            reader.seek(SeekFrom::Start(0))?;
            ImfInfo::default()
        } else {
            ImfInfo {
                headered: true,
                data_length: length,
            }
        };
        debug!(headered = info.headered, length, "IMF header");
        Ok(Self::with_info(reader, info, false))
    }

    fn with_info(reader: R, info: ImfInfo, done: bool) -> Self {
        Self {
            reader,
            info,
            consumed: 0,
            pending: None,
            done,
        }
    }

    pub fn info(&self) -> ImfInfo {
        self.info
    }

    fn next_event(&mut self) -> Option<Result<Instruction, FormatError>> {
        if self.info.headered && self.consumed >= self.info.data_length as u64 {
            return None;
        }

        let mut event = [0u8; EVENT_LEN as usize];
        if let Err(e) = self.reader.read_exact(&mut event) {
            self.done = true;
            if e.kind() == ErrorKind::UnexpectedEof {
                if self.info.headered {
                    warn!(
                        declared = self.info.data_length,
                        read = self.consumed,
                        "IMF data ends before its declared length"
                    );
                }
                return None;
            }
            return Some(Err(e.into()));
        }
        self.consumed += EVENT_LEN;

        let [register, value, lo, hi] = event;
        let delay = u16::from_le_bytes([lo, hi]);
        if delay != 0 {
            self.pending = Some(Instruction::Delay(Delay::ticks(delay as u32)));
        }
        Some(Ok(Instruction::write(register, value)))
    }
}

impl<R: Read + Seek> Iterator for ImfReader<R> {
    type Item = Result<Instruction, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(delay) = self.pending.take() {
            return Some(Ok(delay));
        }
        if self.done {
            return None;
        }
        let item = self.next_event();
        if item.is_none() {
            self.done = true;
        }
        item
    }
}

/// Fill as much of `buf` as the source allows.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: &[u8]) -> Vec<Instruction> {
        ImfReader::new(Cursor::new(bytes.to_vec()))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn headerless_file_rewinds() {
        let out = parse(&[0x00, 0x00, 0x00, 0x00, 0xB0, 0x20, 0x0A, 0x00]);
        assert_eq!(
            out,
            vec![
                Instruction::write(0x00, 0x00),
                Instruction::write(0xB0, 0x20),
                Instruction::Delay(Delay::ticks(10)),
            ]
        );
    }

    #[test]
    fn headered_file_is_bounded() {
        // Length 4: one event, then trailing data that must be ignored
        let out = parse(&[0x04, 0x00, 0x20, 0x01, 0x02, 0x00, 0xB0, 0x20, 0x00, 0x00]);
        assert_eq!(
            out,
            vec![Instruction::write(0x20, 0x01), Instruction::Delay(Delay::ticks(2))]
        );
    }

    #[test]
    fn headered_info() {
        let reader = ImfReader::new(Cursor::new(vec![0x08, 0x00, 1, 2, 3, 4])).unwrap();
        assert_eq!(
            reader.info(),
            ImfInfo {
                headered: true,
                data_length: 8
            }
        );
    }

    #[test]
    fn headered_file_ending_early() {
        let out = parse(&[0x10, 0x00, 0x20, 0x01, 0x00, 0x00]);
        assert_eq!(out, vec![Instruction::write(0x20, 0x01)]);
    }

    #[test]
    fn partial_trailing_event_ends_stream() {
        let out = parse(&[0x00, 0x00, 0x00, 0x00, 0xB0, 0x20]);
        assert_eq!(out, vec![Instruction::write(0x00, 0x00)]);
    }

    #[test]
    fn short_source_is_empty() {
        assert!(parse(&[]).is_empty());
        assert!(parse(&[0x05]).is_empty());
    }

    #[test]
    fn large_delay_is_little_endian() {
        let out = parse(&[0x00, 0x00, 0x00, 0x00, 0xA0, 0x44, 0x34, 0x12]);
        assert_eq!(out[2], Instruction::Delay(Delay::ticks(0x1234)));
    }

    #[test]
    fn tick_rate_from_extension() {
        assert_eq!(ImfTickRate::from_path(Path::new("song.wlf")), ImfTickRate::WOLFENSTEIN);
        assert_eq!(ImfTickRate::from_path(Path::new("SONG.WLF")).hz(), 700);
        assert_eq!(ImfTickRate::from_path(Path::new("song.imf")).hz(), 560);
        assert_eq!(ImfTickRate::from_path(Path::new("song")).hz(), 560);
    }
}
