//! WAV encoding and decoding for integer PCM.

use crate::FormatError;
use opl_ir::PcmFormat;
use std::io::Write;

const HEADER_LEN: usize = 44;
const FORMAT_PCM: u16 = 1;

// --- Writing ---

/// Write `pcm` (interleaved little-endian samples in `format`) as a WAV file.
pub fn write_wav(w: &mut impl Write, pcm: &[u8], format: PcmFormat) -> std::io::Result<()> {
    w.write_all(&header(pcm.len() as u32, format))?;
    w.write_all(pcm)
}

/// Encode `pcm` as an in-memory WAV file.
pub fn pcm_to_wav(pcm: &[u8], format: PcmFormat) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + pcm.len());
    buf.extend_from_slice(&header(pcm.len() as u32, format));
    buf.extend_from_slice(pcm);
    buf
}

fn header(data_size: u32, format: PcmFormat) -> [u8; HEADER_LEN] {
    let bits_per_sample = format.sample_width as u16 * 8;
    let block_align = format.block_align() as u16;

    let mut h = [0u8; HEADER_LEN];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    h[22..24].copy_from_slice(&format.channels.to_le_bytes());
    h[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    h[32..34].copy_from_slice(&block_align.to_le_bytes());
    h[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_size.to_le_bytes());
    h
}

// --- Reading ---

/// A decoded WAV file: its layout and raw sample bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WavData {
    pub format: PcmFormat,
    pub pcm: Vec<u8>,
}

impl WavData {
    /// Number of whole frames in `pcm`.
    pub fn frames(&self) -> usize {
        match self.format.block_align() {
            0 => 0,
            align => self.pcm.len() / align,
        }
    }
}

/// Load a WAV file from raw bytes.
pub fn load_wav(data: &[u8]) -> Result<WavData, FormatError> {
    if data.len() < HEADER_LEN {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;

        if chunk_id == b"fmt " && chunk_size >= 16 && pos + 24 <= data.len() {
            let format_tag = read_u16_le(data, pos + 8);
            let channels = read_u16_le(data, pos + 10);
            let rate = read_u32_le(data, pos + 12);
            let bits = read_u16_le(data, pos + 22);
            fmt = Some((format_tag, channels, rate, bits));
        } else if chunk_id == b"data" {
            data_chunk = Some((pos + 8, chunk_size));
        }

        pos += 8 + chunk_size;
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let (format_tag, channels, sample_rate, bits) = fmt.ok_or(FormatError::InvalidHeader)?;
    let (offset, size) = data_chunk.ok_or(FormatError::InvalidHeader)?;

    if format_tag != FORMAT_PCM || (bits != 8 && bits != 16) || !(1..=2).contains(&channels) {
        return Err(FormatError::UnsupportedWav {
            format_tag,
            bits,
            channels,
        });
    }

    let end = (offset + size).min(data.len());
    Ok(WavData {
        format: PcmFormat {
            sample_rate,
            sample_width: (bits / 8) as u8,
            channels,
        },
        pcm: data[offset..end].to_vec(),
    })
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn header_layout() {
        let wav = pcm_to_wav(&pcm(&[1, 2, 3, 4]), PcmFormat::stereo16(49716));
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(read_u32_le(&wav, 4), 36 + 8);
        assert_eq!(read_u16_le(&wav, 22), 2);
        assert_eq!(read_u32_le(&wav, 24), 49716);
        assert_eq!(read_u32_le(&wav, 28), 49716 * 4);
        assert_eq!(read_u16_le(&wav, 32), 4);
        assert_eq!(read_u16_le(&wav, 34), 16);
        assert_eq!(read_u32_le(&wav, 40), 8);
    }

    #[test]
    fn writer_matches_in_memory_encoding() {
        let data = pcm(&[100, -100, 200, -200]);
        let format = PcmFormat::stereo16(44100);
        let mut out = Vec::new();
        write_wav(&mut out, &data, format).unwrap();
        assert_eq!(out, pcm_to_wav(&data, format));
    }

    #[test]
    fn load_returns_format_and_samples() {
        let data = pcm(&[100, 200, -100, -200]);
        let format = PcmFormat::stereo16(44100);
        let wav = load_wav(&pcm_to_wav(&data, format)).unwrap();
        assert_eq!(wav.format, format);
        assert_eq!(wav.pcm, data);
        assert_eq!(wav.frames(), 2);
    }

    #[test]
    fn skips_unknown_chunks() {
        let format = PcmFormat::stereo16(22050);
        let plain = pcm_to_wav(&pcm(&[7, 7]), format);
        let mut wav = plain[..36].to_vec();
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&3u32.to_le_bytes());
        wav.extend_from_slice(&[1, 2, 3, 0]);
        wav.extend_from_slice(&plain[36..]);
        assert_eq!(load_wav(&wav).unwrap().pcm, pcm(&[7, 7]));
    }

    #[test]
    fn float_wav_rejected() {
        let mut wav = pcm_to_wav(&pcm(&[0, 0]), PcmFormat::stereo16(8000));
        wav[20] = 3;
        assert!(matches!(
            load_wav(&wav),
            Err(FormatError::UnsupportedWav { format_tag: 3, .. })
        ));
    }

    #[test]
    fn invalid_header_rejected() {
        assert!(matches!(load_wav(&[0; 44]), Err(FormatError::InvalidHeader)));
    }

    #[test]
    fn too_short_rejected() {
        assert!(matches!(load_wav(&[0; 10]), Err(FormatError::UnexpectedEof)));
    }
}
