//! PCM stream layout shared by synth, sinks and WAV encoding.

/// Sample layout of a rendered stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Bytes per sample (per channel).
    pub sample_width: u8,
    /// Interleaved channel count.
    pub channels: u16,
}

impl PcmFormat {
    /// 16-bit stereo at the given rate.
    pub const fn stereo16(sample_rate: u32) -> Self {
        Self { sample_rate, sample_width: 2, channels: 2 }
    }

    /// Bytes per interleaved frame.
    pub const fn block_align(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    /// Bytes per second of audio.
    pub const fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Whether the bundled synth and sinks can produce this layout.
    pub const fn is_supported(&self) -> bool {
        self.sample_width == 2 && (self.channels == 1 || self.channels == 2) && self.sample_rate > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo16_layout() {
        let f = PcmFormat::stereo16(49716);
        assert_eq!(f.block_align(), 4);
        assert_eq!(f.byte_rate(), 49716 * 4);
        assert!(f.is_supported());
    }

    #[test]
    fn unsupported_layouts() {
        assert!(!PcmFormat { sample_rate: 44100, sample_width: 1, channels: 2 }.is_supported());
        assert!(!PcmFormat { sample_rate: 44100, sample_width: 2, channels: 6 }.is_supported());
        assert!(!PcmFormat { sample_rate: 0, sample_width: 2, channels: 2 }.is_supported());
    }
}
