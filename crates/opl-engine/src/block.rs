//! Interleaved PCM block handed from synth to sink.

use crate::frame::Frame;

/// A fixed-size buffer of interleaved 16-bit samples.
///
/// `samples[frame * channels + ch]` is the sample for channel `ch` at `frame`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioBlock {
    samples: Vec<i16>,
    channels: u16,
}

impl AudioBlock {
    /// Create a silent block of `frames` frames.
    pub fn new(frames: usize, channels: u16) -> Self {
        Self {
            samples: vec![0; frames * channels as usize],
            channels,
        }
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Mutable interleaved samples.
    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    /// Store a stereo frame. Mono blocks keep the left channel.
    pub fn set_frame(&mut self, index: usize, frame: Frame) {
        match self.channels {
            1 => self.samples[index] = frame.left,
            _ => {
                let base = index * self.channels as usize;
                self.samples[base] = frame.left;
                self.samples[base + 1] = frame.right;
            }
        }
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        self.samples.fill(0);
    }

    /// Append the block as little-endian PCM bytes.
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        out.reserve(self.samples.len() * 2);
        for sample in &self.samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let block = AudioBlock::new(4, 2);
        assert_eq!(block.frames(), 4);
        assert_eq!(block.samples().len(), 8);
        assert!(block.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn set_frame_interleaves() {
        let mut block = AudioBlock::new(2, 2);
        block.set_frame(1, Frame { left: 5, right: -5 });
        assert_eq!(block.samples(), &[0, 0, 5, -5]);
    }

    #[test]
    fn mono_keeps_left() {
        let mut block = AudioBlock::new(2, 1);
        block.set_frame(0, Frame { left: 7, right: 9 });
        assert_eq!(block.samples(), &[7, 0]);
    }

    #[test]
    fn le_bytes() {
        let mut block = AudioBlock::new(1, 2);
        block.set_frame(0, Frame { left: 0x0102, right: -2 });
        let mut out = Vec::new();
        block.write_le_bytes(&mut out);
        assert_eq!(out, vec![0x02, 0x01, 0xFE, 0xFF]);
    }
}
