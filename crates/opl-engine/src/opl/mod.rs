//! Bundled FM synthesis backend.
//!
//! A register-level OPL2/OPL3 core in the style of the DOSBox DBOPL
//! emulator: 18 two-operator channels, four-operator pairs, rhythm mode,
//! vibrato and tremolo, key scaling, eight waveforms and OPL3 stereo output
//! enables. In OPL2 mode the chip is mono and the sample is copied to both
//! output channels; in OPL3 mode a mono output keeps the left channel.

mod channel;
mod chip;
mod operator;
mod tables;

use opl_ir::{PcmFormat, REGISTER_SPACE};

use crate::block::AudioBlock;
use crate::frame::Frame;
use crate::synth::{EngineError, Synth};

use chip::Chip;

pub use tables::OPL_RATE;

/// Frames generated per pass over the chip.
const GENERATE_FRAMES: usize = 512;

/// Software OPL synth rendering signed 16-bit PCM.
#[derive(Clone, Debug)]
pub struct OplSynth {
    format: PcmFormat,
    chip: Chip,
    registers: [u8; REGISTER_SPACE as usize],
    mix: Vec<i32>,
}

impl OplSynth {
    pub fn new(format: PcmFormat) -> Result<Self, EngineError> {
        if !format.is_supported() {
            return Err(EngineError::unsupported(format));
        }
        Ok(Self {
            format,
            chip: Chip::new(format.sample_rate),
            registers: [0; REGISTER_SPACE as usize],
            mix: vec![0; GENERATE_FRAMES * 2],
        })
    }

    /// Last value written to `address`.
    pub fn register(&self, address: u16) -> u8 {
        self.registers[(address % REGISTER_SPACE) as usize]
    }

    /// Whether OPL3 mode (0x105 bit 0) is on.
    pub fn is_opl3(&self) -> bool {
        self.chip.is_opl3()
    }
}

impl Synth for OplSynth {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn write_register(&mut self, address: u16, value: u8) {
        let address = address % REGISTER_SPACE;
        self.registers[address as usize] = value;
        self.chip.write_reg(address, value);
    }

    fn render(&mut self, block: &mut AudioBlock) {
        let frames = block.frames();
        let mut done = 0;
        while done < frames {
            let count = (frames - done).min(GENERATE_FRAMES);
            let mix = &mut self.mix[..count * 2];
            let stereo = self.chip.is_opl3();
            if stereo {
                self.chip.generate_block_3(count, mix);
            } else {
                self.chip.generate_block_2(count, mix);
            }
            for i in 0..count {
                let frame = if stereo {
                    Frame::from_mix(mix[i * 2], mix[i * 2 + 1])
                } else {
                    Frame::from_mix(mix[i], mix[i])
                };
                block.set_frame(done + i, frame);
            }
            done += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 49716;

    fn synth() -> OplSynth {
        OplSynth::new(PcmFormat::stereo16(RATE)).unwrap()
    }

    /// Sustained sine tone on channel 0 with a fast release.
    fn patch(s: &mut OplSynth) {
        for (reg, val) in [
            (0x20, 0x21),
            (0x23, 0x21),
            (0x40, 0x3F),
            (0x43, 0x00),
            (0x60, 0xF0),
            (0x63, 0xF0),
            (0x80, 0x0F),
            (0x83, 0x0F),
            (0xA0, 0x41),
        ] {
            s.write_register(reg, val);
        }
    }

    fn key_on(s: &mut OplSynth) {
        s.write_register(0xB0, 0x20 | (4 << 2) | 0x01);
    }

    fn render(s: &mut OplSynth, frames: usize) -> AudioBlock {
        let mut block = AudioBlock::new(frames, s.format().channels);
        s.render(&mut block);
        block
    }

    fn peak(block: &AudioBlock) -> u16 {
        block.samples().iter().map(|v| v.unsigned_abs()).max().unwrap_or(0)
    }

    #[test]
    fn rejects_unsupported_format() {
        let format = PcmFormat {
            sample_rate: RATE,
            sample_width: 1,
            channels: 2,
        };
        assert!(matches!(OplSynth::new(format), Err(EngineError::UnsupportedFormat { .. })));
    }

    #[test]
    fn silent_without_key_on() {
        let mut s = synth();
        patch(&mut s);
        let block = render(&mut s, 512);
        assert!(block.samples().iter().all(|&v| v == 0));
    }

    #[test]
    fn key_on_produces_sound() {
        let mut s = synth();
        patch(&mut s);
        key_on(&mut s);
        let block = render(&mut s, 1024);
        assert!(peak(&block) > 3000, "peak {}", peak(&block));
    }

    #[test]
    fn key_off_decays_to_silence() {
        let mut s = synth();
        patch(&mut s);
        key_on(&mut s);
        render(&mut s, 512);
        s.write_register(0xB0, (4 << 2) | 0x01);
        render(&mut s, 4096);
        let block = render(&mut s, 512);
        assert!(block.samples().iter().all(|&v| v == 0));
    }

    #[test]
    fn opl3_pan_left_only() {
        let mut s = synth();
        s.write_register(0x105, 0x01);
        assert!(s.is_opl3());
        patch(&mut s);
        s.write_register(0xC0, 0x10);
        key_on(&mut s);
        let block = render(&mut s, 1024);
        let left = block.samples().iter().step_by(2).any(|&v| v != 0);
        let right = block.samples().iter().skip(1).step_by(2).any(|&v| v != 0);
        assert!(left);
        assert!(!right);
    }

    #[test]
    fn opl2_copies_mono_to_both_sides() {
        let mut s = synth();
        patch(&mut s);
        s.write_register(0xC0, 0x10);
        key_on(&mut s);
        let block = render(&mut s, 256);
        assert!(peak(&block) > 0);
        for pair in block.samples().chunks(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn mono_output() {
        let mut s = OplSynth::new(PcmFormat {
            sample_rate: RATE,
            sample_width: 2,
            channels: 1,
        })
        .unwrap();
        patch(&mut s);
        key_on(&mut s);
        let block = render(&mut s, 1000);
        assert_eq!(block.samples().len(), 1000);
        assert!(block.samples().iter().any(|&v| v != 0));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut a = synth();
        let mut b = synth();
        for s in [&mut a, &mut b] {
            patch(s);
            s.write_register(0xC0, 0x0E);
            key_on(s);
        }
        assert_eq!(render(&mut a, 2048).samples(), render(&mut b, 2048).samples());
    }

    #[test]
    fn block_size_does_not_change_output() {
        let mut whole = synth();
        let mut split = synth();
        for s in [&mut whole, &mut split] {
            patch(s);
            s.write_register(0x20, 0xE1);
            s.write_register(0xBD, 0xC0);
            key_on(s);
        }
        let one = render(&mut whole, 1300);
        let mut joined = render(&mut split, 2).samples().to_vec();
        joined.extend_from_slice(render(&mut split, 700).samples());
        joined.extend_from_slice(render(&mut split, 598).samples());
        assert_eq!(one.samples(), &joined[..]);
    }

    #[test]
    fn rhythm_bass_drum_is_audible() {
        let mut s = synth();
        for (reg, val) in [
            (0x30, 0x01),
            (0x33, 0x01),
            (0x50, 0x3F),
            (0x53, 0x00),
            (0x70, 0xF4),
            (0x73, 0xF4),
            (0xA6, 0x41),
            (0xB6, 0x09),
            (0xBD, 0x30),
        ] {
            s.write_register(reg, val);
        }
        let block = render(&mut s, 1024);
        assert!(peak(&block) > 1000, "peak {}", peak(&block));
    }

    #[test]
    fn registers_read_back() {
        let mut s = synth();
        s.write_register(0x1B0, 0x2A);
        assert_eq!(s.register(0x1B0), 0x2A);
        assert_eq!(s.register(0x0B0), 0);
    }
}
