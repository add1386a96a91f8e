//! A channel: two operators plus feedback, connection and output routing.

use super::operator::{Operator, Rates};
use super::tables::{SHIFT_KEYCODE, SHIFT_KSLBASE};

/// How a channel combines its operators; the four-operator modes span two
/// consecutive internal channels, rhythm mode spans three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum SynthMode {
    Am2,
    Fm2,
    Am3,
    Fm3,
    FmFm,
    AmFm,
    FmAm,
    AmAm,
    Percussion2,
    Percussion3,
}

impl SynthMode {
    /// Internal channels consumed by one block of this mode.
    pub fn channels(self) -> usize {
        match self {
            SynthMode::FmFm | SynthMode::AmFm | SynthMode::FmAm | SynthMode::AmAm => 2,
            SynthMode::Percussion2 | SynthMode::Percussion3 => 3,
            _ => 1,
        }
    }

    /// Writes interleaved stereo rather than mono.
    pub fn is_stereo(self) -> bool {
        !matches!(self, SynthMode::Am2 | SynthMode::Fm2 | SynthMode::Percussion2)
    }
}

#[derive(Clone, Debug)]
pub(super) struct Channel {
    pub ops: [Operator; 2],
    pub mode: SynthMode,
    pub chan_data: u32,
    pub old: [i32; 2],
    pub feedback: u8,
    pub reg_b0: u8,
    pub reg_c0: u8,
    /// Four-operator enable bit in 0x104; 0x80 marks the second channel of a
    /// pair, 0x40 the rhythm channels.
    pub four_mask: u8,
    pub mask_left: i32,
    pub mask_right: i32,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            ops: [Operator::default(), Operator::default()],
            mode: SynthMode::Fm2,
            chan_data: 0,
            old: [0, 0],
            feedback: 31,
            reg_b0: 0,
            reg_c0: 0,
            four_mask: 0,
            mask_left: -1,
            mask_right: -1,
        }
    }
}

impl Channel {
    /// Store new frequency, key code and key scale data and push the parts
    /// that changed to both operators.
    pub fn set_chan_data(&mut self, rates: &Rates, data: u32) {
        let change = self.chan_data ^ data;
        self.chan_data = data;
        for op in &mut self.ops {
            op.chan_data = data;
            op.update_frequency();
        }
        if change & (0xff << SHIFT_KSLBASE) != 0 {
            for op in &mut self.ops {
                op.update_attenuation();
            }
        }
        if change & (0xff << SHIFT_KEYCODE) != 0 {
            for op in &mut self.ops {
                op.update_rates(rates);
            }
        }
    }

    /// Feedback shift from the 0xC0 feedback field: 0 disables it.
    pub fn feedback_shift(reg_c0: u8) -> u8 {
        let fb = (reg_c0 >> 1) & 7;
        if fb != 0 {
            9 - fb
        } else {
            31
        }
    }

    /// Run the first operator with self feedback and return the older of the
    /// two stored outputs.
    pub fn feedback_sample(&mut self) -> i32 {
        // unsigned shift so a shift of 31 clears every bit
        let modulation = (self.old[0].wrapping_add(self.old[1]) as u32 >> self.feedback) as i32;
        self.old[0] = self.old[1];
        self.old[1] = self.ops[0].sample(modulation);
        self.old[0]
    }
}

