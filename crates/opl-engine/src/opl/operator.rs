//! One FM operator: phase generator, envelope generator and wave lookup.

use super::tables::{
    env_silent, tables, ENV_BITS, ENV_EXTRA, ENV_MAX, ENV_MIN, KSL_SHIFT_TABLE, MASK_KSR, MASK_SUSTAIN,
    MASK_TREMOLO, MASK_VIBRATO, MUL_SH, RATE_MASK, RATE_SH, WAVE_BASE_TABLE, WAVE_MASK_TABLE, WAVE_SH,
    WAVE_START_TABLE,
};

/// Envelope generator stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum EnvelopeState {
    Off = 0,
    Release = 1,
    Sustain = 2,
    Decay = 3,
    Attack = 4,
}

impl EnvelopeState {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Rate tables derived from the output sample rate.
#[derive(Clone, Debug)]
pub(super) struct Rates {
    pub freq_mul: [u32; 16],
    pub linear: [u32; 76],
    pub attack: [u32; 76],
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            freq_mul: [0; 16],
            linear: [0; 76],
            attack: [0; 76],
        }
    }
}

/// Low frequency oscillator outputs applied to every operator of a block.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct Modulation {
    pub tremolo_value: u8,
    pub vibrato_sign: i8,
    pub vibrato_shift: u8,
}

#[derive(Clone, Debug)]
pub(super) struct Operator {
    wave_base: usize,
    wave_mask: u32,
    wave_start: u32,
    wave_index: u32,
    wave_add: u32,
    wave_current: u32,

    pub chan_data: u32,
    freq_mul: u32,
    vibrato: u32,
    sustain_level: i32,
    total_level: i32,
    current_level: u32,
    volume: i32,

    attack_add: u32,
    decay_add: u32,
    release_add: u32,
    rate_index: u32,
    rate_zero: u8,
    key_on: u8,

    reg20: u8,
    reg40: u8,
    reg60: u8,
    reg80: u8,
    reg_e0: u8,

    state: EnvelopeState,
    tremolo_mask: u8,
    vib_strength: u8,
    ksr: u8,
}

impl Default for Operator {
    fn default() -> Self {
        Self {
            wave_base: WAVE_BASE_TABLE[0] as usize,
            wave_mask: u32::from(WAVE_MASK_TABLE[0]),
            wave_start: u32::from(WAVE_START_TABLE[0]) << WAVE_SH,
            wave_index: 0,
            wave_add: 0,
            wave_current: 0,
            chan_data: 0,
            freq_mul: 0,
            vibrato: 0,
            sustain_level: ENV_MAX,
            total_level: ENV_MAX,
            current_level: ENV_MAX as u32,
            volume: ENV_MAX,
            attack_add: 0,
            decay_add: 0,
            release_add: 0,
            rate_index: 0,
            rate_zero: EnvelopeState::Off.bit(),
            key_on: 0,
            reg20: 0,
            reg40: 0,
            reg60: 0,
            reg80: 0,
            reg_e0: 0,
            state: EnvelopeState::Off,
            tremolo_mask: 0,
            vib_strength: 0,
            ksr: 0,
        }
    }
}

impl Operator {
    #[cfg(test)]
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    #[cfg(test)]
    pub fn volume(&self) -> i32 {
        self.volume
    }

    fn set_state(&mut self, state: EnvelopeState) {
        self.state = state;
    }

    /// Attenuation too high to hear and no envelope movement that could
    /// bring it back.
    pub fn silent(&self) -> bool {
        env_silent(self.total_level + self.volume) && self.rate_zero & self.state.bit() != 0
    }

    pub fn update_attack(&mut self, rates: &Rates) {
        let rate = self.reg60 >> 4;
        if rate != 0 {
            let val = (rate << 2) + self.ksr;
            self.attack_add = rates.attack[val as usize];
            self.rate_zero &= !EnvelopeState::Attack.bit();
        } else {
            self.attack_add = 0;
            self.rate_zero |= EnvelopeState::Attack.bit();
        }
    }

    pub fn update_decay(&mut self, rates: &Rates) {
        let rate = self.reg60 & 0xf;
        if rate != 0 {
            let val = (rate << 2) + self.ksr;
            self.decay_add = rates.linear[val as usize];
            self.rate_zero &= !EnvelopeState::Decay.bit();
        } else {
            self.decay_add = 0;
            self.rate_zero |= EnvelopeState::Decay.bit();
        }
    }

    pub fn update_release(&mut self, rates: &Rates) {
        let rate = self.reg80 & 0xf;
        if rate != 0 {
            let val = (rate << 2) + self.ksr;
            self.release_add = rates.linear[val as usize];
            self.rate_zero &= !EnvelopeState::Release.bit();
            if self.reg20 & MASK_SUSTAIN == 0 {
                self.rate_zero &= !EnvelopeState::Sustain.bit();
            }
        } else {
            self.rate_zero |= EnvelopeState::Release.bit();
            self.release_add = 0;
            if self.reg20 & MASK_SUSTAIN == 0 {
                self.rate_zero |= EnvelopeState::Sustain.bit();
            }
        }
    }

    pub fn update_attenuation(&mut self) {
        let ksl_base = (self.chan_data >> 16) & 0xff;
        let tl = u32::from(self.reg40 & 0x3f);
        let ksl_shift = KSL_SHIFT_TABLE[(self.reg40 >> 6) as usize];
        self.total_level = ((tl << (ENV_BITS - 7)) + ((ksl_base << ENV_EXTRA) >> ksl_shift)) as i32;
    }

    pub fn update_frequency(&mut self) {
        let freq = self.chan_data & ((1 << 10) - 1);
        let block = (self.chan_data >> 10) & 0xff;
        self.wave_add = (freq << block).wrapping_mul(self.freq_mul);
        if self.reg20 & MASK_VIBRATO != 0 {
            self.vib_strength = (freq >> 7) as u8;
            self.vibrato = (u32::from(self.vib_strength) << block).wrapping_mul(self.freq_mul);
        } else {
            self.vib_strength = 0;
            self.vibrato = 0;
        }
    }

    pub fn update_rates(&mut self, rates: &Rates) {
        let mut new_ksr = ((self.chan_data >> 24) & 0xff) as u8;
        if self.reg20 & MASK_KSR == 0 {
            new_ksr >>= 2;
        }
        if self.ksr == new_ksr {
            return;
        }
        self.ksr = new_ksr;
        self.update_attack(rates);
        self.update_decay(rates);
        self.update_release(rates);
    }

    fn rate_forward(&mut self, add: u32) -> i32 {
        self.rate_index = self.rate_index.wrapping_add(add);
        let ret = (self.rate_index >> RATE_SH) as i32;
        self.rate_index &= RATE_MASK;
        ret
    }

    /// Step the envelope one sample and return the new attenuation.
    fn step_envelope(&mut self) -> i32 {
        let mut vol = self.volume;
        match self.state {
            EnvelopeState::Off => return ENV_MAX,
            EnvelopeState::Attack => {
                let change = self.rate_forward(self.attack_add);
                if change == 0 {
                    return vol;
                }
                vol = vol.wrapping_add((!vol).wrapping_mul(change) >> 3);
                if vol < ENV_MIN {
                    self.volume = ENV_MIN;
                    self.rate_index = 0;
                    self.set_state(EnvelopeState::Decay);
                    return ENV_MIN;
                }
            }
            EnvelopeState::Decay => {
                vol += self.rate_forward(self.decay_add);
                if vol >= self.sustain_level {
                    if vol >= ENV_MAX {
                        self.volume = ENV_MAX;
                        self.set_state(EnvelopeState::Off);
                        return ENV_MAX;
                    }
                    self.rate_index = 0;
                    self.set_state(EnvelopeState::Sustain);
                }
            }
            EnvelopeState::Sustain | EnvelopeState::Release => {
                if self.state == EnvelopeState::Sustain && self.reg20 & MASK_SUSTAIN != 0 {
                    return vol;
                }
                vol += self.rate_forward(self.release_add);
                if vol >= ENV_MAX {
                    self.volume = ENV_MAX;
                    self.set_state(EnvelopeState::Off);
                    return ENV_MAX;
                }
            }
        }
        self.volume = vol;
        vol
    }

    pub fn forward_volume(&mut self) -> i32 {
        self.current_level as i32 + self.step_envelope()
    }

    pub fn forward_wave(&mut self) -> u32 {
        self.wave_index = self.wave_index.wrapping_add(self.wave_current);
        self.wave_index >> WAVE_SH
    }

    pub fn write_20(&mut self, rates: &Rates, val: u8) {
        let change = self.reg20 ^ val;
        if change == 0 {
            return;
        }
        self.reg20 = val;
        self.tremolo_mask = if val & MASK_TREMOLO != 0 { 0xff } else { 0 };
        self.tremolo_mask &= !((1u8 << ENV_EXTRA) - 1);
        if change & MASK_KSR != 0 {
            self.update_rates(rates);
        }
        if self.reg20 & MASK_SUSTAIN != 0 || self.release_add == 0 {
            self.rate_zero |= EnvelopeState::Sustain.bit();
        } else {
            self.rate_zero &= !EnvelopeState::Sustain.bit();
        }
        if change & (0xf | MASK_VIBRATO) != 0 {
            self.freq_mul = rates.freq_mul[(val & 0xf) as usize];
            self.update_frequency();
        }
    }

    pub fn write_40(&mut self, val: u8) {
        if self.reg40 ^ val == 0 {
            return;
        }
        self.reg40 = val;
        self.update_attenuation();
    }

    pub fn write_60(&mut self, rates: &Rates, val: u8) {
        let change = self.reg60 ^ val;
        self.reg60 = val;
        if change & 0x0f != 0 {
            self.update_decay(rates);
        }
        if change & 0xf0 != 0 {
            self.update_attack(rates);
        }
    }

    pub fn write_80(&mut self, rates: &Rates, val: u8) {
        let change = self.reg80 ^ val;
        if change == 0 {
            return;
        }
        self.reg80 = val;
        let mut sustain = val >> 4;
        // sustain level 15 means the bottom of the range
        sustain |= (sustain + 1) & 0x10;
        self.sustain_level = i32::from(sustain) << (ENV_BITS - 5);
        if change & 0x0f != 0 {
            self.update_release(rates);
        }
    }

    /// Select the waveform; `wave_form_mask` is 7 with waveform select
    /// enabled, `opl3_active` is 0xff in OPL3 mode.
    pub fn write_e0(&mut self, wave_form_mask: u8, opl3_active: u8, val: u8) {
        if self.reg_e0 ^ val == 0 {
            return;
        }
        let wave_form = val & ((0x3 & wave_form_mask) | (0x7 & opl3_active));
        self.reg_e0 = val;
        let wave_form = wave_form as usize;
        self.wave_base = WAVE_BASE_TABLE[wave_form] as usize;
        self.wave_start = u32::from(WAVE_START_TABLE[wave_form]) << WAVE_SH;
        self.wave_mask = u32::from(WAVE_MASK_TABLE[wave_form]);
    }

    /// Latch the LFO outputs for the next block.
    pub fn prepare(&mut self, lfo: &Modulation) {
        self.current_level = (self.total_level + i32::from(lfo.tremolo_value & self.tremolo_mask)) as u32;
        self.wave_current = self.wave_add;
        if self.vib_strength >> lfo.vibrato_shift != 0 {
            let neg = i32::from(lfo.vibrato_sign);
            let add = (self.vibrato >> lfo.vibrato_shift) as i32;
            // sign is 0 or -1, so this negates when the LFO is in its low half
            let add = (add ^ neg) - neg;
            self.wave_current = self.wave_current.wrapping_add(add as u32);
        }
    }

    pub fn key_on(&mut self, mask: u8) {
        if self.key_on == 0 {
            self.wave_index = self.wave_start;
            self.rate_index = 0;
            self.set_state(EnvelopeState::Attack);
        }
        self.key_on |= mask;
    }

    pub fn key_off(&mut self, mask: u8) {
        self.key_on &= !mask;
        if self.key_on == 0 && self.state != EnvelopeState::Off {
            self.set_state(EnvelopeState::Release);
        }
    }

    pub fn wave(&self, index: u32, vol: i32) -> i32 {
        let t = tables();
        let sample = i32::from(t.wave[self.wave_base + (index & self.wave_mask) as usize]);
        let gain = i32::from(t.mul[(vol >> ENV_EXTRA) as usize]);
        (sample * gain) >> MUL_SH
    }

    /// Produce one output sample, phase modulated by `modulation`.
    pub fn sample(&mut self, modulation: i32) -> i32 {
        let vol = self.forward_volume();
        if env_silent(vol) {
            self.wave_index = self.wave_index.wrapping_add(self.wave_current);
            return 0;
        }
        let index = self.forward_wave().wrapping_add(modulation as u32);
        self.wave(index, vol)
    }
}
