//! Constants, lookup tables and register layout for the FM core.
//!
//! The wave, multiplier, key-scale and tremolo tables are built once per
//! process behind a `OnceLock` and shared by every chip.

use core::f64::consts::PI;
use std::sync::OnceLock;

/// Native sample rate of the chip: the 14.31818 MHz clock divided by 288.
pub const OPL_RATE: f64 = 14_318_180.0 / 288.0;

pub(super) const TREMOLO_TABLE: usize = 52;

pub(super) const WAVE_BITS: u32 = 10;
pub(super) const WAVE_SH: u32 = 32 - WAVE_BITS;
pub(super) const WAVE_MASK: u32 = (1 << WAVE_SH) - 1;

pub(super) const LFO_SH: u32 = WAVE_SH - 10;
pub(super) const LFO_MAX: u32 = 256 << LFO_SH;

pub(super) const ENV_BITS: u32 = 9;
pub(super) const ENV_MIN: i32 = 0;
pub(super) const ENV_EXTRA: u32 = ENV_BITS - 9;
pub(super) const ENV_MAX: i32 = 511 << ENV_EXTRA;
pub(super) const ENV_LIMIT: i32 = (12 * 256) >> (3 - ENV_EXTRA);

pub(super) const RATE_SH: u32 = 24;
pub(super) const RATE_MASK: u32 = (1 << RATE_SH) - 1;
pub(super) const MUL_SH: u32 = 16;

pub(super) const SHIFT_KSLBASE: u32 = 16;
pub(super) const SHIFT_KEYCODE: u32 = 24;

pub(super) const MASK_KSR: u8 = 0x10;
pub(super) const MASK_SUSTAIN: u8 = 0x20;
pub(super) const MASK_VIBRATO: u8 = 0x40;
pub(super) const MASK_TREMOLO: u8 = 0x80;

/// Whether an attenuation is past the audible range.
pub(super) fn env_silent(level: i32) -> bool {
    level >= ENV_LIMIT
}

pub(super) static KSL_CREATE_TABLE: [u8; 16] = [64, 32, 24, 19, 16, 12, 11, 10, 8, 6, 5, 4, 3, 2, 1, 0];
pub(super) static FREQ_CREATE_TABLE: [u8; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];
pub(super) static ATTACK_SAMPLES_TABLE: [u8; 13] = [69, 55, 46, 40, 35, 29, 23, 20, 19, 15, 11, 10, 9];
pub(super) static ENVELOPE_INCREASE_TABLE: [u8; 13] = [4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32];
pub(super) static VIBRATO_TABLE: [i8; 8] = [1, 0, 1, 30, -127, -128, -127, -98];
pub(super) static KSL_SHIFT_TABLE: [u8; 4] = [31, 1, 2, 0];

pub(super) static WAVE_BASE_TABLE: [u16; 8] = [0x000, 0x200, 0x200, 0x800, 0xa00, 0xc00, 0x100, 0x400];
pub(super) static WAVE_MASK_TABLE: [u16; 8] = [1023, 1023, 511, 511, 1023, 1023, 512, 1023];
pub(super) static WAVE_START_TABLE: [u16; 8] = [512, 0, 0, 0, 0, 512, 512, 256];

/// Shared lookup tables.
pub(super) struct Tables {
    /// Eight waveforms laid out over 4096 signed entries.
    pub wave: [i16; 8 * 512],
    /// Attenuation (in 1/8 dB steps of the envelope) to linear gain.
    pub mul: [u16; 384],
    /// Key scale level base per block and upper frequency bits.
    pub ksl: [u8; 8 * 16],
    pub tremolo: [u8; TREMOLO_TABLE],
}

pub(super) fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(Tables::build)
}

/// `2^(-1 + (255 - s) / 256)`, the exponential shared by the gain and
/// exponential wave tables.
fn exp_curve(s: i32) -> f64 {
    libm::pow(2.0, -1.0 + f64::from(255 - s) / 256.0)
}

impl Tables {
    fn build() -> Self {
        let mut mul = [0u16; 384];
        for (i, m) in mul.iter_mut().enumerate() {
            *m = (0.5 + exp_curve(i as i32 * 8) * f64::from(1u32 << MUL_SH)) as u16;
        }

        let mut wave = [0i16; 8 * 512];
        for i in 0..512 {
            let v = (libm::sin((i as f64 + 0.5) * (PI / 512.0)) * 4084.0) as i16;
            wave[0x200 + i] = v;
            wave[i] = -v;
        }
        for i in 0..256 {
            let v = (0.5 + exp_curve(i as i32 * 8) * 4085.0) as i16;
            wave[0x700 + i] = v;
            wave[0x6ff - i] = -v;
        }
        for i in 0..256 {
            let zero = wave[0];
            wave[0x400 + i] = zero;
            wave[0x500 + i] = zero;
            wave[0x900 + i] = zero;
            wave[0xc00 + i] = zero;
            wave[0xd00 + i] = zero;
            wave[0x800 + i] = wave[0x200 + i];
            wave[0xa00 + i] = wave[0x200 + i * 2];
            wave[0xb00 + i] = wave[i * 2];
            wave[0xe00 + i] = wave[0x200 + i * 2];
            wave[0xf00 + i] = wave[0x200 + i * 2];
        }

        let mut ksl = [0u8; 8 * 16];
        for oct in 0..8 {
            let base = oct as i32 * 8;
            for i in 0..16 {
                let val = (base - i32::from(KSL_CREATE_TABLE[i])).max(0);
                ksl[oct * 16 + i] = (val * 4) as u8;
            }
        }

        let mut tremolo = [0u8; TREMOLO_TABLE];
        for i in 0..TREMOLO_TABLE / 2 {
            let val = (i << ENV_EXTRA) as u8;
            tremolo[i] = val;
            tremolo[TREMOLO_TABLE - 1 - i] = val;
        }

        Self { wave, mul, ksl, tremolo }
    }
}

/// Split an envelope rate (0..76) into an increase-table index and a shift.
pub(super) fn envelope_select(val: u8) -> (usize, u32) {
    if val < 13 * 4 {
        ((val & 3) as usize, 12 - u32::from(val >> 2))
    } else if val < 15 * 4 {
        ((val - 12 * 4) as usize, 0)
    } else {
        (12, 0)
    }
}

/// Map a channel register index (low nibble, 0x10 for the high bank) to an
/// internal channel. Internal channels pair up for four-operator mode:
/// register channels 0 and 3 become 0 and 1.
pub(super) fn channel_slot(index: usize) -> Option<usize> {
    let within = index & 0xf;
    if within >= 9 {
        return None;
    }
    let mut chan = if within < 6 { (within % 3) * 2 + within / 3 } else { within };
    if index & 0x10 != 0 {
        chan += 9;
    }
    Some(chan)
}

/// Map an operator register index (low five bits, 0x20 for the high bank)
/// to `(internal channel, operator)`.
pub(super) fn operator_slot(index: usize) -> Option<(usize, usize)> {
    if index % 8 >= 6 || (index / 8) % 4 == 3 {
        return None;
    }
    let mut chan = (index / 8) * 3 + (index % 8) % 3;
    if chan >= 12 {
        chan += 16 - 12;
    }
    channel_slot(chan).map(|c| (c, (index % 8) / 3))
}
