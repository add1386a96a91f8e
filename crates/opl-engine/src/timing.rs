//! Delay → frame count conversion with exact carry.

use opl_ir::{Delay, DelayUnit};

use crate::synth::EngineError;

/// Millisecond delays are expressed against this rate.
pub const MILLIS_PER_SECOND: u32 = 1000;

/// Converts delays into whole frame counts without drift.
///
/// All arithmetic is done on rationals over a common denominator
/// (`lcm(source_tick_rate, 1000)`), so the debt carried between calls is
/// exact. The fractional part of the debt is always in `[0, 1)`; whole
/// frames only stay carried when a delay was too short to render or the
/// renderer handed frames back through [`TimingState::defer`].
#[derive(Clone, Debug)]
pub struct TimingState {
    source_tick_rate: u32,
    sample_rate: u32,
    /// Units per frame.
    denominator: u128,
    /// Carried debt, in `1 / denominator` frames.
    carry: u128,
}

impl TimingState {
    pub fn new(source_tick_rate: u32, sample_rate: u32) -> Result<Self, EngineError> {
        if source_tick_rate == 0 {
            return Err(EngineError::InvalidTickRate);
        }
        let denominator = lcm(source_tick_rate as u128, MILLIS_PER_SECOND as u128);
        Ok(Self {
            source_tick_rate,
            sample_rate,
            denominator,
            carry: 0,
        })
    }

    pub fn source_tick_rate(&self) -> u32 {
        self.source_tick_rate
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames to render for `delay`.
    ///
    /// Returns 0 (keeping the whole amount carried) when fewer than
    /// `min_frames` whole frames are due.
    pub fn convert(&mut self, delay: Delay, min_frames: usize) -> u64 {
        let unit_rate = match delay.unit {
            DelayUnit::Ticks => self.source_tick_rate,
            DelayUnit::Milliseconds => MILLIS_PER_SECOND,
        } as u128;
        let scale = self.denominator / unit_rate;
        let total = delay.amount as u128 * self.sample_rate as u128 * scale + self.carry;

        let frames = total / self.denominator;
        if frames < min_frames as u128 {
            self.carry = total;
            return 0;
        }
        self.carry = total % self.denominator;
        frames as u64
    }

    /// Carry frames that were due but not rendered into the next conversion.
    pub fn defer(&mut self, frames: u64) {
        self.carry += frames as u128 * self.denominator;
    }

    /// Fractional frame carried to the next call, in `[0, 1)`.
    pub fn fractional_remainder(&self) -> f64 {
        (self.carry % self.denominator) as f64 / self.denominator as f64
    }

    /// Whole frames carried to the next call.
    pub fn carried_frames(&self) -> u64 {
        (self.carry / self.denominator) as u64
    }

    /// Total carried debt in frames (whole and fractional).
    pub fn carried(&self) -> f64 {
        self.carried_frames() as f64 + self.fractional_remainder()
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: u128, b: u128) -> u128 {
    a / gcd(a, b) * b
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: usize = 2;

    #[test]
    fn zero_tick_rate_rejected() {
        assert!(matches!(TimingState::new(0, 44100), Err(EngineError::InvalidTickRate)));
    }

    #[test]
    fn ticks_convert_exactly() {
        // 560 ticks = 1 second
        let mut t = TimingState::new(560, 44100).unwrap();
        assert_eq!(t.convert(Delay::ticks(560), MIN), 44100);
        assert_eq!(t.fractional_remainder(), 0.0);
    }

    #[test]
    fn millis_convert_with_remainder() {
        // 10 ms at 49716 Hz = 497.16 frames
        let mut t = TimingState::new(MILLIS_PER_SECOND, 49716).unwrap();
        assert_eq!(t.convert(Delay::millis(10), MIN), 497);
        assert!((t.fractional_remainder() - 0.16).abs() < 1e-9);

        // Remainder carries: 497.16 + 497.16 = 994.32
        assert_eq!(t.convert(Delay::millis(10), MIN), 497);
        assert!((t.fractional_remainder() - 0.32).abs() < 1e-9);
    }

    #[test]
    fn sub_minimum_delay_is_carried_entirely() {
        // 1 tick at 700 Hz, 1000 Hz output = 1.428... frames
        let mut t = TimingState::new(700, 1000).unwrap();
        assert_eq!(t.convert(Delay::ticks(1), MIN), 0);
        assert_eq!(t.carried_frames(), 1);
        assert!((t.carried() - 1000.0 / 700.0).abs() < 1e-9);

        // Next tick catches up: 2.857... frames
        assert_eq!(t.convert(Delay::ticks(1), MIN), 2);
        assert!((t.fractional_remainder() - (2000.0 / 700.0 - 2.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_frame_delay_emits_nothing() {
        let mut t = TimingState::new(560, 44100).unwrap();
        assert_eq!(t.convert(Delay::ticks(0), MIN), 0);
        assert_eq!(t.carried(), 0.0);
    }

    #[test]
    fn deferred_frames_return_next_call() {
        let mut t = TimingState::new(MILLIS_PER_SECOND, 1000).unwrap();
        assert_eq!(t.convert(Delay::millis(5), MIN), 5);
        t.defer(1);
        assert_eq!(t.carried_frames(), 1);
        assert_eq!(t.convert(Delay::millis(5), MIN), 6);
        assert_eq!(t.carried(), 0.0);
    }

    #[test]
    fn mixed_units_share_one_denominator() {
        let mut t = TimingState::new(700, 44100).unwrap();
        // 7 ticks at 700 Hz = 10 ms
        assert_eq!(t.convert(Delay::ticks(7), MIN), 441);
        assert_eq!(t.convert(Delay::millis(10), MIN), 441);
        assert_eq!(t.carried(), 0.0);
    }

    #[test]
    fn long_streams_do_not_drift() {
        // 1 tick at 560 Hz and 49716 Hz output = 88.778... frames per tick
        let mut t = TimingState::new(560, 49716).unwrap();
        let mut emitted: u64 = 0;
        let ticks: u64 = 1_000_000;
        for _ in 0..ticks {
            emitted += t.convert(Delay::ticks(1), MIN);
            assert!(t.fractional_remainder() < 1.0);
        }
        let exact = ticks as u128 * 49716 / 560;
        assert_eq!(emitted as u128 + t.carried_frames() as u128, exact);
        assert!(t.carried() < 2.0);
    }

    #[test]
    fn large_amounts_do_not_overflow() {
        let mut t = TimingState::new(u32::MAX, 384_000).unwrap();
        let frames = t.convert(Delay::ticks(u32::MAX), MIN);
        assert_eq!(frames, 384_000);
    }
}
