//! Channel activity tracking for progress display.
//!
//! Purely observational: it watches register writes and never touches the
//! audio path.

use core::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use opl_ir::Bank;

/// Melodic channels shown in the display.
pub const MELODIC_CHANNELS: usize = 9;
/// Rhythm-mode voices shown in the display (HH, CY, TT, SD, BD from bit 0).
pub const PERCUSSION_VOICES: usize = 5;

const PERCUSSION_SHIFT: u16 = MELODIC_CHANNELS as u16;
const PERCUSSION_SEEN: u16 = 1 << 15;
const RHYTHM_REGISTER: u8 = 0xBD;

/// Receives every register write applied to the synth, in order.
pub trait RegisterObserver {
    fn on_register_write(&mut self, bank: Bank, register: u8, value: u8);
}

/// Which registers refresh the display.
///
/// Existing IMF/DRO players use either rule. Only the display is affected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActivityTrigger {
    /// `register & 0xB0 == 0xB0`: key-on/block registers and 0xBD.
    #[default]
    Masked,
    /// `register & 0xB0 != 0`: also reacts to 0x10-0xAF writes.
    AnyBits,
}

impl ActivityTrigger {
    pub fn matches(self, register: u8) -> bool {
        match self {
            ActivityTrigger::Masked => register & 0xB0 == 0xB0,
            ActivityTrigger::AnyBits => register & 0xB0 != 0,
        }
    }
}

/// Activity bits shared with a display thread.
#[derive(Clone, Debug, Default)]
pub struct SharedActivity(Arc<AtomicU16>);

impl SharedActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, bits: u16) {
        self.0.store(bits, Ordering::Relaxed);
    }
}

/// Point-in-time view of the activity flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivitySnapshot(u16);

impl ActivitySnapshot {
    /// Whether melodic channel `channel` (0..9) is keyed on.
    pub fn channel(&self, channel: usize) -> bool {
        channel < MELODIC_CHANNELS && self.0 & (1 << channel) != 0
    }

    /// Whether percussion voice `voice` (0..5) was last triggered.
    pub fn percussion(&self, voice: usize) -> bool {
        voice < PERCUSSION_VOICES && self.0 & (1 << (PERCUSSION_SHIFT + voice as u16)) != 0
    }

    /// Whether rhythm mode has been seen at all.
    pub fn has_percussion(&self) -> bool {
        self.0 & PERCUSSION_SEEN != 0
    }
}

impl fmt::Display for ActivitySnapshot {
    /// Renders as `-_-______ =.=..`; the percussion part appears once rhythm
    /// mode has been enabled.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in 0..MELODIC_CHANNELS {
            f.write_str(if self.channel(ch) { "-" } else { "_" })?;
        }
        if self.has_percussion() {
            f.write_str(" ")?;
            for voice in 0..PERCUSSION_VOICES {
                f.write_str(if self.percussion(voice) { "=" } else { "." })?;
            }
        }
        Ok(())
    }
}

/// Tracks key-on state per channel and rhythm triggers.
#[derive(Clone, Debug, Default)]
pub struct ChannelActivity {
    trigger: ActivityTrigger,
    bits: u16,
    shared: SharedActivity,
}

impl ChannelActivity {
    pub fn new(trigger: ActivityTrigger) -> Self {
        Self {
            trigger,
            ..Self::default()
        }
    }

    /// Handle for reading the flags from another thread.
    pub fn shared(&self) -> SharedActivity {
        self.shared.clone()
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot(self.bits)
    }
}

impl RegisterObserver for ChannelActivity {
    fn on_register_write(&mut self, bank: Bank, register: u8, value: u8) {
        if bank != Bank::Low || !self.trigger.matches(register) {
            return;
        }

        let channel = (register & 0x0F) as usize;
        if channel < MELODIC_CHANNELS {
            if value & 0x20 != 0 {
                self.bits |= 1 << channel;
            } else {
                self.bits &= !(1 << channel);
            }
        }

        if register == RHYTHM_REGISTER && value & 0x20 != 0 {
            let mask = ((1u16 << PERCUSSION_VOICES) - 1) << PERCUSSION_SHIFT;
            self.bits = (self.bits & !mask) | (((value & 0x1F) as u16) << PERCUSSION_SHIFT) | PERCUSSION_SEEN;
        }

        self.shared.store(self.bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_on_and_off_toggle_channel() {
        let mut act = ChannelActivity::new(ActivityTrigger::Masked);
        act.on_register_write(Bank::Low, 0xB3, 0x20);
        assert!(act.snapshot().channel(3));
        act.on_register_write(Bank::Low, 0xB3, 0x00);
        assert!(!act.snapshot().channel(3));
    }

    #[test]
    fn masked_ignores_frequency_registers() {
        let mut act = ChannelActivity::new(ActivityTrigger::Masked);
        act.on_register_write(Bank::Low, 0xA2, 0xFF);
        assert_eq!(act.snapshot(), ActivitySnapshot::default());
    }

    #[test]
    fn any_bits_reacts_to_frequency_registers() {
        let mut act = ChannelActivity::new(ActivityTrigger::AnyBits);
        act.on_register_write(Bank::Low, 0xA2, 0x20);
        assert!(act.snapshot().channel(2));
    }

    #[test]
    fn high_bank_is_ignored() {
        let mut act = ChannelActivity::new(ActivityTrigger::Masked);
        act.on_register_write(Bank::High, 0xB0, 0x20);
        assert!(!act.snapshot().channel(0));
    }

    #[test]
    fn rhythm_register_sets_percussion() {
        let mut act = ChannelActivity::new(ActivityTrigger::Masked);
        act.on_register_write(Bank::Low, 0xBD, 0x20 | 0b10001);
        let snap = act.snapshot();
        assert!(snap.has_percussion());
        assert!(snap.percussion(0));
        assert!(!snap.percussion(1));
        assert!(snap.percussion(4));
    }

    #[test]
    fn rhythm_without_enable_bit_keeps_previous_percussion() {
        let mut act = ChannelActivity::new(ActivityTrigger::Masked);
        act.on_register_write(Bank::Low, 0xBD, 0x20 | 0b00001);
        act.on_register_write(Bank::Low, 0xBD, 0b00110);
        assert!(act.snapshot().percussion(0));
        assert!(!act.snapshot().percussion(1));
    }

    #[test]
    fn display_line() {
        let mut act = ChannelActivity::new(ActivityTrigger::Masked);
        act.on_register_write(Bank::Low, 0xB0, 0x20);
        act.on_register_write(Bank::Low, 0xB2, 0x20);
        assert_eq!(act.snapshot().to_string(), "-_-______");
        act.on_register_write(Bank::Low, 0xBD, 0x20 | 0b00101);
        assert_eq!(act.snapshot().to_string(), "-_-______ =.=..");
    }

    #[test]
    fn shared_handle_sees_updates() {
        let mut act = ChannelActivity::new(ActivityTrigger::Masked);
        let shared = act.shared();
        act.on_register_write(Bank::Low, 0xB8, 0x20);
        assert!(shared.snapshot().channel(8));
    }
}
