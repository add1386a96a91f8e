//! Normalized instructions produced by the format parsers.

/// Number of addressable synth registers (two banks of 256).
pub const REGISTER_SPACE: u16 = 512;

/// Register bank selector.
///
/// OPL3 exposes a second set of 256 registers; OPL2 captures only use `Low`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Bank {
    #[default]
    Low,
    High,
}

impl Bank {
    /// Bank selected by the top bit of a DRO register code.
    pub const fn from_code(code: u8) -> Self {
        if code & 0x80 != 0 {
            Bank::High
        } else {
            Bank::Low
        }
    }

    /// Numeric index (0 or 1).
    pub const fn index(self) -> u16 {
        match self {
            Bank::Low => 0,
            Bank::High => 1,
        }
    }
}

/// Unit of a delay amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DelayUnit {
    /// Source ticks; duration depends on the file's tick rate.
    Ticks,
    /// Milliseconds.
    Milliseconds,
}

/// A pause between register writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Delay {
    pub amount: u32,
    pub unit: DelayUnit,
}

impl Delay {
    pub const fn ticks(amount: u32) -> Self {
        Self { amount, unit: DelayUnit::Ticks }
    }

    pub const fn millis(amount: u32) -> Self {
        Self { amount, unit: DelayUnit::Milliseconds }
    }
}

/// One step of a command stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Set a synth register.
    RegisterWrite { bank: Bank, register: u8, value: u8 },
    /// Let time pass (render audio).
    Delay(Delay),
}

impl Instruction {
    /// Register write to the low bank.
    pub const fn write(register: u8, value: u8) -> Self {
        Self::RegisterWrite { bank: Bank::Low, register, value }
    }

    /// Register write to an explicit bank.
    pub const fn write_bank(bank: Bank, register: u8, value: u8) -> Self {
        Self::RegisterWrite { bank, register, value }
    }

    /// Synth address for a register write: `(bank << 8) | register`.
    pub const fn address(bank: Bank, register: u8) -> u16 {
        (bank.index() << 8) | register as u16
    }
}
