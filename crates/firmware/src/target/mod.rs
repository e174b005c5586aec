//! Supported chips. The set is closed: `Target` cannot be implemented
//! outside this crate.

mod pic16f1823;
mod pic16f628a;

pub use pic16f1823::{Config1, Pic16f1823};
pub use pic16f628a::{Config, Pic16f628a};

use crate::Hardware;

/// A single port pin: the PORT register address and the bit within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    pub port: u16,
    pub bit: u8,
}

impl Pin {
    pub const fn new(port: u16, bit: u8) -> Self {
        Self { port, bit }
    }

    pub const fn mask(self) -> u8 {
        1 << self.bit
    }
}

/// A configuration word as burned by the programmer.
///
/// `address` is a program-memory word address, outside the user code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigWord {
    pub address: u16,
    pub value: u16,
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Pic16f1823 {}
    impl Sealed for super::Pic16f628a {}
}

pub trait Target: sealed::Sealed {
    /// Lower-case part name, e.g. `pic16f1823`.
    const NAME: &'static str;
    /// The pin wired to the LED.
    const LED: Pin;
    const CONFIG: ConfigWord;

    /// Put the LED port in digital output mode and switch the LED on.
    ///
    /// The direction (and, where present, digital-mode) registers are
    /// written before the first write to the port.
    fn init<H: Hardware>(hw: &mut H);

    /// Whether a configuration word value fails to force the watchdog off.
    /// Software-controlled modes count as enabled.
    fn watchdog_enabled(config: u16) -> bool;
}
