//! Blink firmware for 8-bit PIC microcontrollers.
//!
//! The program configures one port as digital output, drives the LED pin
//! high, then toggles it forever with a busy-wait delay in between.
//!
//! The chip is chosen at build time with the `pic16f1823` (default) or
//! `pic16f628a` cargo feature, which fixes [`Selected`]. Both chips burn a
//! configuration word that keeps the watchdog timer off: the loop never
//! clears the watchdog, so an enabled one would reset the part periodically.

#![cfg_attr(not(test), no_std)]

use core::marker::PhantomData;

pub mod registers;
pub mod target;

pub use registers::Registers;
pub use target::{ConfigWord, Pin, Pic16f1823, Pic16f628a, Target};

#[cfg(all(feature = "pic16f1823", feature = "pic16f628a"))]
compile_error!("select exactly one chip feature: `pic16f1823` or `pic16f628a`");

#[cfg(not(any(feature = "pic16f1823", feature = "pic16f628a")))]
compile_error!("no chip feature selected: enable `pic16f1823` or `pic16f628a`");

/// The chip this firmware build targets.
#[cfg(feature = "pic16f1823")]
pub type Selected = Pic16f1823;

/// The chip this firmware build targets.
#[cfg(all(feature = "pic16f628a", not(feature = "pic16f1823")))]
pub type Selected = Pic16f628a;

/// Delay iterations between two LED toggles.
pub const BLINK_DELAY: u16 = 3000;

/// Access to the chip's special function registers.
///
/// Addresses are full data-memory addresses (bank bits included). Register
/// access on the device cannot fail, so none of these return a `Result`.
pub trait Hardware {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    /// Execute a single no-op instruction.
    fn nop(&mut self);

    fn set_bits(&mut self, addr: u16, mask: u8) {
        let value = self.read(addr);
        self.write(addr, value | mask);
    }

    fn toggle_bits(&mut self, addr: u16, mask: u8) {
        let value = self.read(addr);
        self.write(addr, value ^ mask);
    }
}

impl<H: Hardware + ?Sized> Hardware for &mut H {
    fn read(&mut self, addr: u16) -> u8 {
        (**self).read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        (**self).write(addr, value)
    }

    fn nop(&mut self) {
        (**self).nop()
    }
}

/// Busy-wait for `count` no-op iterations.
///
/// Not accurate: the unit is one loop iteration, so the elapsed time depends
/// on the instruction clock and on how the loop compiles.
pub fn delay<H: Hardware>(hw: &mut H, count: u16) {
    for _ in 0..count {
        hw.nop();
    }
}

/// The blink state machine: one LED, toggled on every pass.
pub struct Blinker<T: Target, H: Hardware> {
    hw: H,
    level: bool,
    _target: PhantomData<T>,
}

impl<T: Target, H: Hardware> Blinker<T, H> {
    /// Run the target initializer and take ownership of the hardware.
    /// The LED is on when this returns.
    pub fn init(mut hw: H) -> Self {
        T::init(&mut hw);
        Self {
            hw,
            level: true,
            _target: PhantomData,
        }
    }

    /// Re-enter the program from the top, as the device does after a reset.
    pub fn restart(&mut self) {
        T::init(&mut self.hw);
        self.level = true;
    }

    pub fn toggle(&mut self) {
        let pin = T::LED;
        self.hw.toggle_bits(pin.port, pin.mask());
        self.level = !self.level;
    }

    /// One loop iteration: toggle, then wait.
    pub fn pass(&mut self) {
        self.toggle();
        delay(&mut self.hw, BLINK_DELAY);
    }

    pub fn run(mut self) -> ! {
        loop {
            self.pass();
        }
    }

    /// LED level as last driven by the firmware.
    pub fn level(&self) -> bool {
        self.level
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

/// Firmware entry point for the selected chip.
pub fn run<H: Hardware>(hw: H) -> ! {
    Blinker::<Selected, H>::init(hw).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone, Copy)]
    enum Access {
        Read(u16),
        Write(u16, u8),
    }

    /// Flat register file that records every access.
    struct Recorder {
        regs: [u8; 0x200],
        log: Vec<Access>,
        nops: u32,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                regs: [0xFF; 0x200],
                log: Vec::new(),
                nops: 0,
            }
        }

        fn writes(&self) -> Vec<(u16, u8)> {
            self.log
                .iter()
                .filter_map(|a| match a {
                    Access::Write(addr, value) => Some((*addr, *value)),
                    Access::Read(_) => None,
                })
                .collect()
        }
    }

    impl Hardware for Recorder {
        fn read(&mut self, addr: u16) -> u8 {
            self.log.push(Access::Read(addr));
            self.regs[addr as usize]
        }

        fn write(&mut self, addr: u16, value: u8) {
            self.log.push(Access::Write(addr, value));
            self.regs[addr as usize] = value;
        }

        fn nop(&mut self) {
            self.nops += 1;
        }
    }

    #[test]
    fn test_delay_zero_runs_no_nops() {
        let mut hw = Recorder::new();
        delay(&mut hw, 0);
        assert_eq!(hw.nops, 0);
        assert!(hw.log.is_empty());
    }

    #[test]
    fn test_delay_counts_exactly() {
        let mut hw = Recorder::new();
        delay(&mut hw, 1);
        assert_eq!(hw.nops, 1);
        delay(&mut hw, u16::MAX);
        assert_eq!(hw.nops, 1 + u16::MAX as u32);
    }

    #[test]
    fn test_pic16f1823_init_order() {
        let mut hw = Recorder::new();
        let blinker = Blinker::<Pic16f1823, _>::init(&mut hw);
        assert!(blinker.level());

        let writes = hw.writes();
        assert_eq!(writes[0], (0x18E, 0x00)); // ANSELC
        assert_eq!(writes[1], (0x08E, 0x00)); // TRISC
        assert_eq!(writes[2].0, 0x00E); // PORTC
        assert_eq!(writes[2].1 & 0x01, 0x01);
        assert_eq!(writes.len(), 3);
        assert_eq!(hw.nops, 0);
    }

    #[test]
    fn test_pic16f628a_init_skips_digital_mode() {
        let mut hw = Recorder::new();
        Blinker::<Pic16f628a, _>::init(&mut hw);

        let writes = hw.writes();
        assert_eq!(writes[0], (0x086, 0x00)); // TRISB
        assert_eq!(writes[1].0, 0x006); // PORTB
        assert_eq!(writes.len(), 2);
    }

    #[test]
    fn test_pass_toggles_then_delays() {
        let mut hw = Recorder::new();
        let mut blinker = Blinker::<Pic16f1823, _>::init(&mut hw);
        blinker.pass();
        assert!(!blinker.level());
        blinker.pass();
        assert!(blinker.level());

        assert_eq!(hw.nops, 2 * BLINK_DELAY as u32);
        assert_eq!(hw.regs[0x00E] & 0x01, 0x01);
    }

    #[test]
    fn test_toggle_only_touches_led_bit() {
        let mut hw = Recorder::new();
        let mut blinker = Blinker::<Pic16f628a, _>::init(&mut hw);
        blinker.hardware_mut().regs[0x006] = 0b1010_0001;
        blinker.toggle();
        assert_eq!(hw.regs[0x006], 0b1010_0000);
    }
}
