use bitflags::bitflags;

use super::{ConfigWord, Pin, Target};
use crate::Hardware;

const PORTB: u16 = 0x006;
const TRISB: u16 = 0x086;

const CONFIG_ADDR: u16 = 0x2007;

bitflags! {
    /// Configuration word bits. FOSC is split across bits 4, 1 and 0.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Config: u16 {
        const FOSC0 = 1 << 0;
        const FOSC1 = 1 << 1;
        const WDTE = 1 << 2;
        const PWRTE = 1 << 3;
        const FOSC2 = 1 << 4;
        const MCLRE = 1 << 5;
        const BOREN = 1 << 6;
        const LVP = 1 << 7;
        const CPD = 1 << 8;
        const UNIMPLEMENTED = 0b1_1111 << 9;
        const CP = 1 << 13;
    }
}

/// INTOSC with RA6/RA7 as I/O (FOSC = 100), watchdog off, LVP off.
const CONFIG: Config = Config::all()
    .difference(Config::FOSC1)
    .difference(Config::FOSC0)
    .difference(Config::WDTE)
    .difference(Config::LVP);

const _: () = assert!(!CONFIG.intersects(Config::WDTE));

/// PIC16F628A, LED on RB0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pic16f628a;

impl Target for Pic16f628a {
    const NAME: &'static str = "pic16f628a";
    const LED: Pin = Pin::new(PORTB, 0);
    const CONFIG: ConfigWord = ConfigWord {
        address: CONFIG_ADDR,
        value: CONFIG.bits(),
    };

    // Port B has no analog function, so there is no digital-mode register.
    fn init<H: Hardware>(hw: &mut H) {
        hw.write(TRISB, 0x00);
        hw.set_bits(Self::LED.port, Self::LED.mask());
    }

    fn watchdog_enabled(config: u16) -> bool {
        Config::from_bits_retain(config).contains(Config::WDTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_word_value() {
        assert_eq!(Pic16f628a::CONFIG.value, 0x3F78);
        assert_eq!(Pic16f628a::CONFIG.address, 0x2007);
        assert!(!Pic16f628a::watchdog_enabled(Pic16f628a::CONFIG.value));
        assert!(Pic16f628a::watchdog_enabled(0x3FFF));
    }
}
