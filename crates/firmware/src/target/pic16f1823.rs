use bitflags::bitflags;

use super::{ConfigWord, Pin, Target};
use crate::Hardware;

const PORTC: u16 = 0x00E;
const TRISC: u16 = 0x08E;
const ANSELC: u16 = 0x18E;

const CONFIG1_ADDR: u16 = 0x8007;

bitflags! {
    /// CONFIG1 bits. A programmed (cleared) bit selects the non-default option.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Config1: u16 {
        const FOSC = 0b111;
        const WDTE = 0b11 << 3;
        const PWRTE = 1 << 5;
        const MCLRE = 1 << 6;
        const CP = 1 << 7;
        const CPD = 1 << 8;
        const BOREN = 0b11 << 9;
        const CLKOUTEN = 1 << 11;
        const IESO = 1 << 12;
        const FCMEN = 1 << 13;
    }
}

/// WDTE = 00: watchdog disabled. Everything else stays erased.
const CONFIG1: Config1 = Config1::all().difference(Config1::WDTE);

const _: () = assert!(!CONFIG1.intersects(Config1::WDTE));

/// PIC16F1823, LED on RC0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pic16f1823;

impl Target for Pic16f1823 {
    const NAME: &'static str = "pic16f1823";
    const LED: Pin = Pin::new(PORTC, 0);
    const CONFIG: ConfigWord = ConfigWord {
        address: CONFIG1_ADDR,
        value: CONFIG1.bits(),
    };

    fn init<H: Hardware>(hw: &mut H) {
        // Port C pins come up analog; digital reads of an analog pin return 0.
        hw.write(ANSELC, 0x00);
        hw.write(TRISC, 0x00);
        hw.set_bits(Self::LED.port, Self::LED.mask());
    }

    fn watchdog_enabled(config: u16) -> bool {
        Config1::from_bits_retain(config).intersects(Config1::WDTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_word_value() {
        assert_eq!(Pic16f1823::CONFIG.value, 0x3FE7);
        assert_eq!(Pic16f1823::CONFIG.address, 0x8007);
        assert!(!Pic16f1823::watchdog_enabled(Pic16f1823::CONFIG.value));
    }

    #[test]
    fn test_watchdog_decode() {
        assert!(Pic16f1823::watchdog_enabled(0x3FFF));
        // SWDTEN-controlled and enabled-while-running both count as on.
        assert!(Pic16f1823::watchdog_enabled(0x3FEF));
        assert!(Pic16f1823::watchdog_enabled(0x3FF7));
    }
}
