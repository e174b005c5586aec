use crate::{ResetCause, SimResult, SimulationError};
use picblink_config::{PortConfig, PortResetValues};

/// PIC I/O port: PORTx and TRISx, plus LATx and ANSELx where the chip has
/// them.
///
/// Writes to PORTx land in the output latch. Reads of PORTx go through the
/// digital input buffer: an output pin reads back its latch, while an
/// undriven input pin or a pin left in analog mode reads 0.
#[derive(Debug)]
pub struct PortPeripheral {
    id: String,
    pin_mask: u8,
    port_addr: u16,
    tris_addr: u16,
    lat_addr: Option<u16>,
    ansel_addr: Option<u16>,
    reset_values: PortResetValues,
    tris: u8,
    lat: u8,
    ansel: u8,
}

impl PortPeripheral {
    pub fn new(config: &PortConfig) -> Self {
        let pin_mask = config.pin_mask();
        Self {
            id: config.id.clone(),
            pin_mask,
            port_addr: config.port,
            tris_addr: config.tris,
            lat_addr: config.lat,
            ansel_addr: config.ansel,
            reset_values: config.reset.clone(),
            tris: config.reset.tris & pin_mask,
            lat: 0,
            ansel: config.reset.ansel & pin_mask,
        }
    }

    /// Levels on the package pins. Only pins configured as outputs are
    /// driven; undriven pins are reported low.
    pub fn pins(&self) -> u8 {
        self.lat & !self.tris & self.pin_mask
    }

    /// Value seen by a read of PORTx.
    pub fn port_value(&self) -> u8 {
        self.lat & !self.tris & !self.ansel & self.pin_mask
    }

    pub fn tris(&self) -> u8 {
        self.tris
    }

    pub fn lat(&self) -> u8 {
        self.lat
    }

    pub fn ansel(&self) -> Option<u8> {
        self.ansel_addr.map(|_| self.ansel)
    }

    /// Register values keyed `<port>.<register>`.
    pub fn named_registers(&self) -> Vec<(String, u8)> {
        let mut regs = vec![
            (format!("{}.port", self.id), self.port_value()),
            (format!("{}.tris", self.id), self.tris),
        ];
        if self.lat_addr.is_some() {
            regs.push((format!("{}.lat", self.id), self.lat));
        }
        if let Some(ansel) = self.ansel() {
            regs.push((format!("{}.ansel", self.id), ansel));
        }
        regs
    }
}

impl crate::Peripheral for PortPeripheral {
    fn read(&self, addr: u16) -> SimResult<u8> {
        if addr == self.port_addr {
            Ok(self.port_value())
        } else if addr == self.tris_addr {
            Ok(self.tris)
        } else if Some(addr) == self.lat_addr {
            Ok(self.lat)
        } else if Some(addr) == self.ansel_addr {
            Ok(self.ansel)
        } else {
            Err(SimulationError::MemoryViolation(addr))
        }
    }

    fn write(&mut self, addr: u16, value: u8) -> SimResult<()> {
        let value = value & self.pin_mask;
        if addr == self.port_addr || Some(addr) == self.lat_addr {
            self.lat = value;
        } else if addr == self.tris_addr {
            self.tris = value;
        } else if Some(addr) == self.ansel_addr {
            self.ansel = value;
        } else {
            return Err(SimulationError::MemoryViolation(addr));
        }
        Ok(())
    }

    fn reset(&mut self, cause: ResetCause) {
        self.tris = self.reset_values.tris & self.pin_mask;
        self.ansel = self.reset_values.ansel & self.pin_mask;
        // Latches are undefined at power-on and hold their value otherwise.
        if cause == ResetCause::PowerOn {
            self.lat = 0;
        }
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Peripheral;
    use picblink_config::ChipDescriptor;

    fn portc() -> PortPeripheral {
        let chip = ChipDescriptor::builtin("pic16f1823").unwrap();
        PortPeripheral::new(chip.port("portc").unwrap())
    }

    #[test]
    fn test_reset_state() {
        let port = portc();
        assert_eq!(port.tris(), 0x3F);
        assert_eq!(port.ansel(), Some(0x0F));
        assert_eq!(port.pins(), 0);
    }

    #[test]
    fn test_output_reads_back_latch() {
        let mut port = portc();
        port.write(0x18E, 0x00).unwrap();
        port.write(0x08E, 0x00).unwrap();
        port.write(0x00E, 0x01).unwrap();
        assert_eq!(port.read(0x00E).unwrap(), 0x01);
        assert_eq!(port.read(0x10E).unwrap(), 0x01);
        assert_eq!(port.pins(), 0x01);
    }

    #[test]
    fn test_analog_pin_reads_zero() {
        let mut port = portc();
        port.write(0x08E, 0x00).unwrap();
        port.write(0x00E, 0x01).unwrap();

        // Driven high, but the input buffer is disabled.
        assert_eq!(port.pins(), 0x01);
        assert_eq!(port.read(0x00E).unwrap(), 0x00);
    }

    #[test]
    fn test_input_pins_read_low() {
        let mut port = portc();
        port.write(0x18E, 0x00).unwrap();
        port.write(0x00E, 0x20).unwrap();
        assert_eq!(port.lat(), 0x20);
        assert_eq!(port.read(0x00E).unwrap(), 0x00);
        assert_eq!(port.pins(), 0);
    }

    #[test]
    fn test_unimplemented_bits_masked() {
        let mut port = portc();
        port.write(0x08E, 0xFF).unwrap();
        assert_eq!(port.tris(), 0x3F);
    }

    #[test]
    fn test_watchdog_reset_keeps_latch() {
        let mut port = portc();
        port.write(0x08E, 0x00).unwrap();
        port.write(0x00E, 0x01).unwrap();

        port.reset(ResetCause::Watchdog);
        assert_eq!(port.lat(), 0x01);
        assert_eq!(port.pins(), 0);

        port.reset(ResetCause::PowerOn);
        assert_eq!(port.lat(), 0);
    }

    #[test]
    fn test_foreign_address_rejected() {
        let port = portc();
        assert_eq!(
            port.read(0x020),
            Err(SimulationError::MemoryViolation(0x020))
        );
    }
}
