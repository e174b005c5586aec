use crate::memory::LinearMemory;
use crate::peripherals::gpio::PortPeripheral;
use crate::peripherals::watchdog::Watchdog;
use crate::{Peripheral, ResetCause, SimResult, SimulationError, SimulationObserver};
use picblink_config::{ChipDescriptor, PinRef};
use std::sync::Arc;

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    /// Data-memory addresses claimed by this peripheral.
    pub registers: Vec<u16>,
    pub dev: Box<dyn Peripheral>,
}

/// Data memory of one chip: special function registers on top of
/// general-purpose file registers.
///
/// Instruction cycles are charged here: one per register access and
/// `cycles_per_nop` per executed no-op.
pub struct SystemBus {
    pub ram: LinearMemory,
    pub peripherals: Vec<PeripheralEntry>,
    pub watchdog: Watchdog,
    pub observers: Vec<Arc<dyn SimulationObserver>>,
    config_word: u16,
    cycles_per_nop: u64,
    cycles: u64,
    nops: u64,
    fault: Option<SimulationError>,
    reset_requested: bool,
}

impl std::fmt::Debug for SystemBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemBus")
            .field("peripherals", &self.peripherals)
            .field("config_word", &format_args!("{:#06x}", self.config_word))
            .field("watchdog", &self.watchdog)
            .field("cycles", &self.cycles)
            .field("nops", &self.nops)
            .finish()
    }
}

impl SystemBus {
    pub fn from_config(chip: &ChipDescriptor) -> SimResult<Self> {
        let size = chip
            .data_memory_size()
            .map_err(|e| SimulationError::Config(e.to_string()))?;

        let peripherals = chip
            .ports
            .iter()
            .map(|port| PeripheralEntry {
                name: port.id.clone(),
                registers: port.registers().collect(),
                dev: Box::new(PortPeripheral::new(port)),
            })
            .collect();

        Ok(Self {
            ram: LinearMemory::new(size as usize),
            peripherals,
            watchdog: Watchdog::new(chip.watchdog.clone(), chip.watchdog_period_cycles()),
            observers: Vec::new(),
            config_word: chip.config_word.erased,
            cycles_per_nop: chip.cycles_per_delay_iteration,
            cycles: 0,
            nops: 0,
            fault: None,
            reset_requested: false,
        })
    }

    pub fn read_u8(&self, addr: u16) -> SimResult<u8> {
        if let Some(entry) = self.find(addr) {
            return entry.dev.read(addr);
        }
        self.ram
            .read_u8(addr)
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    pub fn write_u8(&mut self, addr: u16, value: u8) -> SimResult<()> {
        if let Some(idx) = self.peripherals.iter().position(|p| p.registers.contains(&addr)) {
            let before = port_of(&self.peripherals[idx]).map(|p| p.pins());
            self.peripherals[idx].dev.write(addr, value)?;

            for observer in &self.observers {
                observer.on_register_write(addr, value);
            }
            tracing::debug!(
                "{} {:#05x} <- {:#04x} (cycle {})",
                self.peripherals[idx].name,
                addr,
                value,
                self.cycles
            );

            let after = port_of(&self.peripherals[idx]).map(|p| p.pins());
            if let (Some(before), Some(after)) = (before, after) {
                self.notify_pin_changes(idx, before, after);
            }
            return Ok(());
        }

        if self.ram.write_u8(addr, value) {
            for observer in &self.observers {
                observer.on_register_write(addr, value);
            }
            return Ok(());
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    fn find(&self, addr: u16) -> Option<&PeripheralEntry> {
        self.peripherals.iter().find(|p| p.registers.contains(&addr))
    }

    fn notify_pin_changes(&self, idx: usize, before: u8, after: u8) {
        let changed = before ^ after;
        if changed == 0 {
            return;
        }
        let name = &self.peripherals[idx].name;
        for bit in (0..8).filter(|b| changed & (1 << b) != 0) {
            let level = after & (1 << bit) != 0;
            for observer in &self.observers {
                observer.on_pin_change(name, bit, level, self.cycles);
            }
        }
    }

    pub fn port(&self, id: &str) -> Option<&PortPeripheral> {
        self.peripherals
            .iter()
            .find(|p| p.name == id)
            .and_then(port_of)
    }

    /// Level of an external pin: high only when driven high as an output.
    pub fn pin_level(&self, pin: &PinRef) -> SimResult<bool> {
        let port = self
            .port(&pin.port)
            .ok_or_else(|| SimulationError::UnknownPort(pin.port.clone()))?;
        Ok(port.pins() & (1 << pin.bit) != 0)
    }

    /// Program the configuration word. Only the watchdog bits matter here.
    pub fn burn_config_word(&mut self, value: u16) {
        self.config_word = value;
        self.watchdog.configure(value);
    }

    pub fn config_word(&self) -> u16 {
        self.config_word
    }

    /// Reset peripherals to their reset values. RAM keeps its contents.
    pub fn reset(&mut self, cause: ResetCause) {
        let before: Vec<Option<u8>> = self
            .peripherals
            .iter()
            .map(|p| port_of(p).map(|port| port.pins()))
            .collect();

        for entry in &mut self.peripherals {
            entry.dev.reset(cause);
        }
        self.watchdog.clear();
        self.reset_requested = false;

        for (idx, before) in before.into_iter().enumerate() {
            let after = port_of(&self.peripherals[idx]).map(|p| p.pins());
            if let (Some(before), Some(after)) = (before, after) {
                self.notify_pin_changes(idx, before, after);
            }
        }
    }

    fn advance(&mut self, cycles: u64) {
        self.cycles += cycles;
        if self.watchdog.tick(cycles) {
            self.reset_requested = true;
        }
    }

    fn latch(&mut self, err: SimulationError) {
        if self.fault.is_none() {
            tracing::error!("Bus fault at cycle {}: {}", self.cycles, err);
            self.fault = Some(err);
        }
    }

    /// First fault raised since the last call, if any.
    pub fn take_fault(&mut self) -> Option<SimulationError> {
        self.fault.take()
    }

    pub fn take_reset_request(&mut self) -> bool {
        std::mem::take(&mut self.reset_requested)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn nops(&self) -> u64 {
        self.nops
    }
}

fn port_of(entry: &PeripheralEntry) -> Option<&PortPeripheral> {
    entry
        .dev
        .as_any()
        .and_then(|a| a.downcast_ref::<PortPeripheral>())
}

impl picblink_firmware::Hardware for SystemBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.advance(1);
        match self.read_u8(addr) {
            Ok(value) => value,
            Err(e) => {
                self.latch(e);
                0
            }
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.advance(1);
        if let Err(e) = self.write_u8(addr, value) {
            self.latch(e);
        }
    }

    fn nop(&mut self) {
        self.nops += 1;
        self.advance(self.cycles_per_nop);
    }
}
