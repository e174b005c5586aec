//! Register-level simulator for the blink firmware.
//!
//! The firmware is executed natively against a [`bus::SystemBus`] that models
//! the chip's file registers, I/O ports and watchdog, and accounts for
//! instruction cycles.

pub mod bus;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod snapshot;
pub mod trace;

use picblink_config::{ChipDescriptor, PinRef};
use picblink_firmware::{Blinker, Target};
use std::any::Any;
use std::sync::Arc;

use crate::bus::SystemBus;


#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#05x}")]
    MemoryViolation(u16),
    #[error("Invalid chip descriptor: {0}")]
    Config(String),
    #[error("Firmware built for {firmware} cannot run on {chip}")]
    ChipMismatch { firmware: &'static str, chip: String },
    #[error("Firmware configuration word at {firmware:#06x}, chip expects {chip:#06x}")]
    ConfigAddress { firmware: u16, chip: u16 },
    #[error("Unknown port '{0}'")]
    UnknownPort(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetCause {
    PowerOn,
    Watchdog,
}

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_pass_start(&self, _pass: u64) {}
    /// `cycles` is the number of instruction cycles the pass consumed.
    fn on_pass_end(&self, _cycles: u64) {}
    fn on_register_write(&self, _addr: u16, _value: u8) {}
    fn on_pin_change(&self, _port: &str, _bit: u8, _level: bool, _cycle: u64) {}
    /// Called as a reset is asserted, before any register returns to its
    /// reset value.
    fn on_reset(&self, _cause: ResetCause) {}
}

/// Trait representing a register-mapped peripheral.
///
/// `addr` is the full data-memory address of the register being accessed.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, addr: u16) -> SimResult<u8>;
    fn write(&mut self, addr: u16, value: u8) -> SimResult<()>;
    /// Restore register values after a reset.
    fn reset(&mut self, cause: ResetCause);
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }}

/// A chip running the blink firmware for target `T`.
pub struct Machine<T: Target> {
    firmware: Blinker<T, SystemBus>,
    led: PinRef,
    passes: u64,
    watchdog_resets: u64,
}

impl<T: Target> std::fmt::Debug for Machine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("target", &T::NAME)
            .field("led", &self.led)
            .field("passes", &self.passes)
            .field("watchdog_resets", &self.watchdog_resets)
            .finish()
    }
}

impl<T: Target> Machine<T> {
    /// Program the configuration word, power the chip up and run the
    /// firmware initializer.
    ///
    /// Observers must be attached to `bus` beforehand to see the
    /// initialization writes.
    pub fn load(mut bus: SystemBus, chip: &ChipDescriptor, led: PinRef) -> SimResult<Self> {
        if !chip.name.eq_ignore_ascii_case(T::NAME) {
            return Err(SimulationError::ChipMismatch {
                firmware: T::NAME,
                chip: chip.name.clone(),
            });
        }
        if chip.config_word.address != T::CONFIG.address {
            return Err(SimulationError::ConfigAddress {
                firmware: T::CONFIG.address,
                chip: chip.config_word.address,
            });
        }

        let port = chip
            .port(&led.port)
            .ok_or_else(|| SimulationError::UnknownPort(led.port.clone()))?;
        if port.port != T::LED.port || led.bit != T::LED.bit {
            tracing::warn!(
                "LED is wired to {} but {} drives bit {} of {:#05x}",
                led,
                T::NAME,
                T::LED.bit,
                T::LED.port
            );
        }

        bus.burn_config_word(T::CONFIG.value);
        tracing::info!(
            "Configuration word {:#06x} at {:#06x} (watchdog {})",
            T::CONFIG.value,
            T::CONFIG.address,
            if bus.watchdog.is_enabled() { "on" } else { "off" }
        );

        for observer in &bus.observers {
            observer.on_simulation_start();
            observer.on_reset(ResetCause::PowerOn);
        }

        let mut firmware = Blinker::<T, SystemBus>::init(bus);
        if let Some(fault) = firmware.hardware_mut().take_fault() {
            return Err(fault);
        }

        Ok(Self {
            firmware,
            led,
            passes: 0,
            watchdog_resets: 0,
        })
    }

    /// Run one iteration of the blink loop.
    pub fn step(&mut self) -> SimResult<()> {
        let start = self.bus().cycles();
        for observer in &self.bus().observers {
            observer.on_pass_start(self.passes);
        }

        self.firmware.pass();
        if let Some(fault) = self.bus_mut().take_fault() {
            return Err(fault);
        }
        self.passes += 1;

        let used = self.bus().cycles() - start;
        for observer in &self.bus().observers {
            observer.on_pass_end(used);
        }

        // The core is held in reset from the timeout to the end of the pass.
        if self.bus_mut().take_reset_request() {
            self.watchdog_resets += 1;
            tracing::info!(
                "Watchdog reset #{} at cycle {}",
                self.watchdog_resets,
                self.bus().cycles()
            );
            self.restart(ResetCause::Watchdog)?;
        }

        Ok(())
    }

    /// Apply a power-on reset and rerun the initializer.
    pub fn reset(&mut self) -> SimResult<()> {
        self.restart(ResetCause::PowerOn)
    }

    fn restart(&mut self, cause: ResetCause) -> SimResult<()> {
        for observer in &self.bus().observers {
            observer.on_reset(cause);
        }
        self.bus_mut().reset(cause);
        self.firmware.restart();
        match self.bus_mut().take_fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Notify observers that the run is over.
    pub fn stop(&self) {
        for observer in &self.bus().observers {
            observer.on_simulation_stop();
        }
    }

    pub fn bus(&self) -> &SystemBus {
        self.firmware.hardware()
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus {
        self.firmware.hardware_mut()
    }

    pub fn led(&self) -> &PinRef {
        &self.led
    }

    /// Level of the LED pin as seen from outside the chip.
    pub fn led_level(&self) -> SimResult<bool> {
        self.bus().pin_level(&self.led)
    }

    /// Level the firmware believes it last drove.
    pub fn firmware_level(&self) -> bool {
        self.firmware.level()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn watchdog_resets(&self) -> u64 {
        self.watchdog_resets
    }

    pub fn cycles(&self) -> u64 {
        self.bus().cycles()
    }
}

/// Construct a machine for `T` on the given chip, with `observers` attached
/// before power-up.
pub fn boot<T: Target>(
    chip: &ChipDescriptor,
    led: PinRef,
    observers: Vec<Arc<dyn SimulationObserver>>,
) -> SimResult<Machine<T>> {
    let mut bus = SystemBus::from_config(chip)?;
    bus.observers = observers;
    Machine::load(bus, chip, led)
}
