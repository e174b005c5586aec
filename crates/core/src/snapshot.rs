use crate::{Machine, SimResult};
use picblink_firmware::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    pub target: String,
    pub config_word: ConfigWordSnapshot,
    pub cycles: u64,
    pub nops: u64,
    pub passes: u64,
    pub watchdog_resets: u64,
    pub led: String,
    pub led_level: bool,
    pub registers: BTreeMap<String, u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ConfigWordSnapshot {
    pub address: u16,
    pub value: u16,
    pub watchdog_enabled: bool,
}

impl MachineSnapshot {
    pub fn capture<T: Target>(machine: &Machine<T>) -> SimResult<Self> {
        let bus = machine.bus();
        let registers = bus
            .peripherals
            .iter()
            .filter_map(|entry| bus.port(&entry.name))
            .flat_map(|port| port.named_registers())
            .collect();

        Ok(Self {
            target: T::NAME.to_string(),
            config_word: ConfigWordSnapshot {
                address: T::CONFIG.address,
                value: bus.config_word(),
                watchdog_enabled: bus.watchdog.is_enabled(),
            },
            cycles: bus.cycles(),
            nops: bus.nops(),
            passes: machine.passes(),
            watchdog_resets: machine.watchdog_resets(),
            led: machine.led().to_string(),
            led_level: machine.led_level()?,
            registers,
        })
    }
}
