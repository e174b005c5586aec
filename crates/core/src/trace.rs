use crate::{ResetCause, SimulationObserver};
use picblink_config::PinRef;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinEvent {
    pub cycle: u64,
    pub level: bool,
    /// Caused by a reset or by the initializer that follows it, not by a
    /// toggle.
    #[serde(default)]
    pub reset: bool,
}

#[derive(Debug, Default)]
struct TraceState {
    events: Vec<PinEvent>,
    /// Set from a reset until the initializer switches the LED back on.
    restarting: bool,
}

/// Records every level change of one pin.
///
/// Each reset opens a new run. Events from the reset up to the
/// initializer's switch-on are flagged and never count as toggles.
#[derive(Debug)]
pub struct PinTrace {
    pin: PinRef,
    state: Mutex<TraceState>,
}

impl PinTrace {
    pub fn new(pin: PinRef) -> Self {
        Self {
            pin,
            state: Mutex::new(TraceState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.lock().events.clone()
    }

    /// Level changes made by the blink loop.
    pub fn toggles(&self) -> u64 {
        self.lock().events.iter().filter(|e| !e.reset).count() as u64
    }

    /// True when, between resets, no two consecutive events carry the same
    /// level.
    pub fn alternates(&self) -> bool {
        runs(&self.lock().events)
            .iter()
            .all(|run| run.windows(2).all(|w| w[0].level != w[1].level))
    }

    /// Cycles between consecutive toggles. Intervals never span a reset.
    pub fn intervals(&self) -> Vec<u64> {
        runs(&self.lock().events)
            .iter()
            .flat_map(|run| {
                let toggles: Vec<u64> = run
                    .iter()
                    .filter(|e| !e.reset)
                    .map(|e| e.cycle)
                    .collect();
                toggles
                    .windows(2)
                    .map(|w| w[1] - w[0])
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// Split `events` at resets. A run starts with the initializer's switch-on
/// when one was recorded; the reset's own switch-off is left out.
fn runs(events: &[PinEvent]) -> Vec<Vec<PinEvent>> {
    let mut runs: Vec<Vec<PinEvent>> = vec![Vec::new()];
    for event in events {
        if event.reset {
            if runs.last().is_some_and(|run| !run.is_empty()) {
                runs.push(Vec::new());
            }
            if !event.level {
                continue;
            }
        }
        if let Some(run) = runs.last_mut() {
            run.push(*event);
        }
    }
    runs
}

impl SimulationObserver for PinTrace {
    fn on_reset(&self, _cause: ResetCause) {
        self.lock().restarting = true;
    }

    fn on_pin_change(&self, port: &str, bit: u8, level: bool, cycle: u64) {
        if port == self.pin.port && bit == self.pin.bit {
            tracing::trace!("{} -> {} at cycle {}", self.pin, u8::from(level), cycle);
            let mut state = self.lock();
            let reset = state.restarting;
            if reset && level {
                state.restarting = false;
            }
            state.events.push(PinEvent {
                cycle,
                level,
                reset,
            });
        }
    }
}
