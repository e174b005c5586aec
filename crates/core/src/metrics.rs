use crate::{ResetCause, SimulationObserver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct PerformanceMetrics {
    pass_count: AtomicU64,
    cycle_count: AtomicU64,
    register_writes: AtomicU64,
    pin_changes: AtomicU64,
    watchdog_resets: AtomicU64,
    start_time: Instant,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            pass_count: AtomicU64::new(0),
            cycle_count: AtomicU64::new(0),
            register_writes: AtomicU64::new(0),
            pin_changes: AtomicU64::new(0),
            watchdog_resets: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn get_passes(&self) -> u64 {
        self.pass_count.load(Ordering::SeqCst)
    }

    /// Cycles spent inside blink passes (initialization excluded).
    pub fn get_cycles(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    pub fn get_register_writes(&self) -> u64 {
        self.register_writes.load(Ordering::SeqCst)
    }

    pub fn get_pin_changes(&self) -> u64 {
        self.pin_changes.load(Ordering::SeqCst)
    }

    pub fn get_watchdog_resets(&self) -> u64 {
        self.watchdog_resets.load(Ordering::SeqCst)
    }

    /// Simulated instruction cycles per wall-clock second.
    pub fn get_cps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_cycles() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_pass_end(&self, cycles: u64) {
        self.pass_count.fetch_add(1, Ordering::SeqCst);
        self.cycle_count.fetch_add(cycles, Ordering::SeqCst);
    }

    fn on_register_write(&self, _addr: u16, _value: u8) {
        self.register_writes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_pin_change(&self, _port: &str, _bit: u8, _level: bool, _cycle: u64) {
        self.pin_changes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_reset(&self, cause: ResetCause) {
        if cause == ResetCause::Watchdog {
            self.watchdog_resets.fetch_add(1, Ordering::SeqCst);
        }
    }
}
