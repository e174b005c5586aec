use picblink_config::WatchdogConfig;

/// Watchdog timer.
///
/// Whether it runs is fixed by the configuration word. The firmware never
/// clears it, so once enabled it times out every `period_cycles`.
#[derive(Debug)]
pub struct Watchdog {
    config: WatchdogConfig,
    period_cycles: u64,
    enabled: bool,
    count: u64,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig, period_cycles: u64) -> Self {
        Self {
            config,
            period_cycles,
            enabled: false,
            count: 0,
        }
    }

    /// Apply a configuration word.
    pub fn configure(&mut self, config_word: u16) {
        self.enabled = self.config.is_enabled(config_word) && self.period_cycles > 0;
        self.count = 0;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Advance by `cycles`. Returns true when the timer expires.
    pub fn tick(&mut self, cycles: u64) -> bool {
        if !self.enabled {
            return false;
        }

        self.count += cycles;
        if self.count >= self.period_cycles {
            self.count -= self.period_cycles;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wdt() -> Watchdog {
        let config = WatchdogConfig {
            mask: 0x0004,
            enabled_when: vec![0x0004],
            period_us: 18_000,
        };
        Watchdog::new(config, 100)
    }

    #[test]
    fn test_disabled_never_fires() {
        let mut wdt = wdt();
        wdt.configure(0x3F78);
        assert!(!wdt.is_enabled());
        assert!(!wdt.tick(1_000_000));
    }

    #[test]
    fn test_enabled_fires_each_period() {
        let mut wdt = wdt();
        wdt.configure(0x3FFF);
        assert!(wdt.is_enabled());
        assert!(!wdt.tick(99));
        assert!(wdt.tick(1));
        assert!(!wdt.tick(50));
        wdt.clear();
        assert!(!wdt.tick(99));
        assert!(wdt.tick(1));
    }
}
