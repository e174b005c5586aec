use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Chip descriptors shipped with the simulator, keyed by part name.
pub const BUILTIN_CHIPS: &[(&str, &str)] = &[
    ("pic16f1823", include_str!("../chips/pic16f1823.yaml")),
    ("pic16f628a", include_str!("../chips/pic16f628a.yaml")),
];

/// Data memory is addressed with 16 bits.
pub const MAX_DATA_MEMORY: u64 = 0x1_0000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConnectionError {
    #[error("Connection '{0}' is not of the form '<port>.<bit>'")]
    Malformed(String),
    #[error("Invalid bit '{bit}' in connection '{connection}'")]
    InvalidBit { connection: String, bit: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigWordLayout {
    /// Program-memory word address of the configuration word.
    pub address: u16,
    #[serde(default = "erased_word")]
    pub erased: u16,
}

fn erased_word() -> u16 {
    0x3FFF
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WatchdogConfig {
    pub mask: u16,
    /// Values of `config & mask` that leave the watchdog running.
    pub enabled_when: Vec<u16>,
    pub period_us: u64,
}

impl WatchdogConfig {
    pub fn is_enabled(&self, config_word: u16) -> bool {
        self.enabled_when.contains(&(config_word & self.mask))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortResetValues {
    #[serde(default = "all_inputs")]
    pub tris: u8,
    #[serde(default)]
    pub ansel: u8,
}

fn all_inputs() -> u8 {
    0xFF
}

impl Default for PortResetValues {
    fn default() -> Self {
        Self {
            tris: all_inputs(),
            ansel: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortConfig {
    pub id: String,
    pub width: u8,
    pub port: u16,
    pub tris: u16,
    #[serde(default)]
    pub lat: Option<u16>,
    #[serde(default)]
    pub ansel: Option<u16>,
    #[serde(default)]
    pub reset: PortResetValues,
}

impl PortConfig {
    /// Bits that exist on this port.
    pub fn pin_mask(&self) -> u8 {
        if self.width >= 8 {
            0xFF
        } else {
            (1u8 << self.width) - 1
        }
    }

    pub fn registers(&self) -> impl Iterator<Item = u16> + '_ {
        [Some(self.port), Some(self.tris), self.lat, self.ansel]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChipDescriptor {
    pub name: String,
    pub data_memory: String, // e.g. "4KiB"
    pub instruction_clock_hz: u64,
    #[serde(default = "one_cycle")]
    pub cycles_per_delay_iteration: u64,
    pub config_word: ConfigWordLayout,
    pub watchdog: WatchdogConfig,
    pub ports: Vec<PortConfig>,
}

fn one_cycle() -> u64 {
    1
}

impl ChipDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open chip descriptor at {:?}", path.as_ref()))?;
        let chip: Self =
            serde_yaml::from_reader(f).context("Failed to parse Chip Descriptor")?;
        chip.validate()?;
        Ok(chip)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let chip: Self = serde_yaml::from_str(yaml).context("Failed to parse Chip Descriptor")?;
        chip.validate()?;
        Ok(chip)
    }

    pub fn builtin(name: &str) -> Result<Self> {
        let name = name.to_ascii_lowercase();
        let (_, yaml) = BUILTIN_CHIPS
            .iter()
            .find(|(chip, _)| *chip == name)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown chip '{}'. Built-in chips: {}",
                    name,
                    builtin_names().join(", ")
                )
            })?;
        Self::from_yaml(yaml)
    }

    pub fn data_memory_size(&self) -> Result<u64> {
        parse_size(&self.data_memory)
    }

    pub fn port(&self, id: &str) -> Option<&PortConfig> {
        self.ports.iter().find(|p| p.id == id)
    }

    /// Watchdog timeout expressed in instruction cycles.
    pub fn watchdog_period_cycles(&self) -> u64 {
        self.watchdog.period_us.saturating_mul(self.instruction_clock_hz) / 1_000_000
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruction_clock_hz == 0 {
            anyhow::bail!("Chip '{}': instruction_clock_hz must be non-zero", self.name);
        }
        if self.cycles_per_delay_iteration == 0 {
            anyhow::bail!(
                "Chip '{}': cycles_per_delay_iteration must be non-zero",
                self.name
            );
        }
        if self.ports.is_empty() {
            anyhow::bail!("Chip '{}' declares no ports", self.name);
        }

        if self
            .watchdog
            .period_us
            .checked_mul(self.instruction_clock_hz)
            .is_none()
        {
            anyhow::bail!(
                "Chip '{}': watchdog period of {} us overflows at {} Hz",
                self.name,
                self.watchdog.period_us,
                self.instruction_clock_hz
            );
        }

        let size = self.data_memory_size()?;
        if size > MAX_DATA_MEMORY {
            anyhow::bail!(
                "Chip '{}': data memory of {} bytes exceeds the 16-bit address space",
                self.name,
                size
            );
        }
        let mut seen = std::collections::HashSet::new();
        for port in &self.ports {
            if port.width == 0 || port.width > 8 {
                anyhow::bail!("Port '{}' has invalid width {}", port.id, port.width);
            }
            for addr in port.registers() {
                if addr as u64 >= size {
                    anyhow::bail!(
                        "Port '{}' register {:#05x} lies outside data memory ({} bytes)",
                        port.id,
                        addr,
                        size
                    );
                }
                if !seen.insert(addr) {
                    anyhow::bail!("Register {:#05x} is mapped twice", addr);
                }
            }
        }
        Ok(())
    }
}

pub fn builtin_names() -> Vec<&'static str> {
    BUILTIN_CHIPS.iter().map(|(name, _)| *name).collect()
}

/// A pin reference such as `portc.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRef {
    pub port: String,
    pub bit: u8,
}

impl std::str::FromStr for PinRef {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, bit) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| ConnectionError::Malformed(s.to_string()))?;
        if port.is_empty() {
            return Err(ConnectionError::Malformed(s.to_string()));
        }
        let bit = bit
            .parse::<u8>()
            .ok()
            .filter(|b| *b < 8)
            .ok_or_else(|| ConnectionError::InvalidBit {
                connection: s.to_string(),
                bit: bit.to_string(),
            })?;
        Ok(Self {
            port: port.to_ascii_lowercase(),
            bit,
        })
    }
}

impl std::fmt::Display for PinRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.port, self.bit)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExternalDevice {
    pub id: String,
    pub r#type: String,
    pub connection: String, // e.g. "portc.0"
}

impl ExternalDevice {
    pub fn pin(&self) -> Result<PinRef, ConnectionError> {
        self.connection.parse()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SystemManifest {
    pub name: String,
    pub chip: String, // Built-in chip name or descriptor path
    #[serde(default)]
    pub external_devices: Vec<ExternalDevice>,
}

impl SystemManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open system manifest at {:?}", path.as_ref()))?;
        serde_yaml::from_reader(f).context("Failed to parse System Manifest")
    }

    /// Load the referenced chip. Built-in names win over paths, which are
    /// resolved relative to `base_dir`.
    pub fn load_chip(&self, base_dir: &Path) -> Result<ChipDescriptor> {
        if builtin_names().contains(&self.chip.to_ascii_lowercase().as_str()) {
            return ChipDescriptor::builtin(&self.chip);
        }
        ChipDescriptor::from_file(base_dir.join(&self.chip))
    }

    /// The pin of the first `led` device, if any.
    pub fn led(&self) -> Result<Option<PinRef>> {
        self.external_devices
            .iter()
            .find(|d| d.r#type == "led")
            .map(|d| d.pin().with_context(|| format!("Device '{}'", d.id)))
            .transpose()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    pub target: String,
    pub system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub max_passes: u64,
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxPasses,
    MaxCycles,
    MemoryViolation,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LedTogglesAssertion {
    pub led_toggles: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LedAlternatesAssertion {
    pub led_alternates: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct NoWatchdogResetAssertion {
    pub no_watchdog_reset: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CycleRange {
    pub min: u64,
    pub max: u64,
}

impl CycleRange {
    pub fn contains(&self, cycles: u64) -> bool {
        (self.min..=self.max).contains(&cycles)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BlinkIntervalAssertion {
    pub blink_interval_cycles: CycleRange,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    LedToggles(LedTogglesAssertion),
    LedAlternates(LedAlternatesAssertion),
    NoWatchdogReset(NoWatchdogResetAssertion),
    BlinkInterval(BlinkIntervalAssertion),
    ExpectedStopReason(StopReasonAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    pub inputs: TestInputs,
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.inputs.target.trim().is_empty() {
            anyhow::bail!("Input 'target' cannot be empty");
        }

        if self.limits.max_passes == 0 {
            anyhow::bail!("Limit 'max_passes' must be greater than zero");
        }

        if self.limits.max_cycles == Some(0) {
            anyhow::bail!("Limit 'max_cycles' must be greater than zero");
        }

        for assertion in &self.assertions {
            if let TestAssertion::BlinkInterval(a) = assertion {
                if a.blink_interval_cycles.min > a.blink_interval_cycles.max {
                    anyhow::bail!(
                        "Assertion 'blink_interval_cycles' has min {} above max {}",
                        a.blink_interval_cycles.min,
                        a.blink_interval_cycles.max
                    );
                }
            }
        }

        Ok(())
    }

    /// Resolve a path from the script relative to the script's directory.
    pub fn resolve_path(script_path: &Path, value: &str) -> PathBuf {
        let candidate = PathBuf::from(value);
        if candidate.is_absolute() {
            return candidate;
        }
        script_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(candidate)
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
