mod hex;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use picblink_config::{
    ChipDescriptor, PinRef, StopReason, SystemManifest, TestAssertion, TestLimits, TestScript,
};
use picblink_core::metrics::PerformanceMetrics;
use picblink_core::snapshot::MachineSnapshot;
use picblink_core::trace::{PinEvent, PinTrace};
use picblink_core::{boot, SimulationError, SimulationObserver};
use picblink_firmware::{ConfigWord, Pic16f1823, Pic16f628a, Selected, Target};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "PicBlink LED firmware simulator", long_about = None)]
struct Cli {
    /// Log every register write
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the blink firmware on a simulated chip.
    Run(RunArgs),

    /// Print the configuration word burned for a chip.
    ConfigWord(ConfigWordArgs),

    /// Deterministic, CI-friendly runner mode driven by a test script (YAML).
    Test(TestArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Chip {
    Pic16f1823,
    Pic16f628a,
}

impl Chip {
    /// The chip the firmware crate was built for.
    fn selected() -> Self {
        Self::from_str(Selected::NAME, true).unwrap_or(Chip::Pic16f1823)
    }

    fn name(self) -> &'static str {
        match self {
            Chip::Pic16f1823 => Pic16f1823::NAME,
            Chip::Pic16f628a => Pic16f628a::NAME,
        }
    }

    fn config_word(self) -> ConfigWord {
        match self {
            Chip::Pic16f1823 => Pic16f1823::CONFIG,
            Chip::Pic16f628a => Pic16f628a::CONFIG,
        }
    }

    fn watchdog_enabled(self) -> bool {
        match self {
            Chip::Pic16f1823 => Pic16f1823::watchdog_enabled(Pic16f1823::CONFIG.value),
            Chip::Pic16f628a => Pic16f628a::watchdog_enabled(Pic16f628a::CONFIG.value),
        }
    }
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Chip to simulate (defaults to the firmware's build target)
    #[arg(long, value_enum)]
    target: Option<Chip>,

    /// Path to the system manifest (YAML)
    #[arg(short, long)]
    system: Option<PathBuf>,

    /// Number of blink passes to run
    #[arg(long, default_value = "10")]
    passes: u64,

    /// Stop once this many instruction cycles have elapsed
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Write a state snapshot (JSON) at the end of the run
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the LED transition log (JSON)
    #[arg(long)]
    trace_json: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ConfigWordArgs {
    #[arg(long, value_enum)]
    target: Option<Chip>,

    /// Write the configuration word as an Intel HEX file
    #[arg(long)]
    hex: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Override max passes (takes precedence over script)
    #[arg(long)]
    max_passes: Option<u64>,

    /// Directory to write test artifacts (result.json, trace.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

/// Everything needed to boot a machine.
struct Setup {
    chip: ChipDescriptor,
    led: Option<PinRef>,
}

struct Outcome {
    stop_reason: StopReason,
    message: Option<String>,
    passes: u64,
    cycles: u64,
    watchdog_resets: u64,
    toggles: u64,
    alternates: bool,
    intervals: Vec<u64>,
    events: Vec<PinEvent>,
    snapshot: MachineSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    target: String,
    passes: u64,
    cycles: u64,
    toggles: u64,
    watchdog_resets: u64,
    stop_reason: StopReason,
    limits: TestLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    descriptor_hash: String,
    config: TestConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct TestConfig {
    script: String,
    system: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.trace {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run_interactive(args),
        Commands::ConfigWord(args) => run_config_word(args),
        Commands::Test(args) => run_test(args),
    }
}

fn load_setup(target: Chip, system: Option<&Path>) -> anyhow::Result<Setup> {
    let Some(sys_path) = system else {
        info!("Using built-in {} descriptor", target.name());
        return Ok(Setup {
            chip: ChipDescriptor::builtin(target.name())?,
            led: None,
        });
    };

    info!("Loading system manifest: {:?}", sys_path);
    let manifest = SystemManifest::from_file(sys_path)?;
    let base = sys_path.parent().unwrap_or_else(|| Path::new("."));
    let chip = manifest.load_chip(base)?;
    let led = manifest.led()?;
    Ok(Setup { chip, led })
}

/// The port pin the firmware drives, named as the chip descriptor names it.
fn firmware_led<T: Target>(chip: &ChipDescriptor) -> anyhow::Result<PinRef> {
    let port = chip
        .ports
        .iter()
        .find(|p| p.port == T::LED.port)
        .with_context(|| {
            format!(
                "Chip '{}' has no port at {:#05x} for the LED",
                chip.name,
                T::LED.port
            )
        })?;
    Ok(PinRef {
        port: port.id.clone(),
        bit: T::LED.bit,
    })
}

fn simulate<T: Target>(
    setup: &Setup,
    max_passes: u64,
    max_cycles: Option<u64>,
) -> anyhow::Result<Outcome> {
    let led = match &setup.led {
        Some(led) => led.clone(),
        None => firmware_led::<T>(&setup.chip)?,
    };

    let trace = Arc::new(PinTrace::new(led.clone()));
    let metrics = Arc::new(PerformanceMetrics::new());
    let observers: Vec<Arc<dyn SimulationObserver>> = vec![trace.clone(), metrics.clone()];
    let mut machine = boot::<T>(&setup.chip, led, observers)?;

    info!("Running {} for {} passes...", T::NAME, max_passes);
    let mut stop_reason = StopReason::MaxPasses;
    let mut message = None;
    while machine.passes() < max_passes {
        if let Some(max) = max_cycles {
            if machine.cycles() >= max {
                stop_reason = StopReason::MaxCycles;
                break;
            }
        }
        if let Err(e) = machine.step() {
            error!("Simulation error at pass {}: {}", machine.passes(), e);
            stop_reason = StopReason::MemoryViolation;
            message = Some(e.to_string());
            break;
        }
    }
    machine.stop();

    info!(
        "{} passes, {} cycles, {} register writes, {} watchdog resets ({:.0} cycles/s)",
        metrics.get_passes(),
        machine.cycles(),
        metrics.get_register_writes(),
        metrics.get_watchdog_resets(),
        metrics.get_cps()
    );

    Ok(Outcome {
        stop_reason,
        message,
        passes: machine.passes(),
        cycles: machine.cycles(),
        watchdog_resets: machine.watchdog_resets(),
        toggles: trace.toggles(),
        alternates: trace.alternates(),
        intervals: trace.intervals(),
        events: trace.events(),
        snapshot: MachineSnapshot::capture(&machine)?,
    })
}

fn dispatch(
    target: Chip,
    setup: &Setup,
    max_passes: u64,
    max_cycles: Option<u64>,
) -> anyhow::Result<Outcome> {
    match target {
        Chip::Pic16f1823 => simulate::<Pic16f1823>(setup, max_passes, max_cycles),
        Chip::Pic16f628a => simulate::<Pic16f628a>(setup, max_passes, max_cycles),
    }
}

/// A fault raised while the initializer runs is a runtime error; anything
/// else that stops the machine from booting is a configuration problem.
fn boot_exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SimulationError>() {
        Some(SimulationError::MemoryViolation(_)) => EXIT_RUNTIME_ERROR,
        _ => EXIT_CONFIG_ERROR,
    }
}

fn write_json<S: Serialize>(path: &Path, value: &S) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write {:?}", path))
}

fn run_interactive(args: RunArgs) -> ExitCode {
    let target = args.target.unwrap_or_else(Chip::selected);
    let setup = match load_setup(target, args.system.as_deref()) {
        Ok(setup) => setup,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let outcome = match dispatch(target, &setup, args.passes, args.max_cycles) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(boot_exit_code(&e));
        }
    };

    for event in &outcome.events {
        info!(
            "LED {} at cycle {}",
            if event.level { "on " } else { "off" },
            event.cycle
        );
    }

    let cycle_us = 1_000_000.0 / setup.chip.instruction_clock_hz as f64;
    let mean_interval = if outcome.intervals.is_empty() {
        0.0
    } else {
        outcome.intervals.iter().sum::<u64>() as f64 / outcome.intervals.len() as f64
    };
    println!("target:          {}", target.name());
    println!("passes:          {}", outcome.passes);
    println!("cycles:          {}", outcome.cycles);
    println!("toggles:         {}", outcome.toggles);
    println!(
        "blink interval:  {:.0} cycles (~{:.1} ms at {} Hz)",
        mean_interval,
        mean_interval * cycle_us / 1000.0,
        setup.chip.instruction_clock_hz
    );
    println!("watchdog resets: {}", outcome.watchdog_resets);
    println!("stop reason:     {:?}", outcome.stop_reason);

    if let Some(path) = &args.snapshot {
        if let Err(e) = write_json(path, &outcome.snapshot) {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
        info!("Snapshot written to {:?}", path);
    }
    if let Some(path) = &args.trace_json {
        if let Err(e) = write_json(path, &outcome.events) {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    if outcome.stop_reason == StopReason::MemoryViolation {
        if let Some(msg) = &outcome.message {
            error!("{}", msg);
        }
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }
    ExitCode::from(EXIT_PASS)
}

fn run_config_word(args: ConfigWordArgs) -> ExitCode {
    let target = args.target.unwrap_or_else(Chip::selected);
    let word = target.config_word();

    println!(
        "{}: config word {:#06x} at {:#06x} (watchdog {})",
        target.name(),
        word.value,
        word.address,
        if target.watchdog_enabled() { "on" } else { "off" }
    );

    if let Some(path) = &args.hex {
        if let Err(e) = std::fs::write(path, hex::config_word_hex(word)) {
            error!("Failed to write {:?}: {}", path, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
        info!("Intel HEX written to {:?}", path);
    }
    ExitCode::from(EXIT_PASS)
}

fn evaluate(assertion: &TestAssertion, outcome: &Outcome) -> bool {
    match assertion {
        TestAssertion::LedToggles(a) => outcome.toggles >= a.led_toggles,
        TestAssertion::LedAlternates(a) => outcome.alternates == a.led_alternates,
        TestAssertion::NoWatchdogReset(a) => (outcome.watchdog_resets == 0) == a.no_watchdog_reset,
        TestAssertion::BlinkInterval(a) => {
            !outcome.intervals.is_empty()
                && outcome
                    .intervals
                    .iter()
                    .all(|i| a.blink_interval_cycles.contains(*i))
        }
        TestAssertion::ExpectedStopReason(a) => outcome.stop_reason == a.expected_stop_reason,
    }
}

fn descriptor_hash(chip: &ChipDescriptor) -> String {
    let mut hasher = Sha256::new();
    match serde_yaml::to_string(chip) {
        Ok(yaml) => hasher.update(yaml.as_bytes()),
        Err(e) => error!("Failed to serialize chip descriptor: {}", e),
    }
    format!("{:x}", hasher.finalize())
}

fn run_test(args: TestArgs) -> ExitCode {
    let mut script = match TestScript::from_file(&args.script) {
        Ok(script) => script,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Some(max_passes) = args.max_passes {
        script.limits.max_passes = max_passes;
        if let Err(e) = script.validate() {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    }

    let Ok(target) = Chip::from_str(&script.inputs.target, true) else {
        error!("Unknown target '{}'", script.inputs.target);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    };

    let system = script
        .inputs
        .system
        .as_deref()
        .map(|s| TestScript::resolve_path(&args.script, s));
    let setup = match load_setup(target, system.as_deref()) {
        Ok(setup) => setup,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let limits = script.limits.clone();

    let outcome = match dispatch(target, &setup, limits.max_passes, limits.max_cycles) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(boot_exit_code(&e));
        }
    };

    let assertions: Vec<AssertionResult> = script
        .assertions
        .iter()
        .map(|assertion| AssertionResult {
            assertion: assertion.clone(),
            passed: evaluate(assertion, &outcome),
        })
        .collect();

    let stop_expected = script
        .assertions
        .iter()
        .any(|a| matches!(a, TestAssertion::ExpectedStopReason(_)));
    let (status, code) = if assertions.iter().any(|a| !a.passed) {
        ("fail", EXIT_ASSERT_FAIL)
    } else if outcome.stop_reason == StopReason::MemoryViolation && !stop_expected {
        ("error", EXIT_RUNTIME_ERROR)
    } else {
        ("pass", EXIT_PASS)
    };

    for result in &assertions {
        info!(
            "{} {:?}",
            if result.passed { "PASS" } else { "FAIL" },
            result.assertion
        );
    }
    println!("{}: {}", args.script.display(), status);

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        target: target.name().to_string(),
        passes: outcome.passes,
        cycles: outcome.cycles,
        toggles: outcome.toggles,
        watchdog_resets: outcome.watchdog_resets,
        stop_reason: outcome.stop_reason,
        limits,
        message: outcome.message.clone(),
        assertions,
        descriptor_hash: descriptor_hash(&setup.chip),
        config: TestConfig {
            script: args.script.display().to_string(),
            system: system.map(|p| p.display().to_string()),
        },
    };

    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create {:?}: {}", output_dir, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
        let outputs = write_json(&output_dir.join("result.json"), &result)
            .and_then(|_| write_json(&output_dir.join("trace.json"), &outcome.events));
        if let Err(e) = outputs {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    ExitCode::from(code)
}
