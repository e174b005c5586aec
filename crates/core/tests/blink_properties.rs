use picblink_config::{ChipDescriptor, PinRef, SystemManifest};
use picblink_core::trace::PinTrace;
use picblink_core::{boot, Machine, SimulationObserver};
use picblink_firmware::{Pic16f1823, Pic16f628a, Target, BLINK_DELAY};
use std::path::Path;
use std::sync::Arc;

const PASSES: u64 = 50;

fn manifest_path(target: &str) -> String {
    format!(
        "{}/../../configs/systems/{}-blinky.yaml",
        env!("CARGO_MANIFEST_DIR"),
        target
    )
}

fn load_system<T: Target>() -> (ChipDescriptor, PinRef) {
    let path = manifest_path(T::NAME);
    let manifest = SystemManifest::from_file(&path).unwrap();
    let chip = manifest.load_chip(Path::new(&path).parent().unwrap()).unwrap();
    let led = manifest.led().unwrap().unwrap();
    (chip, led)
}

fn boot_on<T: Target>(chip: &ChipDescriptor, led: PinRef) -> (Machine<T>, Arc<PinTrace>) {
    let trace = Arc::new(PinTrace::new(led.clone()));
    let observers: Vec<Arc<dyn SimulationObserver>> = vec![trace.clone()];
    let machine = boot::<T>(chip, led, observers).unwrap();
    (machine, trace)
}

fn boot_traced<T: Target>() -> (Machine<T>, Arc<PinTrace>) {
    let (chip, led) = load_system::<T>();
    boot_on::<T>(&chip, led)
}

fn check_alternation<T: Target>() {
    let (mut machine, trace) = boot_traced::<T>();
    assert!(machine.led_level().unwrap(), "{}: LED off after init", T::NAME);

    let mut previous = true;
    for pass in 0..PASSES {
        machine.step().unwrap();
        let level = machine.led_level().unwrap();
        assert_eq!(level, !previous, "{}: pass {}", T::NAME, pass);
        previous = level;
    }

    assert_eq!(trace.toggles(), PASSES);
    assert!(trace.alternates());
}

fn check_interval<T: Target>() {
    let (mut machine, trace) = boot_traced::<T>();
    for _ in 0..PASSES {
        machine.step().unwrap();
    }

    let intervals = trace.intervals();
    assert_eq!(intervals.len() as u64, PASSES - 1);
    let first = intervals[0];
    assert!(intervals.iter().all(|i| *i == first));
    // Delay dominates: only the port read-modify-write comes on top.
    assert!(first >= BLINK_DELAY as u64);
    assert!(first - BLINK_DELAY as u64 <= 10);
}

fn check_watchdog_off<T: Target>() {
    assert!(!T::watchdog_enabled(T::CONFIG.value));

    let chip = ChipDescriptor::builtin(T::NAME).unwrap();
    assert!(!chip.watchdog.is_enabled(T::CONFIG.value));
    assert_eq!(chip.config_word.address, T::CONFIG.address);

    // Shorten the period so the run covers several of them.
    let (mut chip, led) = load_system::<T>();
    chip.watchdog.period_us = chip.watchdog.period_us.min(5_000);
    let period = chip.watchdog_period_cycles();
    let horizon = period * 3;
    assert!(period > 0 && horizon > period);

    let (mut machine, trace) = boot_on::<T>(&chip, led);
    assert!(!machine.bus().watchdog.is_enabled());
    while machine.cycles() < horizon {
        machine.step().unwrap();
    }
    assert_eq!(machine.watchdog_resets(), 0);
    assert_eq!(trace.toggles(), machine.passes());
}

fn check_delay_count<T: Target>() {
    let (mut machine, _) = boot_traced::<T>();
    assert_eq!(machine.bus().nops(), 0);
    for pass in 1..=5u64 {
        machine.step().unwrap();
        assert_eq!(machine.bus().nops(), pass * BLINK_DELAY as u64);
    }
}

#[test]
fn test_led_alternates_pic16f1823() {
    check_alternation::<Pic16f1823>();
}

#[test]
fn test_led_alternates_pic16f628a() {
    check_alternation::<Pic16f628a>();
}

#[test]
fn test_toggle_interval_pic16f1823() {
    check_interval::<Pic16f1823>();
}

#[test]
fn test_toggle_interval_pic16f628a() {
    check_interval::<Pic16f628a>();
}

#[test]
fn test_watchdog_off_pic16f1823() {
    check_watchdog_off::<Pic16f1823>();
}

#[test]
fn test_watchdog_off_pic16f628a() {
    check_watchdog_off::<Pic16f628a>();
}

#[test]
fn test_delay_count_pic16f1823() {
    check_delay_count::<Pic16f1823>();
}

#[test]
fn test_delay_count_pic16f628a() {
    check_delay_count::<Pic16f628a>();
}

#[test]
fn test_selected_target_is_default_chip() {
    assert_eq!(<picblink_firmware::Selected as Target>::NAME, "pic16f1823");
}
