use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn nonce() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_picblink"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("PicBlink LED firmware simulator"));
}

#[test]
fn test_cli_run_writes_snapshot() {
    let snapshot_path =
        std::env::temp_dir().join(format!("picblink-run-snapshot-{}.json", nonce()));
    let _ = std::fs::remove_file(&snapshot_path);

    let output = Command::new(env!("CARGO_BIN_EXE_picblink"))
        .args([
            "run",
            "--target",
            "pic16f1823",
            "--passes",
            "3",
            "--snapshot",
            snapshot_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute picblink");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("toggles:         3"));

    let snapshot_content = std::fs::read_to_string(&snapshot_path).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&snapshot_content).unwrap();
    assert_eq!(snapshot["target"], "pic16f1823");
    assert_eq!(snapshot["passes"], 3);
    // Odd number of toggles from "on" leaves the LED off.
    assert_eq!(snapshot["led_level"], false);
    assert_eq!(snapshot["registers"]["portc.ansel"], 0);
    assert_eq!(snapshot["registers"]["portc.tris"], 0);

    let _ = std::fs::remove_file(&snapshot_path);
}

#[test]
fn test_cli_run_with_system_manifest() {
    let trace_path = std::env::temp_dir().join(format!("picblink-run-trace-{}.json", nonce()));

    let output = Command::new(env!("CARGO_BIN_EXE_picblink"))
        .args([
            "run",
            "--target",
            "pic16f628a",
            "--system",
            "../../configs/systems/pic16f628a-blinky.yaml",
            "--passes",
            "4",
            "--trace-json",
            trace_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute picblink");

    assert!(output.status.success());

    let trace: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&trace_path).unwrap()).unwrap();
    let events = trace.as_array().unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0]["level"], true);
    assert_eq!(events[4]["level"], true);

    let _ = std::fs::remove_file(&trace_path);
}

#[test]
fn test_cli_run_missing_manifest() {
    let output = Command::new(env!("CARGO_BIN_EXE_picblink"))
        .args(["run", "--system", "non_existent_system.yaml"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_config_word_hex() {
    let hex_path = std::env::temp_dir().join(format!("picblink-config-{}.hex", nonce()));

    let output = Command::new(env!("CARGO_BIN_EXE_picblink"))
        .args([
            "config-word",
            "--target",
            "pic16f628a",
            "--hex",
            hex_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("0x3f78"));
    assert!(stdout.contains("watchdog off"));

    let hex = std::fs::read_to_string(&hex_path).unwrap();
    assert!(hex.ends_with(":00000001FF\n"));

    let _ = std::fs::remove_file(&hex_path);
}

#[test]
fn test_cli_run_init_fault_is_runtime_error() {
    // No ANSELC and only 256 bytes of data memory: the first initializer
    // write lands on an unmapped address.
    let dir = std::env::temp_dir().join(format!("picblink-fault-{}", nonce()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("chip.yaml"),
        r#"
name: pic16f1823
data_memory: "256B"
instruction_clock_hz: 8000000
config_word:
  address: 0x8007
watchdog:
  mask: 0x18
  enabled_when: [0x10, 0x18]
  period_us: 2000000
ports:
  - id: portc
    width: 6
    port: 0x00E
    tris: 0x08E
"#,
    )
    .unwrap();
    let system = dir.join("system.yaml");
    std::fs::write(
        &system,
        r#"
name: broken-board
chip: chip.yaml
external_devices:
  - id: led
    type: led
    connection: portc.0
"#,
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_picblink"))
        .args([
            "run",
            "--target",
            "pic16f1823",
            "--system",
            system.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(3));

    let _ = std::fs::remove_dir_all(&dir);
}
