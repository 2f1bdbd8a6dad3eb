#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn thermlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_thermlink"));
    cmd.arg("--log-level").arg("error");
    cmd.env_remove("THERMLINK_DEVICE");
    cmd.env_remove("THERMLINK_TIMEOUT");
    cmd
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "thermlink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

#[test]
fn encode_prints_reference_frame() {
    let output = thermlink()
        .args(["--format", "pretty", "encode", "--command", "0x01", "--payload", "01"])
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "55 55 01 01 01 01 AA AA"
    );
}

#[test]
fn encode_json_names_the_command() {
    let output = thermlink()
        .args(["--format", "json", "encode", "-c", "0x13", "-p", "00 F0 01 80"])
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["name"], "SET_DIMENSION");
    assert_eq!(lines[0]["frame_size"], 11);
}

#[test]
fn encode_oversized_payload_is_invalid_data() {
    let payload = "00".repeat(256);
    let output = thermlink()
        .args(["encode", "--command", "1", "--payload", &payload])
        .output()
        .expect("encode should run");

    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("payload"));
}

#[test]
fn encode_rejects_bad_hex() {
    let output = thermlink()
        .args(["encode", "--command", "1", "--payload", "zz"])
        .output()
        .expect("encode should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_skips_noise_and_corrupted_frames() {
    let output = thermlink()
        .args([
            "--format",
            "json",
            "decode",
            "13 37 55 55 02 01 01 02 AA AA 55 55 31 01 01 00 AA AA 55 55 04 01 01 04 AA AA",
        ])
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let lines = json_lines(&output);
    let commands: Vec<&str> = lines
        .iter()
        .map(|line| line["command"].as_str().expect("command should be a string"))
        .collect();
    assert_eq!(commands, vec!["0x02", "0x04"]);
    assert_eq!(lines[0]["name"], "START_PRINT_ACK");
    assert_eq!(lines[1]["payload"], "01");
}

#[test]
fn decode_reads_hex_from_stdin() {
    let mut child = thermlink()
        .args(["--format", "json", "decode"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");

    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"55 55 48 02 00 10 5A AA AA\n")
        .expect("stdin should accept input");

    let output = child.wait_with_output().expect("decode should finish");
    assert!(output.status.success());
    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["name"], "INFO");
    assert_eq!(lines[0]["payload"], "00 10");
}

#[test]
fn decode_reads_binary_capture_file() {
    let dir = unique_temp_dir("decode-file");
    let capture = dir.join("capture.bin");
    std::fs::write(
        &capture,
        [
            0x55, 0x55, 0xF4, 0x01, 0x01, 0xF4, 0xAA, 0xAA, 0x55, 0x55, 0xE4, 0x01, 0x01, 0xE4,
            0xAA, 0xAA, 0x55, 0x55,
        ],
    )
    .expect("capture should be writable");

    let output = thermlink()
        .args(["--format", "pretty", "decode", "--file"])
        .arg(&capture)
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("END_PRINT_ACK"));
    assert!(stdout.contains("END_PAGE_PRINT_ACK"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_without_frames_is_invalid_data() {
    let output = thermlink()
        .args(["decode", "01 02 03"])
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn send_to_missing_device_is_transport_error() {
    let output = thermlink()
        .args(["send", "/nonexistent/thermlink-tty", "--command", "0xDC", "--payload", "01"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("open failed"));
}

#[test]
fn device_falls_back_to_environment() {
    let output = thermlink()
        .env("THERMLINK_DEVICE", "/nonexistent/thermlink-env")
        .args(["send", "--command", "0xDC"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("thermlink-env"));
}

#[test]
fn send_without_device_is_usage_error() {
    let output = thermlink()
        .args(["send", "--command", "0xDC"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn version_prints_name() {
    let output = thermlink().arg("version").output().expect("version should run");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("thermlink "));
}
