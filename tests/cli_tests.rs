//! End-to-end runs of the rsct binary.

use std::fs;
use std::process::Command;

#[test]
fn pack_unpack_roundtrip_cli() {
    let exe = env!("CARGO_BIN_EXE_rsct");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let container = dir.path().join("input.rsct");
    let output = dir.path().join("output.bin");

    let payload: Vec<u8> = (0..20_000usize).map(|i| (i * 13 % 256) as u8).collect();
    fs::write(&input, &payload).unwrap();

    let status = Command::new(exe)
        .args([
            "pack",
            input.to_str().unwrap(),
            container.to_str().unwrap(),
            "--parity",
            "16",
        ])
        .status()
        .expect("pack failed to run");
    assert!(status.success());

    let status = Command::new(exe)
        .args([
            "unpack",
            container.to_str().unwrap(),
            output.to_str().unwrap(),
        ])
        .status()
        .expect("unpack failed to run");
    assert!(status.success());

    assert_eq!(fs::read(&output).unwrap(), payload);
}

#[test]
fn unpack_emits_json_stats() {
    let exe = env!("CARGO_BIN_EXE_rsct");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let container = dir.path().join("input.rsct");
    let output = dir.path().join("output.bin");
    fs::write(&input, [9u8; 5000]).unwrap();

    let status = Command::new(exe)
        .args([
            "pack",
            input.to_str().unwrap(),
            container.to_str().unwrap(),
        ])
        .status()
        .expect("pack failed to run");
    assert!(status.success());

    let out = Command::new(exe)
        .args([
            "unpack",
            container.to_str().unwrap(),
            output.to_str().unwrap(),
            "--json",
        ])
        .output()
        .expect("unpack failed to run");
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON stats");
    assert_eq!(parsed["frames_total"], 1);
    assert_eq!(parsed["slices_bad"], 0);
}

#[test]
fn wrap_unwrap_roundtrip_cli() {
    let exe = env!("CARGO_BIN_EXE_rsct");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plain.bin");
    let wrapped = dir.path().join("wrapped.bin");
    let recovered = dir.path().join("recovered.bin");
    // No run of four 1-bits anywhere, so the end flag cannot fire early.
    let payload: Vec<u8> = (0..4096usize).map(|i| (i % 256) as u8 & 0x77).collect();
    fs::write(&input, &payload).unwrap();

    let status = Command::new(exe)
        .args([
            "wrap",
            input.to_str().unwrap(),
            wrapped.to_str().unwrap(),
            "--start",
            "1110000000000000",
            "--end",
            "11110",
            "--left",
            "13",
            "--right",
            "29",
            "--seed",
            "5",
        ])
        .status()
        .expect("wrap failed to run");
    assert!(status.success());

    let status = Command::new(exe)
        .args([
            "unwrap",
            wrapped.to_str().unwrap(),
            recovered.to_str().unwrap(),
            "--start",
            "1110000000000000",
            "--end",
            "11110",
        ])
        .status()
        .expect("unwrap failed to run");
    assert!(status.success());

    assert_eq!(fs::read(&recovered).unwrap(), payload);
}

#[test]
fn invalid_flag_pattern_fails() {
    let exe = env!("CARGO_BIN_EXE_rsct");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    fs::write(&input, b"data").unwrap();

    let status = Command::new(exe)
        .args([
            "wrap",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            "--start",
            "01x0",
        ])
        .status()
        .expect("wrap failed to run");
    assert!(!status.success());
}

#[test]
fn unpacking_garbage_fails() {
    let exe = env!("CARGO_BIN_EXE_rsct");
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage.rsct");
    let output = dir.path().join("out.bin");
    fs::write(&garbage, b"definitely not a container").unwrap();

    let status = Command::new(exe)
        .args([
            "unpack",
            garbage.to_str().unwrap(),
            output.to_str().unwrap(),
        ])
        .status()
        .expect("unpack failed to run");
    assert!(!status.success());
}
