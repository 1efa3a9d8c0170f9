// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary-level specs for parlord.
//!
//! Boot-path behavior only: configuration handling and fatal backend
//! probes. Room/executor behavior is covered in-process in parlor-daemon.

use std::io::Write;
use std::time::Duration;

use assert_cmd::Command;

fn parlord() -> Command {
    let mut command = Command::cargo_bin("parlord").expect("binary builds");
    command.timeout(Duration::from_secs(30));
    command
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn failing_stderr(mut command: Command) -> String {
    let assert = command.assert().failure();
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}

#[test]
fn missing_argument_prints_usage() {
    let stderr = failing_stderr(parlord());
    assert!(stderr.contains("Usage"), "unexpected stderr: {stderr}");
}

#[test]
fn unreadable_configuration_is_fatal() {
    let mut command = parlord();
    command.arg("/nonexistent/parlor.json");
    let stderr = failing_stderr(command);
    assert!(stderr.contains("failed to read"), "unexpected stderr: {stderr}");
}

#[test]
fn malformed_configuration_is_fatal() {
    let config = write_config("{ not json");
    let mut command = parlord();
    command.arg(config.path());
    let stderr = failing_stderr(command);
    assert!(stderr.contains("invalid configuration"), "unexpected stderr: {stderr}");
}

#[test]
fn unknown_executor_type_is_fatal() {
    let config = write_config(
        r#"{
            "host": "127.0.0.1", "port": 0,
            "context": { "type": "docker" },
            "pages": {
                "/p": {
                    "type": "docker",
                    "executors": {
                        "x": { "type": "cron", "image": "alpine", "command": ["true"] }
                    }
                }
            }
        }"#,
    );
    let mut command = parlord();
    command.arg(config.path());
    let stderr = failing_stderr(command);
    assert!(stderr.contains("invalid configuration"), "unexpected stderr: {stderr}");
}

#[test]
fn unreachable_engine_fails_the_boot() {
    let config = write_config(
        r#"{
            "host": "127.0.0.1", "port": 0,
            "context": { "type": "docker", "url": "unix:///nonexistent/engine.sock" },
            "pages": {
                "/p": {
                    "type": "docker",
                    "executors": {
                        "x": { "type": "once", "image": "alpine", "command": ["true"] }
                    }
                }
            }
        }"#,
    );
    let mut command = parlord();
    command.arg(config.path());
    let stderr = failing_stderr(command);
    assert!(stderr.contains("backend unavailable"), "unexpected stderr: {stderr}");
}
