// tests/config_validation.rs

mod common;
use crate::common::builders::ConfigFileBuilder;

use std::error::Error;
use std::io::Write;

use tempfile::NamedTempFile;

use clustersched::config::{ConfigFile, load_and_validate, parse_str};
use clustersched::errors::SchedulerError;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str, needle: &str) {
    let file = write_config(contents);
    match load_and_validate(file.path()) {
        Err(SchedulerError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} should mention {needle:?}");
        }
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn full_config_loads_with_all_sections() -> TestResult {
    let file = write_config(
        r#"
[scheduler]
tick_interval_ms = 250
max_schedule_attempts = 5
first_fit_priority = 50

[[queue]]
name = "batch"
priority = 1

[[queue]]
name = "interactive"
priority = 10

[[node]]
name = "n0"
slots = 4
resources = ["x86_64", "gpu"]

[[node]]
name = "n1"
online = false

[telemetry.limits]
power_watts = 450.0
"#,
    );

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.scheduler.tick_interval_ms, 250);
    assert_eq!(cfg.scheduler.max_schedule_attempts, 5);
    assert_eq!(cfg.scheduler.first_fit_priority, 50);
    assert_eq!(cfg.queue.len(), 2);
    assert_eq!(cfg.queue[1].name, "interactive");
    assert_eq!(cfg.queue[1].priority, 10);
    assert_eq!(cfg.node[0].slots, 4);
    assert_eq!(cfg.node[0].resources, vec!["x86_64", "gpu"]);
    assert!(cfg.node[0].online);
    assert_eq!(cfg.node[1].slots, 1);
    assert!(!cfg.node[1].online);
    assert_eq!(cfg.telemetry.limits.get("power_watts"), Some(&450.0));
    Ok(())
}

#[test]
fn defaults_apply_when_sections_are_omitted() -> TestResult {
    let raw = parse_str(
        r#"
[[queue]]
name = "default"
"#,
    )?;
    let cfg = ConfigFile::try_from(raw)?;

    assert_eq!(cfg.scheduler.tick_interval_ms, 1000);
    assert_eq!(cfg.scheduler.max_schedule_attempts, 0);
    assert_eq!(cfg.scheduler.first_fit_priority, 100);
    assert_eq!(cfg.queue[0].priority, 1);
    assert!(cfg.node.is_empty());
    assert!(cfg.telemetry.limits.is_empty());
    Ok(())
}

#[test]
fn missing_queue_is_rejected() {
    expect_config_error(
        r#"
[[node]]
name = "n0"
"#,
        "at least one [[queue]]",
    );
}

#[test]
fn duplicate_queue_is_rejected() {
    expect_config_error(
        r#"
[[queue]]
name = "batch"

[[queue]]
name = "batch"
"#,
        "batch",
    );
}

#[test]
fn duplicate_node_is_rejected() {
    expect_config_error(
        r#"
[[queue]]
name = "batch"

[[node]]
name = "n0"

[[node]]
name = "n0"
"#,
        "n0",
    );
}

#[test]
fn zero_tick_interval_is_rejected() {
    expect_config_error(
        r#"
[scheduler]
tick_interval_ms = 0

[[queue]]
name = "batch"
"#,
        "tick_interval_ms",
    );
}

#[test]
fn zero_slot_node_is_rejected() {
    expect_config_error(
        r#"
[[queue]]
name = "batch"

[[node]]
name = "n0"
slots = 0
"#,
        "slot",
    );
}

#[test]
fn negative_limit_is_rejected() {
    expect_config_error(
        r#"
[[queue]]
name = "batch"

[telemetry.limits]
power_watts = -1.0
"#,
        "power_watts",
    );
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[[queue]\nname = ");
    match load_and_validate(file.path()) {
        Err(SchedulerError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {other:?}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    match load_and_validate(dir.path().join("nope.toml")) {
        Err(SchedulerError::IoError(_)) => {}
        other => panic!("Expected IoError, got: {other:?}"),
    }
}

#[test]
fn builder_config_validates() {
    let cfg = ConfigFileBuilder::new()
        .with_queue("low", 1)
        .with_queue("high", 10)
        .with_nodes(3)
        .with_limit("temp_c", 90.0)
        .build();
    assert_eq!(cfg.queue.len(), 2);
    assert_eq!(cfg.node.len(), 3);
}
