// tests/config_loading.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use taskgauge::TaskgaugeError;
use taskgauge::config::{Options, default_config_path, load_and_validate, parse_duration};
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<(tempfile::TempDir, PathBuf), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("Taskgauge.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

#[test]
fn loads_a_complete_file() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
[updater]
min_interval = "250ms"
min_fraction = 0.01

[observer]
poll_interval = "50ms"

[pool]
workers = 3
"#,
    )?;

    let options = load_and_validate(&path)?;
    assert_eq!(options.updater.min_interval, Duration::from_millis(250));
    assert_eq!(options.updater.min_fraction, 0.01);
    assert_eq!(options.poll_interval, Duration::from_millis(50));
    assert_eq!(options.workers, 3);
    Ok(())
}

#[test]
fn empty_file_matches_the_builtin_defaults() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config("")?;
    let options = load_and_validate(&path)?;

    let defaults = Options::default();
    assert_eq!(options.updater.min_interval, defaults.updater.min_interval);
    assert_eq!(options.updater.min_fraction, defaults.updater.min_fraction);
    assert_eq!(options.poll_interval, defaults.poll_interval);
    assert_eq!(options.workers, defaults.workers);
    Ok(())
}

#[test]
fn partial_file_keeps_defaults_for_missing_sections() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config("[pool]\nworkers = 2\n")?;
    let options = load_and_validate(&path)?;

    assert_eq!(options.workers, 2);
    assert_eq!(options.updater.min_interval, Duration::from_millis(100));
    assert_eq!(options.updater.min_fraction, 0.005);
    assert_eq!(options.poll_interval, Duration::from_millis(100));
    Ok(())
}

#[test]
fn rejects_an_unparsable_duration() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config("[updater]\nmin_interval = \"fast\"\n")?;
    match load_and_validate(&path).unwrap_err() {
        TaskgaugeError::ConfigError(message) => {
            assert!(message.contains("updater.min_interval"), "got: {message}")
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn rejects_a_fraction_of_one_or_more() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config("[updater]\nmin_fraction = 1.5\n")?;
    match load_and_validate(&path).unwrap_err() {
        TaskgaugeError::ConfigError(message) => {
            assert!(message.contains("min_fraction"), "got: {message}")
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn rejects_a_zero_poll_interval() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config("[observer]\npoll_interval = \"0ms\"\n")?;
    match load_and_validate(&path).unwrap_err() {
        TaskgaugeError::ConfigError(message) => {
            assert!(message.contains("poll_interval"), "got: {message}")
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn rejects_zero_workers() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config("[pool]\nworkers = 0\n")?;
    match load_and_validate(&path).unwrap_err() {
        TaskgaugeError::ConfigError(message) => {
            assert!(message.contains("workers"), "got: {message}")
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TaskgaugeError::IoError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() -> TestResult {
    init_tracing();

    let (_dir, path) = write_config("[updater\nmin_interval =")?;
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, TaskgaugeError::TomlError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn parses_duration_suffixes() {
    init_tracing();

    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
    assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    assert_eq!(parse_duration(" 5s "), Ok(Duration::from_secs(5)));
    assert_eq!(parse_duration("0ms"), Ok(Duration::ZERO));
}

#[test]
fn rejects_malformed_durations() {
    init_tracing();

    assert!(parse_duration("").unwrap_err().contains("empty"));
    assert!(parse_duration("5").unwrap_err().contains("unit"));
    assert!(parse_duration("5d").unwrap_err().contains("unit"));
    assert!(parse_duration("ms").unwrap_err().contains("invalid"));
}

#[test]
fn default_path_points_at_the_working_directory() {
    assert_eq!(default_config_path(), PathBuf::from("Taskgauge.toml"));
}
