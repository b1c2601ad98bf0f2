//! Loading configuration from files on disk
//!
//! Covers the path-based loader: successful reads, missing files, and
//! validation errors surfaced through `load`.

use std::io::Write;

use tributary_config::{ConfigError, EventsConfig, LogFormat};

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[dispatcher]
immediate = true
path_pool_capacity = 2

[tracking]
listeners = true

[logging]
format = "full"
"#
    )
    .unwrap();

    let config = EventsConfig::load(file.path()).unwrap();
    assert!(config.dispatcher.immediate);
    assert_eq!(config.dispatcher.path_pool_capacity, 2);
    assert!(config.tracking.listeners);
    assert_eq!(config.logging.format, LogFormat::Full);
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = EventsConfig::load(&path).unwrap_err();
    match err {
        ConfigError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn test_invalid_value_in_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[dispatcher]\ntarget_count_hint = 0").unwrap();

    let err = EventsConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("dispatcher.target_count_hint"));
}
