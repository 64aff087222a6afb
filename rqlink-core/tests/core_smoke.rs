#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use rqlink_core::config::CodecConfig;
use std::{env, fs};

#[test]
fn config_default_is_valid_and_roundtrip_file() {
    let cfg = CodecConfig::default();
    assert!(cfg.validate().is_ok());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rqlink.toml");
    cfg.write_to_file(&path).unwrap();
    let s = fs::read_to_string(&path).unwrap();
    assert!(s.contains("symbol_size"));
    let loaded = CodecConfig::load_from_file(&path).unwrap();
    assert_eq!(cfg, loaded);
}

#[test]
fn partial_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    fs::write(&path, "symbol_size = 1024\n").unwrap();
    let cfg = CodecConfig::load_from_file(&path).unwrap();
    assert_eq!(cfg.symbol_size, 1024);
    assert_eq!(cfg.alignment, CodecConfig::default().alignment);
}

#[test]
fn config_env_override_and_validation() {
    // Preserve and restore environment variables to avoid leaking state between tests
    let old_log = env::var("RQLINK_LOG_LEVEL").ok();
    let old_t = env::var("RQLINK_SYMBOL_SIZE").ok();

    env::set_var("RQLINK_LOG_LEVEL", "debug");
    env::set_var("RQLINK_SYMBOL_SIZE", "2048");
    let cfg = CodecConfig::from_env().unwrap();
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.symbol_size, 2048);

    env::set_var("RQLINK_SYMBOL_SIZE", "not-a-number");
    let err = CodecConfig::from_env().unwrap_err();
    assert!(format!("{err}").contains("RQLINK_SYMBOL_SIZE"));

    // Invalid level should fail validation when loaded from file
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "log_level='nope'\n").unwrap();
    let err = CodecConfig::load_from_file(&path).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("invalid log_level"));

    // Restore
    if let Some(v) = old_log { env::set_var("RQLINK_LOG_LEVEL", v) } else { env::remove_var("RQLINK_LOG_LEVEL") }
    if let Some(v) = old_t { env::set_var("RQLINK_SYMBOL_SIZE", v) } else { env::remove_var("RQLINK_SYMBOL_SIZE") }
}

#[test]
fn unparsable_file_reports_toml_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "symbol_size = [").unwrap();
    let err = CodecConfig::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("toml parse error"));
}
