//! Tests for the configuration module.
//!
//! Configuration is exercised through `Config::from_lookup` so no test has to
//! mutate the process environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use proptest::prelude::*;

use crate::config::{
    Config, ConfigArgs, DEFAULT_API_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MODEL,
};
use crate::error::ConfigError;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[derive(Parser, Debug)]
struct TestCli {
    #[command(flatten)]
    config: ConfigArgs,
}

#[test]
fn test_defaults_apply_when_only_key_is_set() {
    let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "secret")])).unwrap();

    assert_eq!(config.model, DEFAULT_MODEL);
    assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(config.artifact_dir, PathBuf::from("./artifacts"));
    assert_eq!(config.generation_timeout, Duration::from_secs(120));
    assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(config.retry_base_delay, Duration::from_millis(500));
    assert_eq!(config.job_retention, Duration::from_secs(3600));
    assert_eq!(config.shutdown_grace, Duration::from_secs(30));
}

#[test]
fn test_missing_api_key_is_an_error() {
    let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::MissingEnvVar(ref name) if name == "GEMINI_API_KEY"));
}

#[test]
fn test_blank_api_key_is_treated_as_missing() {
    let err = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "   ")])).unwrap_err();
    assert!(matches!(err, ConfigError::MissingEnvVar(_)));
}

#[test]
fn test_invalid_number_is_reported_with_variable_name() {
    let err = Config::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "secret"),
        ("MAX_RETRIES", "lots"),
    ]))
    .unwrap_err();
    match err {
        ConfigError::InvalidValue(name, reason) => {
            assert_eq!(name, "MAX_RETRIES");
            assert!(reason.contains("lots"));
        }
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[test]
fn test_zero_timeout_is_rejected() {
    let err = Config::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "secret"),
        ("GENERATION_TIMEOUT_SECS", "0"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "GENERATION_TIMEOUT_SECS"));
}

#[test]
fn test_overrides_are_honoured() {
    let config = Config::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "secret"),
        ("MODEL", "imagen-4.0-ultra-generate-001"),
        ("GEMINI_API_BASE_URL", "http://127.0.0.1:9999/v1beta/"),
        ("ARTIFACT_DIR", "/data/images"),
        ("MAX_RETRIES", "5"),
        ("RETRY_BASE_DELAY_MS", "10"),
    ]))
    .unwrap();

    assert_eq!(config.model, "imagen-4.0-ultra-generate-001");
    assert_eq!(config.api_base_url, "http://127.0.0.1:9999/v1beta");
    assert_eq!(config.artifact_dir, PathBuf::from("/data/images"));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.retry_base_delay, Duration::from_millis(10));
}

#[test]
fn test_generate_endpoint_format() {
    let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "secret")])).unwrap();
    assert_eq!(
        config.generate_endpoint("imagen-4.0-generate-001"),
        "https://generativelanguage.googleapis.com/v1beta/models/imagen-4.0-generate-001:predict"
    );
}

#[test]
fn test_debug_output_redacts_api_key() {
    let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "super-secret-key")])).unwrap();
    let debug = format!("{config:?}");
    assert!(!debug.contains("super-secret-key"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn test_config_args_from_flags() {
    let cli = TestCli::try_parse_from([
        "mcp-imagegen",
        "--api-key",
        "flag-key",
        "--max-retries",
        "1",
        "--artifact-dir",
        "/tmp/out",
    ])
    .unwrap();
    let config = cli.config.into_config().unwrap();
    assert_eq!(config.api_key, "flag-key");
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.artifact_dir, PathBuf::from("/tmp/out"));
}

proptest! {
    /// Any base URL, with or without trailing slashes, yields a well-formed endpoint.
    #[test]
    fn endpoint_never_has_double_slash(
        host in "[a-z]{3,12}",
        slashes in 0usize..3,
        model in "[a-z0-9.-]{1,30}",
    ) {
        let base = format!("https://{}.example.com/v1beta{}", host, "/".repeat(slashes));
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_API_BASE_URL", base.as_str()),
        ])).unwrap();
        let endpoint = config.generate_endpoint(&model);
        prop_assert!(!endpoint["https://".len()..].contains("//"));
        prop_assert!(endpoint.ends_with(":predict"));
    }

    /// Numeric settings round-trip through the lookup.
    #[test]
    fn numeric_settings_are_parsed(retries in 0u32..10, secs in 1u64..10_000) {
        let retries_s = retries.to_string();
        let secs_s = secs.to_string();
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("MAX_RETRIES", retries_s.as_str()),
            ("JOB_RETENTION_SECS", secs_s.as_str()),
        ])).unwrap();
        prop_assert_eq!(config.max_retries, retries);
        prop_assert_eq!(config.job_retention, Duration::from_secs(secs));
    }
}
