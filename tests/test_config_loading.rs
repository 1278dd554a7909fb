//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! We test observable outcomes, not implementation details of TOML parsing.

use std::io::Write;
use tempfile::NamedTempFile;
use wshub_listener::config::{ConfigError, HubConfig};

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[broker]
url = "redis://cache.internal:6380/2"
prefix = "hub"

[listeners]
initial_groups = ["all", "beta"]

[reconnect]
max_attempts = 5
backoff_pattern_ms = [10, 20]
sustained_delay_ms = 40
"#,
    );

    let config = HubConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.url, "redis://cache.internal:6380/2");
    assert_eq!(config.broker.prefix, "hub");
    assert_eq!(config.listeners.initial_groups, vec!["all", "beta"]);
    assert_eq!(config.reconnect.max_attempts, 5);
    assert_eq!(config.reconnect.backoff_pattern_ms, vec![10, 20]);
    assert_eq!(config.reconnect.sustained_delay_ms, 40);
}

#[test]
fn test_config_applies_defaults_when_sections_missing() {
    let temp_file = write_config(
        r#"
[broker]
url = "redis://localhost:6379/0"
"#,
    );

    let config = HubConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.listeners.groups_payload(), "1,2,all,news");
    assert_eq!(config.reconnect.max_attempts, 0);
    assert!(!config.reconnect.is_enabled());
}

#[test]
fn test_config_empty_file_is_default_configuration() {
    let temp_file = write_config("");

    let config = HubConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.url, "redis://localhost:6379/0");
    assert_eq!(config.listeners, HubConfig::default().listeners);
}

#[test]
fn test_config_namespace_uses_prefix() {
    let temp_file = write_config(
        r#"
[broker]
prefix = "tenant-a"
"#,
    );

    let config = HubConfig::load_from_file(temp_file.path()).unwrap();
    let namespace = config.namespace().unwrap();

    assert_eq!(namespace.channel("client-new"), "tenant-a:client-new");
    assert_eq!(namespace.groups_new_channel("c1"), "tenant-a:groups-new:c1");
}

#[test]
fn test_config_returns_error_for_missing_file() {
    let result = HubConfig::load_from_file(std::path::Path::new("/nonexistent/wshub.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_returns_error_for_invalid_toml_syntax() {
    let temp_file = write_config(
        r#"
[broker
url = "redis://localhost:6379/0"
"#,
    );

    let result = HubConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_returns_error_for_wrong_value_type() {
    let temp_file = write_config(
        r#"
[reconnect]
max_attempts = "many"
"#,
    );

    let result = HubConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_returns_error_for_non_redis_url() {
    let temp_file = write_config(
        r#"
[broker]
url = "mqtt://localhost:1883"
"#,
    );

    let result = HubConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
}

#[test]
fn test_config_returns_error_for_prefix_with_separator() {
    let temp_file = write_config(
        r#"
[broker]
prefix = "ws:hub"
"#,
    );

    let result = HubConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidPrefix(_))));
}

#[test]
fn test_config_returns_error_for_group_with_comma() {
    let temp_file = write_config(
        r#"
[listeners]
initial_groups = ["1,2"]
"#,
    );

    let result = HubConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_error_messages_name_the_problem() {
    let temp_file = write_config(
        r#"
[broker]
url = "http://example.com"
"#,
    );

    let err = HubConfig::load_from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("http://example.com"));
}
