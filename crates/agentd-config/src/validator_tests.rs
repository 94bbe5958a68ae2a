//! Tests for configuration validation.

use super::*;

fn valid_config() -> Config {
    let mut config = Config::default();
    config.workflow.api_key = Some("key".to_string());
    config
}

#[test]
fn test_validate_default_config() {
    let result = ConfigValidator::validate(&Config::default());
    assert!(result.is_valid());
    // Missing workflow key is only a warning
    assert!(result.warnings.iter().any(|w| w.path == "workflow.api_key"));
}

#[test]
fn test_validate_invalid_port() {
    let mut config = valid_config();
    config.server.port = 0;

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "server.port"));
}

#[test]
fn test_validate_zero_tick_interval() {
    let mut config = valid_config();
    config.runner.tick_interval_ms = 0;

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "runner.tick_interval_ms"));
}

#[test]
fn test_validate_slow_tick_warning() {
    let mut config = valid_config();
    config.runner.tick_interval_ms = 120_000;

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "runner.tick_interval_ms"));
}

#[test]
fn test_validate_zero_max_loops() {
    let mut config = valid_config();
    config.runner.max_loops = Some(0);

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "runner.max_loops"));
}

#[test]
fn test_validate_bad_workflow_url() {
    let mut config = valid_config();
    config.workflow.base_url = "ftp://engine".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "workflow.base_url"));
}

#[test]
fn test_validate_tarball_without_placeholder() {
    let mut config = valid_config();
    config.release.tarball_url = "https://example.com/latest.tar.gz".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "release.tarball_url"));
}

#[test]
fn test_validate_allow_list_entry_with_spaces() {
    let mut config = valid_config();
    config.bash.allowed_commands = vec!["ls -la".to_string()];

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "bash.allowed_commands"));
}

#[test]
fn test_validate_empty_allow_list_warns() {
    let mut config = valid_config();
    config.bash.allowed_commands.clear();

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "bash.allowed_commands"));
}

#[test]
fn test_into_result_joins_errors() {
    let mut config = valid_config();
    config.server.port = 0;
    config.server.host.clear();

    let err = ConfigValidator::validate(&config).into_result().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("server.port"));
    assert!(message.contains("server.host"));
}
