// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, and required field validation

use chirp::config::Config;
use serial_test::serial;
use std::io::Write;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("CHIRP_GATEWAY_ADDRESS");
    std::env::remove_var("CHIRP_GATEWAY_TOKEN");
    std::env::remove_var("CHIRP_MAX_RECONNECT_ATTEMPTS");
    std::env::remove_var("CHIRP_PREFIX");
    std::env::remove_var("CHIRP_HANDLER_TIMEOUT_SECS");
    std::env::remove_var("CHIRP_OWNERS");
    std::env::remove_var("CHIRP_ADMINS");
    std::env::remove_var("CHIRP_MODERATORS");
    std::env::remove_var("CHIRP_DOCUMENT_PATH");
    std::env::remove_var("CHIRP_CACHE_PATH");
}

fn write_config(content: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut file = std::fs::File::create(dir.path().join("config.toml")).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    dir
}

const MINIMAL: &str = r#"
[gateway]
address = "chat.example.net:7000"
token = "secret123"
"#;

#[test]
#[serial]
fn config_loads_from_toml_file() {
    clear_config_env_vars();
    let dir = write_config(
        r#"
[gateway]
address = "chat.example.net:7000"
token = "secret123"
max_reconnect_attempts = 10

[bot]
prefix = "?"
handler_timeout_secs = 15
statuses = ["watching the logs", "counting packets"]

[permissions]
owners = ["u100"]
admins = ["u200", "u201"]

[stores]
document_path = "/var/lib/chirp/docs.db"
health_check_secs = 5

[backoff]
initial_ms = 500
factor = 3.0
max_ms = 30000
"#,
    );

    let config = Config::load_from(dir.path().join("config.toml")).unwrap();
    assert_eq!(config.gateway.address, "chat.example.net:7000");
    assert_eq!(config.token(), "secret123");
    assert_eq!(config.gateway.max_reconnect_attempts, 10);
    assert_eq!(config.bot.prefix, "?");
    assert_eq!(config.bot.handler_timeout_secs, 15);
    assert_eq!(config.bot.statuses.len(), 2);
    assert_eq!(config.permissions.owners, vec!["u100"]);
    assert_eq!(config.permissions.admins.len(), 2);
    assert_eq!(config.stores.document_path, "/var/lib/chirp/docs.db");
    assert_eq!(config.stores.health_check_secs, 5);
    assert_eq!(config.backoff.initial_ms, 500);
    assert_eq!(config.backoff.factor, 3.0);
}

#[test]
#[serial]
fn optional_sections_get_defaults() {
    clear_config_env_vars();
    let dir = write_config(MINIMAL);

    let config = Config::load_from(dir.path().join("config.toml")).unwrap();
    assert_eq!(config.bot.prefix, "!");
    assert_eq!(config.bot.handler_timeout_secs, 30);
    assert_eq!(config.gateway.max_reconnect_attempts, 0);
    assert_eq!(config.backoff.initial_ms, 1_000);
    assert_eq!(config.backoff.max_ms, 60_000);
    assert!(config.permissions.owners.is_empty());
}

#[test]
#[serial]
fn env_vars_override_file_values() {
    clear_config_env_vars();
    let dir = write_config(MINIMAL);
    std::env::set_var("CHIRP_GATEWAY_TOKEN", "env-token");
    std::env::set_var("CHIRP_PREFIX", "$");
    std::env::set_var("CHIRP_OWNERS", "u1, u2 ,,u3");

    let config = Config::load_from(dir.path().join("config.toml")).unwrap();
    assert_eq!(config.token(), "env-token");
    assert_eq!(config.bot.prefix, "$");
    assert_eq!(config.permissions.owners, vec!["u1", "u2", "u3"]);

    clear_config_env_vars();
}

#[test]
#[serial]
fn env_vars_alone_are_enough_without_a_file() {
    clear_config_env_vars();
    std::env::set_var("CHIRP_GATEWAY_ADDRESS", "gw.example.net:9000");
    std::env::set_var("CHIRP_GATEWAY_TOKEN", "env-only");

    let config = Config::load_from("/nonexistent/config.toml").unwrap();
    assert_eq!(config.gateway.address, "gw.example.net:9000");
    assert_eq!(config.token(), "env-only");

    clear_config_env_vars();
}

#[test]
#[serial]
fn missing_address_is_rejected() {
    clear_config_env_vars();
    let dir = write_config(
        r#"
[gateway]
address = ""
token = "secret123"
"#,
    );

    let err = Config::load_from(dir.path().join("config.toml")).unwrap_err();
    assert!(err.to_string().contains("gateway.address"));
}

#[test]
#[serial]
fn missing_token_is_rejected() {
    clear_config_env_vars();
    let dir = write_config(
        r#"
[gateway]
address = "chat.example.net:7000"
"#,
    );

    let err = Config::load_from(dir.path().join("config.toml")).unwrap_err();
    assert!(err.to_string().contains("gateway.token"));
}

#[test]
#[serial]
fn whitespace_prefix_is_rejected() {
    clear_config_env_vars();
    let dir = write_config(
        r#"
[gateway]
address = "chat.example.net:7000"
token = "secret123"

[bot]
prefix = "! "
"#,
    );

    let err = Config::load_from(dir.path().join("config.toml")).unwrap_err();
    assert!(err.to_string().contains("bot.prefix"));
}

#[test]
#[serial]
fn sub_unit_backoff_factor_is_rejected() {
    clear_config_env_vars();
    let dir = write_config(
        r#"
[gateway]
address = "chat.example.net:7000"
token = "secret123"

[backoff]
factor = 0.5
"#,
    );

    let err = Config::load_from(dir.path().join("config.toml")).unwrap_err();
    assert!(err.to_string().contains("backoff.factor"));
}

#[test]
#[serial]
fn malformed_numeric_env_var_is_an_error() {
    clear_config_env_vars();
    let dir = write_config(MINIMAL);
    std::env::set_var("CHIRP_MAX_RECONNECT_ATTEMPTS", "lots");

    let err = Config::load_from(dir.path().join("config.toml")).unwrap_err();
    assert!(err.to_string().contains("CHIRP_MAX_RECONNECT_ATTEMPTS"));

    clear_config_env_vars();
}
