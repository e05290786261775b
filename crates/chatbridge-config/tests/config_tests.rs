// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the chatbridge configuration system.

use chatbridge_config::diagnostic::ConfigError;
use chatbridge_config::model::BridgeConfig;
use chatbridge_config::{RelaySettings, load_and_validate_path, load_and_validate_str, load_config_from_str};
use serial_test::serial;

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_bridge_config() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
log_level = "debug"

[storage]
database_path = "/tmp/relay.db"
wal_mode = false
operation_timeout_ms = 250

[auth]
api_key = "consumer"
admin_key = "admin"

[relay]
session_timeout = 60
max_message_length = 500
rate_limit_window = 120
rate_limit_messages = 5
rate_limit_inbox = 6
rate_limit_outbox = 7
rate_limit_responses = 8
rate_limit_sessions = 9
sweep_interval_secs = 0
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/relay.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.operation_timeout_ms, 250);
    assert_eq!(config.auth.api_key.as_deref(), Some("consumer"));
    assert_eq!(config.auth.admin_key.as_deref(), Some("admin"));
    assert_eq!(config.relay.session_timeout, 60);
    assert_eq!(config.relay.rate_limit_sessions, 9);
    assert_eq!(config.relay.sweep_interval_secs, 0);
}

/// Missing sections fall back to compiled defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert!(config.storage.wal_mode);
    assert_eq!(config.storage.operation_timeout_ms, 5000);
    assert!(config.auth.api_key.is_none());
    assert!(config.auth.admin_key.is_none());
    assert_eq!(config.relay.sweep_interval_secs, 300);
}

/// Dotted overrides merge over TOML the way `CHATBRIDGE_*` env vars do.
#[test]
fn dotted_override_beats_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: BridgeConfig = Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::string("[relay]\nrate_limit_inbox = 10\n"))
        .merge(("relay.rate_limit_inbox", 99))
        .extract()
        .expect("should merge override");

    assert_eq!(config.relay.rate_limit_inbox, 99);
}

/// Top-level unknown sections are rejected.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[telemetry]
enabled = true
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// An unknown key in [server] carries a typo suggestion and the valid keys.
#[test]
fn diagnostic_error_includes_unknown_key_and_suggestion() {
    let toml = r#"
[server]
prot = 9000
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "prot"
                && suggestion.as_deref() == Some("port")
                && valid_keys.contains("host")
                && valid_keys.contains("log_level")
        })
    });
    assert!(has_unknown_key, "got: {errors:?}");
}

/// A string where a number belongs names the offending key.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[relay]
session_timeout = "half an hour"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("session_timeout"),
        "got: {err_str}"
    );
}

/// ConfigError renders through miette with code and help text.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "prot".to_string(),
        suggestion: Some("port".to_string()),
        valid_keys: "host, port, log_level".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("help text").to_string();
    assert!(help.contains("did you mean `port`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("prot"));
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_catches_zero_rate_limit() {
    let toml = r#"
[relay]
rate_limit_messages = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero limit should fail");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("rate_limit_messages"))
    }));
}

/// Loading from an explicit path picks up the file contents.
#[test]
#[serial]
fn load_and_validate_path_reads_file() {
    let dir = std::env::temp_dir().join(format!("chatbridge-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("chatbridge.toml");
    std::fs::write(&path, "[server]\nport = 7070\n").unwrap();

    let config = load_and_validate_path(&path).expect("file config should validate");
    assert_eq!(config.server.port, 7070);

    std::fs::remove_dir_all(&dir).unwrap();
}

/// The `[relay]` section seeds the runtime settings.
#[test]
fn relay_section_becomes_runtime_settings() {
    let config = load_and_validate_str("[relay]\nrate_limit_window = 10\n").unwrap();
    let settings = RelaySettings::from_relay_config(&config.relay);
    assert_eq!(settings.rate_limit_window, 10);
    assert_eq!(settings.to_map()["rate_limit_window"], "10");
}

fn write_config(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

/// `CHATBRIDGE_*` variables override the file, including underscored keys.
#[test]
#[serial]
fn env_vars_override_file_values() {
    let (_dir, path) = write_config("env.toml", "[server]\nport = 7070\n[relay]\nrate_limit_inbox = 5\n");

    // SAFETY: env access is serialized across this test binary by #[serial].
    unsafe {
        std::env::set_var("CHATBRIDGE_SERVER_PORT", "9191");
        std::env::set_var("CHATBRIDGE_RELAY_RATE_LIMIT_INBOX", "42");
    }
    let loaded = load_and_validate_path(&path);
    unsafe {
        std::env::remove_var("CHATBRIDGE_SERVER_PORT");
        std::env::remove_var("CHATBRIDGE_RELAY_RATE_LIMIT_INBOX");
    }

    let config = loaded.expect("env overrides should validate");
    assert_eq!(config.server.port, 9191);
    assert_eq!(config.relay.rate_limit_inbox, 42);
}

/// An env override is validated like any other source.
#[test]
#[serial]
fn invalid_env_override_is_rejected() {
    let (_dir, path) = write_config("env.toml", "");

    // SAFETY: see above.
    unsafe {
        std::env::set_var("CHATBRIDGE_RELAY_RATE_LIMIT_MESSAGES", "0");
    }
    let loaded = load_and_validate_path(&path);
    unsafe {
        std::env::remove_var("CHATBRIDGE_RELAY_RATE_LIMIT_MESSAGES");
    }

    let errors = loaded.expect_err("zero rate limit must fail validation");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("rate_limit_messages"))
    }));
}
