use bitcoin::{OutPoint, Txid};
use chanfund_core::logging::{self, LogConfig, LogLevel};
use serde_json::json;
use std::str::FromStr;
use std::sync::Once;

// Ensure logging is only initialized once across all tests
static INIT: Once = Once::new();

fn setup_logging() {
    INIT.call_once(|| {
        let config = LogConfig {
            level: LogLevel::Error,
            log_file: None,
            include_timestamps: false,
            include_source_location: false,
            json_format: false,
        };

        // Other tests in this binary may have initialized logging already
        let _ = logging::init(&config);
    });
}

#[test]
fn test_default_config() {
    let config = LogConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.log_file.is_none());
    assert!(config.include_timestamps);
    assert!(!config.include_source_location);
    assert!(!config.json_format);
}

#[test]
fn test_partial_config_deserializes() {
    let config: LogConfig = toml::from_str("level = \"Debug\"\njson_format = true\n").unwrap();

    assert_eq!(config.level, LogLevel::Debug);
    assert!(config.json_format);
    assert!(config.include_timestamps);
}

#[test]
fn test_log_functions_accept_params() {
    setup_logging();
    logging::set_log_level(LogLevel::Trace);

    logging::log_funding(LogLevel::Info, "attempt_committed", Some(json!({ "attempt": 1 })));
    logging::log_lease(LogLevel::Debug, "leased", None);
    logging::log_selection(LogLevel::Trace, "wallet_selection", None);
    logging::log_config(LogLevel::Warn, "loaded", Some(logging::log_params(vec![("path", "x".into())])));

    logging::set_log_level(LogLevel::Error);
}

#[test]
fn test_short_outpoint() {
    let txid =
        Txid::from_str("abcd000000000000000000000000000000000000000000000000000000001234").unwrap();

    assert_eq!(logging::short_outpoint(&OutPoint::new(txid, 7)), "abcd...1234:7");
}

#[test]
fn test_log_params_builds_object() {
    let params = logging::log_params(vec![("attempt", "attempt-3".to_string()), ("inputs", "2".to_string())]);

    assert_eq!(params, json!({ "attempt": "attempt-3", "inputs": "2" }));
}
