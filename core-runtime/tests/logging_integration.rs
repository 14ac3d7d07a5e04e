//! Integration tests for logging and settings plumbing

use bridge_traits::time::LogLevel;
use core_runtime::config::{CoreConfig, SyncSettings};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_logging_initialization_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    assert!(init_logging(config.clone()).is_ok());
    // A second global subscriber is refused.
    assert!(init_logging(config).is_err());

    tracing::info!(file = %strip_path("/tmp/out/report.pdf"), "Logging initialized");
}

#[test]
fn test_credentials_never_reach_logs() {
    for field in ["access_token", "refresh_token", "client_secret", "auth_code"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]");
    }

    let redacted = redact_if_sensitive("account", "user@example.com");
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_config_debug_hides_http_client_details() {
    let config = CoreConfig::builder()
        .sync_settings(SyncSettings::default().with_default_page_size(20))
        .build()
        .unwrap();

    let debug = format!("{:?}", config);
    assert!(debug.contains("client_secrets_path"));
    assert!(debug.contains("default_page_size: 20"));
}
