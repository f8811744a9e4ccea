//! Configuration files layered over environment presets.

use resilience_core::config::{ConfigManager, ConfigurationError, ResilienceConfig};
use resilience_core::ErrorKind;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tempfile::Builder;

fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .prefix("resilience")
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn toml_file_overrides_preset() {
    let file = write_config(
        ".toml",
        r#"
[worker_pool]
worker_count = 6

[circuit_breakers.default]
failure_threshold = 10

[circuit_breakers.components.postman_api]
failure_threshold = 2
success_threshold = 1
reset_timeout_ms = 15000
half_open_max_retries = 1

[rate_limits.limiters.webhooks]
limit = 20
window_ms = 1000

[retry]
retryable_errors = ["timeout", "connection"]
"#,
    );

    let manager = ConfigManager::load_with_env_vars(Some(file.path()), "production", HashMap::new())
        .unwrap();
    let config = manager.config();

    assert_eq!(manager.config_path(), Some(file.path()));
    assert_eq!(config.worker_pool.worker_count, 6);
    // Untouched fields keep the preset value
    assert_eq!(config.worker_pool.queue_capacity, 100);
    assert_eq!(config.circuit_breakers.default.failure_threshold, 10);
    assert_eq!(config.circuit_breakers.default.success_threshold, 2);

    let postman = config.circuit_breakers.config_for("postman_api");
    assert_eq!(postman.failure_threshold, 2);
    assert_eq!(postman.reset_timeout, Duration::from_secs(15));

    let limiters: Vec<_> = config
        .rate_limits
        .to_rate_limiter_configs()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(limiters, vec!["api", "public_api", "sdk", "webhooks"]);

    assert_eq!(
        config.retry.retryable_errors,
        vec![ErrorKind::Timeout, ErrorKind::Connection]
    );
}

#[test]
fn env_vars_take_precedence_over_file() {
    let file = write_config(
        ".toml",
        r#"
[worker_pool]
worker_count = 6
"#,
    );

    let vars = HashMap::from([(
        "RESILIENCE_WORKER_POOL__WORKER_COUNT".to_string(),
        "12".to_string(),
    )]);
    let manager = ConfigManager::load_with_env_vars(Some(file.path()), "production", vars).unwrap();
    assert_eq!(manager.config().worker_pool.worker_count, 12);
}

#[test]
fn json_file_is_supported() {
    let file = write_config(".json", r#"{ "cache": { "default_ttl_ms": 2500 } }"#);

    let manager = ConfigManager::load_with_env_vars(Some(file.path()), "test", HashMap::new()).unwrap();
    let cache = manager.config().cache.to_cache_config();
    assert_eq!(cache.default_ttl, Duration::from_millis(2500));
    // Sweep interval comes from the test preset
    assert_eq!(cache.sweep_interval, ResilienceConfig::for_test().cache.to_cache_config().sweep_interval);
}

#[test]
fn file_that_breaks_validation_is_rejected() {
    let file = write_config(
        ".toml",
        r#"
[circuit_breakers.default]
success_threshold = 4
half_open_max_retries = 2
"#,
    );

    let result = ConfigManager::load_with_env_vars(Some(file.path()), "production", HashMap::new());
    assert!(matches!(result, Err(ConfigurationError::ValidationError { .. })));
}

#[test]
fn malformed_file_is_a_load_error() {
    let file = write_config(".toml", "[worker_pool\nworker_count = ");

    let result = ConfigManager::load_with_env_vars(Some(file.path()), "production", HashMap::new());
    assert!(matches!(result, Err(ConfigurationError::LoadError { .. })));
}

#[test]
fn wrong_type_is_a_deserialization_error() {
    let file = write_config(
        ".toml",
        r#"
[worker_pool]
worker_count = "many"
"#,
    );

    let result = ConfigManager::load_with_env_vars(Some(file.path()), "production", HashMap::new());
    assert!(matches!(
        result,
        Err(ConfigurationError::DeserializationError { .. })
    ));
}
