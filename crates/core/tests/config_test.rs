use cluster_core::config::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert!(config.database.is_memory());
    assert_eq!(config.registry.heartbeat_interval_ms, 30_000);
    assert_eq!(config.registry.failure_multiplier, 3);
    assert_eq!(config.registry.default_max_concurrent_jobs, 10);
    assert_eq!(config.scheduler.placement_strategy, "weighted_score");
    assert_eq!(config.autoscaler.evaluation_interval_seconds, 60);
    assert!((config.autoscaler.scale_down_ratio - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[database]
url = "sqlite::memory:"
max_connections = 1

[registry]
heartbeat_interval_ms = 10000
failure_multiplier = 4

[scheduler]
placement_strategy = "least_loaded"
sweep_interval_ms = 250

[observability]
log_level = "debug"
log_format = "json"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();

    assert_eq!(config.database.url, "sqlite::memory:");
    assert_eq!(config.database.max_connections, 1);
    assert_eq!(config.registry.heartbeat_interval_ms, 10_000);
    assert_eq!(config.registry.failure_multiplier, 4);
    // 未出现的字段使用默认值
    assert_eq!(config.registry.default_max_concurrent_jobs, 10);
    assert_eq!(config.scheduler.placement_strategy, "least_loaded");
    assert_eq!(config.scheduler.sweep_interval_ms, 250);
    assert_eq!(config.observability.log_format, "json");
    assert!(config.autoscaler.enabled);
}

#[test]
fn test_config_validation_failures() {
    let mut config = AppConfig::default();
    config.database.url = "postgres://localhost/cluster".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.registry.failure_multiplier = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scheduler.placement_strategy = "random".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.autoscaler.scale_down_ratio = 1.5;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.observability.log_format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_toml_is_rejected() {
    let result = AppConfig::from_toml(
        r#"
[scheduler]
sweep_interval_ms = 0
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_toml_round_trip() {
    let mut config = AppConfig::default();
    config.executor.max_timeout_minutes = 90;

    let toml_str = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(parsed.executor.max_timeout_minutes, 90);
    assert_eq!(parsed.database.url, config.database.url);
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[autoscaler]
evaluation_interval_seconds = 15
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.autoscaler.evaluation_interval_seconds, 15);
}

#[test]
fn test_load_missing_file() {
    let result = AppConfig::load(Some("/nonexistent/cluster.toml"));
    assert!(result.is_err());
}
