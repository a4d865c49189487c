// Config loading and validation tests

use dockwatch::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[database]
path = "data/metrics.db"
max_pool_size = 10
flush_rate = 2

[sampler]
interval_secs = 30
stats_log_interval_secs = 300

[rollup]
interval_secs = 3600
raw_retention_hours = 168
hourly_retention_days = 90
vacuum_schedule = "0 0 3 * * *"

[publishing]
broadcast_capacity = 16
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.database.path, "data/metrics.db");
    assert_eq!(config.database.flush_rate, 2);
    assert_eq!(config.sampler.interval_secs, 30);
    assert_eq!(config.rollup.vacuum_schedule.as_deref(), Some("0 0 3 * * *"));
    assert_eq!(config.publishing.broadcast_capacity, 16);
}

#[test]
fn test_config_defaults_for_optional_sections() {
    let minimal = r#"
[server]
port = 8081
host = "127.0.0.1"

[database]
path = "data/metrics.db"
max_pool_size = 2
flush_rate = 1

[publishing]
broadcast_capacity = 4
"#;
    let config = AppConfig::load_from_str(minimal).expect("load_from_str");
    assert!(config.database.enabled);
    assert_eq!(config.database.flush_interval_secs, 60);
    assert_eq!(config.database.query_timeout_ms, 5000);
    assert_eq!(config.docker.socket, None);
    assert_eq!(config.sampler.interval_secs, 30);
    assert_eq!(config.sampler.stats_log_interval_secs, 300);
    assert_eq!(config.rollup.interval_secs, 3600);
    assert_eq!(config.rollup.settle_secs, 300);
    assert_eq!(config.rollup.raw_retention_hours, 168);
    assert_eq!(config.rollup.hourly_retention_days, 90);
    assert_eq!(config.rollup.daily_retention_days, None);
    assert_eq!(config.rollup.vacuum_interval_secs, 86_400);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_db_path() {
    let bad = VALID_CONFIG.replace("path = \"data/metrics.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.path"));
}

#[test]
fn test_config_validation_rejects_max_pool_size_zero() {
    let bad = VALID_CONFIG.replace("max_pool_size = 10", "max_pool_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_pool_size"));
}

#[test]
fn test_config_validation_rejects_flush_rate_zero() {
    let bad = VALID_CONFIG.replace("flush_rate = 2", "flush_rate = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("flush_rate"));
}

#[test]
fn test_config_validation_rejects_sampler_interval_zero() {
    let bad = VALID_CONFIG.replace("interval_secs = 30", "interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sampler.interval_secs"));
}

#[test]
fn test_config_validation_rejects_settle_shorter_than_write_delay() {
    let bad = VALID_CONFIG.replace("interval_secs = 3600\n", "interval_secs = 3600\nsettle_secs = 90\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("rollup.settle_secs"));

    let ok = VALID_CONFIG.replace("interval_secs = 3600\n", "interval_secs = 3600\nsettle_secs = 91\n");
    assert_eq!(AppConfig::load_from_str(&ok).unwrap().rollup.settle_secs, 91);
}

#[test]
fn test_config_settle_is_unchecked_when_recording_disabled() {
    let cfg = VALID_CONFIG
        .replace("interval_secs = 3600\n", "interval_secs = 3600\nsettle_secs = 0\n")
        .replace("[database]\n", "[database]\nenabled = false\n");
    assert!(!AppConfig::load_from_str(&cfg).unwrap().database.enabled);
}

#[test]
fn test_config_validation_rejects_raw_retention_zero() {
    let bad = VALID_CONFIG.replace("raw_retention_hours = 168", "raw_retention_hours = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("raw_retention_hours"));
}

#[test]
fn test_config_validation_rejects_bad_vacuum_schedule() {
    let bad = VALID_CONFIG.replace("\"0 0 3 * * *\"", "\"every night\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("vacuum_schedule"));
}

#[test]
fn test_config_validation_rejects_broadcast_capacity_zero() {
    let bad = VALID_CONFIG.replace("broadcast_capacity = 16", "broadcast_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("broadcast_capacity"));
}

#[test]
fn test_config_rejects_missing_section() {
    let bad = VALID_CONFIG.replace("[publishing]\nbroadcast_capacity = 16\n", "");
    assert!(AppConfig::load_from_str(&bad).is_err());
}
