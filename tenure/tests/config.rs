use std::time::Duration;

use tenure::{CollectorDefaults, ConfigError, MemoryConfig};

#[test]
fn test_empty_document_uses_defaults() {
    let config: MemoryConfig = serde_json::from_str("{}").expect("valid config");
    assert_eq!(config, MemoryConfig::default());
    assert_eq!(config.monitor_interval, MemoryConfig::DEFAULT_MONITOR_INTERVAL);
    assert!(config.validate().is_ok());
}

#[test]
fn test_collector_override_deserializes() {
    let config: MemoryConfig = serde_json::from_str(
        r#"{
            "tenured_size": 536870912,
            "collector": { "occupancy_fraction": 70, "reserve_percent": 5 },
            "monitor_interval": "2s"
        }"#,
    )
    .expect("valid config");

    assert_eq!(config.tenured_size, Some(512 << 20));
    assert_eq!(config.collector, Some(CollectorDefaults::new(70, 5)));
    assert_eq!(config.monitor_interval, Duration::from_secs(2));
}

#[test]
fn test_out_of_range_percent_is_rejected() {
    let result = serde_json::from_str::<MemoryConfig>(r#"{ "tenured_percent": 101 }"#);
    assert!(result.is_err());
}

#[test]
fn test_inconsistent_collector_fails_validation() {
    let config = MemoryConfig::builder()
        .collector(CollectorDefaults::new(10, 20))
        .build();
    assert_eq!(
        config.validate(),
        Err(ConfigError::ReserveExceedsOccupancy {
            occupancy: 10,
            reserve: 20
        })
    );

    let zero = MemoryConfig::builder()
        .monitor_interval(Duration::ZERO)
        .build();
    assert_eq!(zero.validate(), Err(ConfigError::ZeroMonitorInterval));
}

#[test]
fn test_serializes_humantime_interval() {
    let config = MemoryConfig::builder()
        .monitor_interval(Duration::from_millis(1500))
        .build();
    let value = serde_json::to_value(&config).expect("serializable");
    assert_eq!(value["monitor_interval"], "1s 500ms");
}
