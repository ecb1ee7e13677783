use super::*;
use std::time::Duration;

#[test]
fn test_config_defaults() {
    let config = SessionConfig::default();

    assert_eq!(config.connection_timeout, Duration::from_secs(10));
    assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    assert_eq!(config.ping_timeout, Duration::from_secs(5));
    assert_eq!(config.event_capacity, 256);
    assert_eq!(config.max_message_size, 1024 * 1024);
    assert!(config.user_agent.starts_with("homekit-controller/"));
}

#[test]
fn test_config_builder() {
    let config = SessionConfig::builder()
        .connection_timeout(Duration::from_secs(3))
        .handshake_timeout(Duration::from_secs(4))
        .ping_timeout(Duration::from_millis(500))
        .event_capacity(16)
        .max_message_size(4096)
        .user_agent("test/1.0")
        .build();

    assert_eq!(config.connection_timeout, Duration::from_secs(3));
    assert_eq!(config.handshake_timeout, Duration::from_secs(4));
    assert_eq!(config.ping_timeout, Duration::from_millis(500));
    assert_eq!(config.event_capacity, 16);
    assert_eq!(config.max_message_size, 4096);
    assert_eq!(config.user_agent, "test/1.0");
}

#[test]
fn test_event_capacity_never_zero() {
    let config = SessionConfig::builder().event_capacity(0).build();
    assert_eq!(config.event_capacity, 1);
}
