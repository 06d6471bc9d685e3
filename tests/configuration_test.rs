//! Configuration integration tests
//!
//! These go through the public builder, the way an embedding application
//! configures the agent.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use sipua::config::{validate, RawConfiguration};
use sipua::domain::agent::AgentStatus;
use sipua::infrastructure::protocols::sip::WsTransportFactory;
use sipua::infrastructure::scheduler::ManualScheduler;
use sipua::{ConfigurationError, UaError, UserAgent};
use std::time::Duration;
use tokio::sync::mpsc;

fn build(raw: RawConfiguration) -> Result<UserAgent, UaError> {
    let (events, _rx) = mpsc::unbounded_channel();
    UserAgent::builder(raw)
        .rng(StdRng::seed_from_u64(3))
        .scheduler(ManualScheduler::new())
        .transport_factory(WsTransportFactory::new(events))
        .build()
}

fn configuration_error(result: Result<UserAgent, UaError>) -> ConfigurationError {
    match result {
        Err(UaError::Configuration(e)) => e,
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("configuration was accepted"),
    }
}

#[test]
fn test_agent_starts_in_init() {
    let raw = RawConfiguration::new()
        .set("uri", "sip:alice@example.com")
        .set("ws_servers", "wss://edge.example.com");
    let agent = build(raw).unwrap();

    assert_eq!(agent.status(), AgentStatus::Init);
    assert_eq!(agent.error(), None);
    assert!(!agent.is_connected());
    assert_eq!(agent.settings().authorization_user(), "alice");
    assert_eq!(agent.settings().registrar_server().to_string(), "sip:example.com");
}

#[test]
fn test_missing_mandatory_parameters() {
    let err = configuration_error(build(
        RawConfiguration::new().set("ws_servers", "wss://edge.example.com"),
    ));
    assert_eq!(err.parameter, "uri");
    assert_eq!(err.value, None);

    let err = configuration_error(build(
        RawConfiguration::new().set("uri", "sip:alice@example.com"),
    ));
    assert_eq!(err.parameter, "ws_servers");
}

#[test]
fn test_empty_server_list_is_rejected() {
    let raw = RawConfiguration::from_value(json!({
        "uri": "sip:alice@example.com",
        "ws_servers": []
    }))
    .unwrap();
    assert_eq!(configuration_error(build(raw)).parameter, "ws_servers");
}

#[test]
fn test_recovery_interval_sanity_check() {
    let raw = RawConfiguration::from_value(json!({
        "uri": "sip:alice@example.com",
        "ws_servers": "wss://edge.example.com",
        "connection_recovery_min_interval": 10,
        "connection_recovery_max_interval": 5
    }))
    .unwrap();
    let err = configuration_error(build(raw));
    assert_eq!(err.parameter, "connection_recovery_max_interval");
    assert!(err.value.is_some());
}

#[test]
fn test_huge_recovery_interval_is_a_configuration_error() {
    let raw = RawConfiguration::from_value(json!({
        "uri": "sip:alice@example.com",
        "ws_servers": "wss://edge.example.com",
        "connection_recovery_max_interval": 1e300
    }))
    .unwrap();
    let err = configuration_error(build(raw));
    assert_eq!(err.parameter, "connection_recovery_max_interval");
}

#[test]
fn test_validation_is_repeatable() {
    let raw = RawConfiguration::from_value(json!({
        "uri": "sip:alice@example.com",
        "ws_servers": ["wss://a.example.com", "wss://b.example.com"],
        "connection_recovery_min_interval": 3,
        "connection_recovery_max_interval": 60
    }))
    .unwrap();

    let first = validate(&raw, &mut StdRng::seed_from_u64(1)).unwrap();
    let second = validate(&raw, &mut StdRng::seed_from_u64(2)).unwrap();

    assert_eq!(first.settings.ws_servers(), second.settings.ws_servers());
    assert_eq!(
        first.settings.connection_recovery_min_interval(),
        Duration::from_secs(3)
    );
    assert_eq!(
        first.settings.connection_recovery_max_interval(),
        Duration::from_secs(60)
    );
    // Generated identity differs per construction
    assert_ne!(first.settings.instance_id(), second.settings.instance_id());
    assert_ne!(first.contact.uri, second.contact.uri);
}

#[test]
fn test_configuration_file() {
    let dir = std::env::temp_dir().join(format!("sipua-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("agent.json");
    std::fs::write(
        &path,
        r#"{ "uri": "sip:alice@example.com", "ws_servers": "wss://edge.example.com", "register_expires": 300 }"#,
    )
    .unwrap();

    let raw = RawConfiguration::from_file(&path).unwrap();
    let agent = build(raw).unwrap();
    assert_eq!(agent.settings().register_expires(), 300);

    std::fs::remove_dir_all(&dir).unwrap();
}
